//! CLI argument definitions.

use std::net::SocketAddr;

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "idlescope",
    about = "Streams a remote execution trace and heap profile endpoint, serving live idleness and heap summaries over HTTP",
    after_help = "\
EXAMPLES:
    idlescope --addr 0.0.0.0:8090
    curl -X POST 'http://localhost:8090/trace-events/listen?source_path=http://target:6060/debug/trace'
    curl http://localhost:8090/trace-events/0/top-idling-goroutines"
)]
pub struct Args {
    /// Address the HTTP API binds to.
    #[arg(long, env = "IDLESCOPE_ADDR", default_value = "127.0.0.1:8090")]
    pub addr: SocketAddr,

    /// How long to keep retrying a 5xx response when opening an HTTP
    /// trace source, in milliseconds, before giving up.
    #[arg(long, env = "IDLESCOPE_OPEN_RETRY_WINDOW_MS", default_value_t = 2_000)]
    pub open_retry_window_ms: u64,

    /// Sleep between retries while the retry window has not elapsed.
    #[arg(long, env = "IDLESCOPE_OPEN_RETRY_SLEEP_MS", default_value_t = 5)]
    pub open_retry_sleep_ms: u64,
}
