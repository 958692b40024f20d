use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use idlescope::cli::Args;
use idlescope::server::{self, AppState};
use idlescope_core::Registry;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let state = Arc::new(AppState {
        registry: Registry::new(),
        open_retry_window: Duration::from_millis(args.open_retry_window_ms),
        open_retry_sleep: Duration::from_millis(args.open_retry_sleep_ms),
    });

    let addr: SocketAddr = args.addr;
    let router = server::router(state);

    info!("idlescope listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("failed to bind {addr}"))?;
    axum::serve(listener, router).await.context("HTTP server exited")?;

    Ok(())
}
