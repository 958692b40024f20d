//! Reader plumbing (collaborator C1): opens a trace source path as either
//! a local file or a live HTTP stream and decodes it into `RawEvent`s one
//! line at a time.
//!
//! The binary execution trace format has no equivalent decoder in this
//! ecosystem, so this implementation instead speaks a newline-delimited
//! JSON encoding of `RawEvent` — the same shape the core already derives
//! `serde` for — so the binary is runnable and testable end to end.

use std::io;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use idlescope_common::RawEvent;
use idlescope_core::trace::TraceEventSource;
use idlescope_core::CoreError;
use log::debug;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::io::StreamReader;

/// A query parameter appended to URL sources asking the target to stream
/// for a long time.
const SECONDS_PARAM_VALUE: &str = "315360000";

pub struct TraceFileOrHttpSource {
    lines: Lines<Pin<Box<dyn AsyncBufRead + Send>>>,
}

impl TraceFileOrHttpSource {
    /// Open `source_path`: a URL if it parses with a non-empty host,
    /// otherwise a local file. URL sources retry on 5xx within a bounded
    /// wait window while opening the connection; once a non-5xx response
    /// arrives (or the file is opened), `open` returns immediately and
    /// hands back a reader that pulls one line at a time from the still
    /// in-flight connection — it never buffers a live body to completion.
    pub async fn open(
        source_path: &str,
        retry_window: Duration,
        retry_sleep: Duration,
    ) -> Result<Self, CoreError> {
        let reader: Pin<Box<dyn AsyncBufRead + Send>> = match parse_remote_url(source_path) {
            Some(url) => open_http_stream(url, retry_window, retry_sleep).await?,
            None => {
                let file = tokio::fs::File::open(source_path).await.map_err(|err| {
                    CoreError::StreamBroken(format!(
                        "failed to open {source_path} as a file: {err}"
                    ))
                })?;
                Box::pin(BufReader::new(file))
            }
        };

        Ok(Self { lines: reader.lines() })
    }
}

fn parse_remote_url(source_path: &str) -> Option<url::Url> {
    let mut url = url::Url::parse(source_path).ok()?;
    let has_host = url.host_str().is_some_and(|host| !host.is_empty());
    if !has_host {
        return None;
    }
    url.query_pairs_mut().append_pair("seconds", SECONDS_PARAM_VALUE);
    Some(url)
}

/// Open the connection, retrying on 5xx within `retry_window`, then wrap
/// the still-streaming response body in an `AsyncBufRead` without reading
/// any of it. The returned reader is pulled line-by-line by `next_event`
/// as the trace source emits events live.
async fn open_http_stream(
    url: url::Url,
    retry_window: Duration,
    retry_sleep: Duration,
) -> Result<Pin<Box<dyn AsyncBufRead + Send>>, CoreError> {
    let client = reqwest::Client::new();
    let deadline = tokio::time::Instant::now() + retry_window;

    loop {
        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| CoreError::UpstreamUnavailable(err.to_string()))?;

        if response.status().is_server_error() {
            if tokio::time::Instant::now() >= deadline {
                return Err(CoreError::UpstreamUnavailable(format!(
                    "trace source {url} kept returning {}",
                    response.status()
                )));
            }
            debug!("trace source {url} returned {}, retrying", response.status());
            tokio::time::sleep(retry_sleep).await;
            continue;
        }

        let byte_stream = response
            .bytes_stream()
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err));
        return Ok(Box::pin(BufReader::new(StreamReader::new(byte_stream))));
    }
}

#[async_trait]
impl TraceEventSource for TraceFileOrHttpSource {
    async fn next_event(&mut self) -> Result<Option<RawEvent>, CoreError> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|err| CoreError::StreamBroken(err.to_string()))?;

            return match line {
                None => Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => serde_json::from_str(&line).map(Some).map_err(|err| {
                    CoreError::ParseFailure(format!("malformed trace event: {err}"))
                }),
            };
        }
    }
}
