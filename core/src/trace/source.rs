//! The seam at which collaborator C1 (reader plumbing) plugs into the
//! processor. The core never opens a file or socket itself; it only
//! consumes whatever implements this trait.

use crate::error::CoreError;
use async_trait::async_trait;
use idlescope_common::RawEvent;

/// A lazy, ordered sequence of trace events.
///
/// `next_event` returns `Ok(None)` at a clean end-of-stream (not an
/// error); any other `Err` is recorded on the owning processor and stops
/// ingestion.
#[async_trait]
pub trait TraceEventSource: Send {
    async fn next_event(&mut self) -> Result<Option<RawEvent>, CoreError>;
}
