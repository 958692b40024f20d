//! The seam at which collaborator C2 (heap source fetcher) plugs into the
//! collector. The core issues no HTTP requests itself.

use async_trait::async_trait;

use crate::error::CoreError;

/// One-shot HTTP GET against a heap profile endpoint. No retry policy at
/// this layer — retries, if any, belong to the glue implementation.
#[async_trait]
pub trait HeapFetcher: Send + Sync {
    async fn fetch(&self, source_path: &str) -> Result<(u16, Vec<u8>), CoreError>;
}
