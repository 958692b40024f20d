//! Heap source fetcher (collaborator C2): one-shot HTTP GET via `reqwest`,
//! no retry policy at this layer.

use async_trait::async_trait;
use idlescope_core::CoreError;
use idlescope_core::heap::HeapFetcher;

pub struct ReqwestHeapFetcher {
    client: reqwest::Client,
}

impl ReqwestHeapFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for ReqwestHeapFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HeapFetcher for ReqwestHeapFetcher {
    async fn fetch(&self, source_path: &str) -> Result<(u16, Vec<u8>), CoreError> {
        let response = self
            .client
            .get(source_path)
            .send()
            .await
            .map_err(|err| CoreError::UpstreamUnavailable(err.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| CoreError::StreamBroken(err.to_string()))?;
        Ok((status, body.to_vec()))
    }
}
