//! HTTP transport seam.
//!
//! Listing pages and report files go through one narrow trait so the
//! crawl and fetch stages can be exercised in tests without a network.

use std::time::Duration;

use async_trait::async_trait;

use crate::models::FetchError;

/// Minimal GET-only transport used by the lister and the fetch pool.
#[async_trait]
pub trait HttpSource: Send + Sync + 'static {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Production transport backed by a shared `reqwest` client.
pub struct ReqwestSource {
    client: reqwest::Client,
}

impl ReqwestSource {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("spimex-ingest/0.1")
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }
}

impl Default for ReqwestSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpSource for ReqwestSource {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| FetchError::Network(e.to_string()))
    }
}
