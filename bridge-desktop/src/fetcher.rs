//! Resource fetcher backed by reqwest and tokio::fs

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    fetch::ResourceFetcher,
};
use bytes::Bytes;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Where a resource identifier points.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ResourceLocation {
    Remote(String),
    Local(PathBuf),
}

impl ResourceLocation {
    fn parse(key: &str) -> Self {
        let lower = key.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            ResourceLocation::Remote(key.to_string())
        } else if let Some(path) = key.strip_prefix("file://") {
            ResourceLocation::Local(PathBuf::from(path))
        } else {
            ResourceLocation::Local(PathBuf::from(key))
        }
    }
}

/// Desktop fetcher for pronunciation clips.
///
/// Retries are left to the core's load coordinator; every call performs
/// exactly one request.
pub struct DesktopResourceFetcher {
    client: Client,
}

impl DesktopResourceFetcher {
    /// Create a fetcher with a 15 second request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(15))
    }

    /// Create a fetcher with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("pronunciation-audio-core/0.1.0")
            .build()
            .map_err(|e| BridgeError::OperationFailed(format!("HTTP client init: {}", e)))?;

        Ok(Self { client })
    }

    /// Wrap an already configured reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_remote(&self, url: &str) -> Result<Bytes> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                BridgeError::Network("Request timed out".to_string())
            } else {
                BridgeError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Network(format!("HTTP {}", status.as_u16())));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| BridgeError::Network(e.to_string()))?;

        debug!(bytes = body.len(), "Fetched remote clip");
        Ok(body)
    }

    async fn fetch_local(&self, path: &PathBuf) -> Result<Bytes> {
        let data = tokio::fs::read(path).await?;
        debug!(bytes = data.len(), "Read local clip");
        Ok(Bytes::from(data))
    }
}

#[async_trait]
impl ResourceFetcher for DesktopResourceFetcher {
    async fn fetch(&self, key: &str) -> Result<Bytes> {
        match ResourceLocation::parse(key) {
            ResourceLocation::Remote(url) => self.fetch_remote(&url).await,
            ResourceLocation::Local(path) => self.fetch_local(&path).await,
        }
    }
}
