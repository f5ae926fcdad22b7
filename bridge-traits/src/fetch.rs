//! Resource fetching bridge.
//!
//! The core never talks to the network or the filesystem directly. Hosts
//! provide a [`ResourceFetcher`] that turns a resource identifier (usually a
//! URL) into the raw encoded bytes of a clip.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Supplies raw encoded bytes for a resource identifier.
///
/// Implementations should map transport failures to
/// [`BridgeError::Network`](crate::BridgeError::Network) or
/// [`BridgeError::Io`](crate::BridgeError::Io); the core treats every fetch
/// failure as transient and retries it according to its configuration.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::fetch::ResourceFetcher;
///
/// async fn download(fetcher: &dyn ResourceFetcher) {
///     let bytes = fetcher.fetch("https://cdn.example.com/audio/hello.mp3").await?;
///     println!("{} bytes", bytes.len());
/// }
/// ```
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Fetch the complete encoded payload for `key`.
    async fn fetch(&self, key: &str) -> Result<Bytes>;
}
