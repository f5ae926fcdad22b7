//! Fetch + decode pipeline feeding the load coordinator.
//!
//! The coordinator only knows "an async operation that yields a resource".
//! [`FetchPipeline`] builds that operation from the host bridges: raw bytes
//! from a [`ResourceFetcher`], then a [`ClipDecoder`]. Bridge failures are
//! classified here, which decides what the coordinator retries.

use crate::error::LoadError;
use crate::loader::LoadResult;
use bridge_traits::{ClipDecoder, ResourceFetcher};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use tracing::debug;

/// Boxed future of one fetch + decode attempt.
pub type LoadFuture = BoxFuture<'static, LoadResult>;

/// A fetcher bound to one key, callable once per attempt.
pub type BoxedFetcher = Box<dyn FnMut() -> LoadFuture + Send>;

/// Produces per-key fetchers for the controller and the preload scheduler.
pub trait FetcherFactory: Send + Sync {
    fn fetcher(&self, key: &str) -> BoxedFetcher;
}

impl<F> FetcherFactory for F
where
    F: Fn(&str) -> BoxedFetcher + Send + Sync,
{
    fn fetcher(&self, key: &str) -> BoxedFetcher {
        self(key)
    }
}

/// Bridges a [`ResourceFetcher`] and a [`ClipDecoder`].
#[derive(Clone)]
pub struct FetchPipeline {
    fetcher: Arc<dyn ResourceFetcher>,
    decoder: Arc<dyn ClipDecoder>,
}

impl FetchPipeline {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>, decoder: Arc<dyn ClipDecoder>) -> Self {
        Self { fetcher, decoder }
    }

    /// One attempt: fetch the bytes, then decode them.
    ///
    /// Any fetch failure is a [`LoadError::Fetch`]; any decoder failure, or
    /// a clip without samples, is a [`LoadError::Decode`].
    pub async fn fetch_and_decode(&self, key: &str) -> LoadResult {
        let bytes = self.fetcher.fetch(key).await.map_err(LoadError::fetch)?;
        if bytes.is_empty() {
            return Err(LoadError::Decode("empty response body".to_string()));
        }
        debug!(bytes = bytes.len(), "Fetched clip bytes");

        let resource = self
            .decoder
            .decode(key, bytes)
            .await
            .map_err(LoadError::decode)?;
        if resource.clip().samples.is_empty() {
            return Err(LoadError::Decode("clip has no samples".to_string()));
        }

        Ok(resource)
    }
}

impl FetcherFactory for FetchPipeline {
    fn fetcher(&self, key: &str) -> BoxedFetcher {
        let pipeline = self.clone();
        let key = key.to_string();
        Box::new(move || {
            let pipeline = pipeline.clone();
            let key = key.clone();
            async move { pipeline.fetch_and_decode(&key).await }.boxed()
        })
    }
}

impl std::fmt::Debug for FetchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchPipeline").finish_non_exhaustive()
    }
}
