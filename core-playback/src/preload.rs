//! # Preload Scheduler
//!
//! Warms the cache with resources that are likely to be played next (the
//! words on the screen, the next card in a deck).
//!
//! Preloads go through the same [`LoadCoordinator`] as playback, so a
//! `play` issued while a preload of the same key is in flight joins it
//! instead of fetching twice. A batch never touches the playback state and
//! its failures are only logged and counted.

use crate::error::{PlaybackError, Result};
use crate::loader::LoadCoordinator;
use crate::pipeline::FetcherFactory;
use core_runtime::events::{CoreEvent, EventBus, PreloadEvent};
use core_runtime::logging::redact_url;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Outcome of one preload batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadReport {
    pub batch_id: u64,
    /// Distinct keys in the batch.
    pub requested: usize,
    pub loaded: usize,
    pub already_cached: usize,
    pub failed: usize,
}

/// Handle to a running batch.
///
/// Dropping it detaches the batch, which keeps running.
#[derive(Debug)]
pub struct PreloadHandle {
    batch_id: u64,
    task: JoinHandle<PreloadReport>,
}

impl PreloadHandle {
    pub fn batch_id(&self) -> u64 {
        self.batch_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the whole batch.
    pub async fn wait(self) -> Result<PreloadReport> {
        self.task.await.map_err(|_| PlaybackError::Cancelled)
    }

    /// Abort the batch. Loads that nothing else waits for are abandoned.
    pub fn cancel(self) {
        self.task.abort();
    }
}

/// Background cache warming with bounded concurrency.
#[derive(Clone)]
pub struct PreloadScheduler {
    loader: LoadCoordinator,
    fetchers: Arc<dyn FetcherFactory>,
    concurrency: usize,
    /// Shared by every batch, so overlapping batches stay within `concurrency`.
    limiter: Arc<Semaphore>,
    event_bus: Option<EventBus>,
    next_batch: Arc<AtomicU64>,
}

impl PreloadScheduler {
    pub fn new(
        loader: LoadCoordinator,
        fetchers: Arc<dyn FetcherFactory>,
        concurrency: usize,
    ) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            loader,
            fetchers,
            concurrency,
            limiter: Arc::new(Semaphore::new(concurrency)),
            event_bus: None,
            next_batch: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Start loading `keys` in the background.
    ///
    /// Duplicate and blank keys are dropped; keys already cached are
    /// counted but not fetched. Returns immediately. Must be called from
    /// within a tokio runtime.
    pub fn preload<I, K>(&self, keys: I) -> PreloadHandle
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.preload_with(keys, Arc::clone(&self.fetchers))
    }

    /// Like [`preload`](Self::preload), fetching through `fetchers` instead
    /// of the scheduler's own factory.
    pub fn preload_with<I, K>(&self, keys: I, fetchers: Arc<dyn FetcherFactory>) -> PreloadHandle
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut seen = HashSet::new();
        let keys: Vec<String> = keys
            .into_iter()
            .map(Into::into)
            .filter(|key| !key.trim().is_empty() && seen.insert(key.clone()))
            .collect();

        let batch_id = self.next_batch.fetch_add(1, Ordering::Relaxed);
        debug!(batch_id, requested = keys.len(), "Preload batch accepted");
        self.emit(PreloadEvent::Started {
            batch_id,
            requested: keys.len(),
        });

        let scheduler = self.clone();
        let task =
            tokio::spawn(async move { scheduler.run_batch(batch_id, keys, fetchers).await });

        PreloadHandle { batch_id, task }
    }

    async fn run_batch(
        self,
        batch_id: u64,
        keys: Vec<String>,
        fetchers: Arc<dyn FetcherFactory>,
    ) -> PreloadReport {
        let mut report = PreloadReport {
            batch_id,
            requested: keys.len(),
            ..Default::default()
        };
        let mut loads = JoinSet::new();

        for key in keys {
            if self.loader.cache().contains(&key) {
                report.already_cached += 1;
                continue;
            }

            let Ok(permit) = Arc::clone(&self.limiter).acquire_owned().await else {
                break;
            };
            // The key may have been played while we waited for a slot.
            if self.loader.cache().contains(&key) {
                report.already_cached += 1;
                continue;
            }

            let loader = self.loader.clone();
            let fetcher = fetchers.fetcher(&key);
            loads.spawn(async move {
                let _permit = permit;
                let outcome = loader.load(&key, fetcher).await;
                (key, outcome)
            });
        }

        while let Some(joined) = loads.join_next().await {
            match joined {
                Ok((_, Ok(_))) => report.loaded += 1,
                Ok((key, Err(err))) => {
                    report.failed += 1;
                    warn!(batch_id, key = %redact_url(&key), error = %err, "Preload failed");
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(batch_id, error = %err, "Preload task failed");
                }
            }
        }

        info!(
            batch_id,
            loaded = report.loaded,
            already_cached = report.already_cached,
            failed = report.failed,
            "Preload batch completed"
        );
        self.emit(PreloadEvent::Completed {
            batch_id,
            loaded: report.loaded,
            already_cached: report.already_cached,
            failed: report.failed,
        });

        report
    }

    fn emit(&self, event: PreloadEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Preload(event));
        }
    }
}

impl std::fmt::Debug for PreloadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreloadScheduler")
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}
