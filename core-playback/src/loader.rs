//! # Load Coordinator
//!
//! Deduplicates concurrent loads of the same resource and retries transient
//! fetch failures.
//!
//! ## Overview
//!
//! Each key has at most one in-flight load request. The first caller
//! creates it and spawns a driver task that runs the caller's fetcher;
//! later callers subscribe to the same request. When the driver resolves,
//! the resource is put into the [`ResourceCache`] and every subscriber gets
//! the same outcome, in subscription order.
//!
//! ```text
//! load("k") ──┐
//! load("k") ──┼──> LoadRequest{"k"} ──> driver: fetch → decode (retry Fetch)
//! load("k") ──┘          │
//!                        └──> ResourceCache::put + notify subscribers
//! ```
//!
//! Dropping a `load` future removes its subscriber. A request left without
//! subscribers is abandoned and its driver aborted, so a stopped playback
//! never keeps the network busy for nobody.

use crate::cache::ResourceCache;
use crate::error::LoadError;
use bridge_traits::AudioResource;
use core_runtime::logging::redact_url;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, info, instrument, warn};

/// Outcome delivered to every subscriber of a load request.
pub type LoadResult = std::result::Result<AudioResource, LoadError>;

/// Lifecycle of a load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Pending,
    Succeeded,
    Failed,
}

/// Fixed-delay retry policy for fetch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first try included. Values below 1 act as 1.
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    pub fn from_config(config: &core_runtime::config::AudioConfig) -> Self {
        Self::new(config.max_retry_attempts, config.retry_backoff())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&core_runtime::config::AudioConfig::default())
    }
}

type Subscriber = (u64, oneshot::Sender<LoadResult>);

/// One in-flight load for a key.
struct LoadRequest {
    /// Distinguishes this request from later ones for the same key.
    id: u64,
    status: LoadStatus,
    subscribers: Vec<Subscriber>,
    attempt: u32,
    driver: Option<AbortHandle>,
}

impl LoadRequest {
    fn new(id: u64) -> Self {
        Self {
            id,
            status: LoadStatus::Pending,
            subscribers: Vec::new(),
            attempt: 0,
            driver: None,
        }
    }

    /// Deliver `outcome` to every subscriber in subscription order.
    fn resolve(mut self, outcome: LoadResult) {
        self.status = if outcome.is_ok() {
            LoadStatus::Succeeded
        } else {
            LoadStatus::Failed
        };
        debug!(
            status = ?self.status,
            subscribers = self.subscribers.len(),
            "Notifying load subscribers"
        );
        for (_, reply) in self.subscribers {
            // A receiver may have gone away after we removed the request.
            let _ = reply.send(outcome.clone());
        }
    }
}

struct LoaderShared {
    cache: Arc<ResourceCache>,
    policy: RetryPolicy,
    in_flight: Mutex<HashMap<String, LoadRequest>>,
    next_subscriber: AtomicU64,
    next_request: AtomicU64,
}

impl LoaderShared {
    /// Remove the request for `key` only if it is still request `id`. A
    /// driver that outlived its request must not touch a newer one.
    fn take_request(&self, key: &str, id: u64) -> Option<LoadRequest> {
        let mut in_flight = self.in_flight.lock();
        match in_flight.get(key) {
            Some(request) if request.id == id => in_flight.remove(key),
            _ => None,
        }
    }
}

/// Per-key request deduplication with retry.
///
/// Cheap to clone; clones share the in-flight table.
#[derive(Clone)]
pub struct LoadCoordinator {
    shared: Arc<LoaderShared>,
}

impl LoadCoordinator {
    pub fn new(cache: Arc<ResourceCache>, policy: RetryPolicy) -> Self {
        Self {
            shared: Arc::new(LoaderShared {
                cache,
                policy,
                in_flight: Mutex::new(HashMap::new()),
                next_subscriber: AtomicU64::new(1),
                next_request: AtomicU64::new(1),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.shared.cache
    }

    pub fn policy(&self) -> RetryPolicy {
        self.shared.policy
    }

    /// Load `key`, sharing any request already in flight for it.
    ///
    /// `fetcher` performs one fetch + decode attempt per call. It is only
    /// used when this call creates the request; a subscriber joining an
    /// existing request drops its fetcher unused.
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(skip_all, fields(key = %redact_url(key)))]
    pub async fn load<F, Fut>(&self, key: &str, fetcher: F) -> LoadResult
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = LoadResult> + Send + 'static,
    {
        let (reply, outcome) = oneshot::channel();
        let id = self.shared.next_subscriber.fetch_add(1, Ordering::Relaxed);

        {
            let mut in_flight = self.shared.in_flight.lock();
            match in_flight.get_mut(key) {
                Some(request) => {
                    request.subscribers.push((id, reply));
                    debug!(
                        subscribers = request.subscribers.len(),
                        "Joined in-flight load"
                    );
                }
                None => {
                    let request_id =
                        self.shared.next_request.fetch_add(1, Ordering::Relaxed);
                    let mut request = LoadRequest::new(request_id);
                    request.subscribers.push((id, reply));
                    let driver = tokio::spawn(drive(
                        Arc::clone(&self.shared),
                        key.to_string(),
                        request_id,
                        fetcher,
                    ));
                    request.driver = Some(driver.abort_handle());
                    in_flight.insert(key.to_string(), request);
                    debug!("Started load");
                }
            }
        }

        let mut guard = SubscriptionGuard {
            shared: Arc::clone(&self.shared),
            key: key.to_string(),
            id,
            armed: true,
        };
        let result = outcome.await;
        guard.armed = false;

        // A dropped sender means the driver died without resolving.
        result.unwrap_or(Err(LoadError::Cancelled))
    }

    /// Number of keys currently loading.
    pub fn in_flight_count(&self) -> usize {
        self.shared.in_flight.lock().len()
    }

    /// Whether a request for `key` is in flight.
    pub fn is_loading(&self, key: &str) -> bool {
        self.shared.in_flight.lock().contains_key(key)
    }

    /// Subscribers waiting on `key`, 0 if nothing is in flight.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.shared
            .in_flight
            .lock()
            .get(key)
            .map_or(0, |r| r.subscribers.len())
    }

    /// Attempt number currently running for `key`.
    pub fn attempt(&self, key: &str) -> Option<u32> {
        self.shared.in_flight.lock().get(key).map(|r| r.attempt)
    }
}

impl std::fmt::Debug for LoadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadCoordinator")
            .field("policy", &self.shared.policy)
            .field("in_flight", &self.in_flight_count())
            .finish()
    }
}

/// Runs attempts for one request until it succeeds, fails terminally or
/// exhausts the policy, then resolves it.
async fn drive<F, Fut>(shared: Arc<LoaderShared>, key: String, request_id: u64, mut fetcher: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = LoadResult> + Send + 'static,
{
    let max_attempts = shared.policy.max_attempts.max(1);
    let mut attempt = 0;

    let outcome = loop {
        attempt += 1;
        if let Some(request) = shared.in_flight.lock().get_mut(&key) {
            if request.id == request_id {
                request.attempt = attempt;
            }
        }

        match fetcher().await {
            Ok(resource) => break Ok(resource),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                warn!(
                    key = %redact_url(&key),
                    attempt,
                    max_attempts,
                    error = %err,
                    "Load attempt failed, retrying"
                );
                tokio::time::sleep(shared.policy.backoff).await;
            }
            Err(err) => break Err(err),
        }
    };

    match &outcome {
        Ok(resource) => {
            info!(
                key = %redact_url(&key),
                attempt,
                size_bytes = resource.size_bytes(),
                "Load succeeded"
            );
            let stored = shared
                .cache
                .put(&key, resource.clone(), resource.size_bytes())
                .into_result(&key);
            if let Err(rejected) = stored {
                debug!(error = %rejected, "Serving resource uncached");
            }
        }
        Err(err) => {
            warn!(key = %redact_url(&key), attempt, error = %err, "Load failed");
        }
    }

    if let Some(request) = shared.take_request(&key, request_id) {
        request.resolve(outcome);
    }
}

/// Removes a subscriber whose `load` future was dropped before resolution.
struct SubscriptionGuard {
    shared: Arc<LoaderShared>,
    key: String,
    id: u64,
    armed: bool,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let mut in_flight = self.shared.in_flight.lock();
        let Some(request) = in_flight.get_mut(&self.key) else {
            return;
        };

        let before = request.subscribers.len();
        request.subscribers.retain(|(id, _)| *id != self.id);
        if request.subscribers.len() == before || !request.subscribers.is_empty() {
            return;
        }

        if let Some(abandoned) = in_flight.remove(&self.key) {
            if let Some(driver) = abandoned.driver {
                driver.abort();
            }
            debug!(key = %redact_url(&self.key), "Abandoned load without subscribers");
        }
    }
}
