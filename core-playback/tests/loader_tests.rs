//! Load deduplication and abandonment.

mod common;

use common::{settle, Harness, ScriptedFetchers};
use core_playback::{FetcherFactory, LoadCoordinator, LoadError, ResourceCache, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_concurrent_loads_share_one_fetch() {
    let h = Harness::new();
    h.fetchers.delay("hola", Duration::from_millis(300));

    let loads = (0..8).map(|_| h.loader.load("hola", h.fetchers.fetcher("hola")));
    let results = futures::future::join_all(loads).await;

    assert_eq!(h.fetchers.calls("hola"), 1);
    let first = results[0].as_ref().unwrap();
    for result in &results {
        assert!(result.as_ref().unwrap().ptr_eq(first));
    }
    assert!(h.cache.contains("hola"));
    assert_eq!(h.loader.in_flight_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failure_reaches_every_subscriber() {
    let h = Harness::with_limits(4096, RetryPolicy::new(2, Duration::from_millis(50)));
    h.fetchers.fail("gone");

    let loads = (0..3).map(|_| h.loader.load("gone", h.fetchers.fetcher("gone")));
    let results = futures::future::join_all(loads).await;

    assert_eq!(h.fetchers.calls("gone"), 2);
    for result in results {
        assert_eq!(result.unwrap_err(), LoadError::Fetch("HTTP 503".to_string()));
    }
    assert!(!h.cache.contains("gone"));
}

#[tokio::test(start_paused = true)]
async fn test_last_dropped_subscriber_abandons_request() {
    let h = Harness::new();
    h.fetchers.delay("slow", Duration::from_secs(10));

    let outcome = tokio::time::timeout(
        Duration::from_millis(100),
        h.loader.load("slow", h.fetchers.fetcher("slow")),
    )
    .await;

    assert!(outcome.is_err());
    assert!(!h.loader.is_loading("slow"));
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(!h.cache.contains("slow"));
}

#[tokio::test(start_paused = true)]
async fn test_remaining_subscriber_keeps_request_alive() {
    let cache = Arc::new(ResourceCache::new(4096));
    let loader = LoadCoordinator::new(cache, RetryPolicy::default());
    let fetchers = ScriptedFetchers::new();
    fetchers.delay("perro", Duration::from_secs(1));

    let kept = {
        let loader = loader.clone();
        let fetcher = fetchers.fetcher("perro");
        tokio::spawn(async move { loader.load("perro", fetcher).await })
    };
    settle().await;

    let dropped = tokio::time::timeout(
        Duration::from_millis(10),
        loader.load("perro", fetchers.fetcher("perro")),
    )
    .await;
    assert!(dropped.is_err());
    assert!(loader.is_loading("perro"));
    assert_eq!(loader.subscriber_count("perro"), 1);

    assert!(kept.await.unwrap().is_ok());
    assert_eq!(fetchers.calls("perro"), 1);
    assert!(loader.cache().contains("perro"));
}
