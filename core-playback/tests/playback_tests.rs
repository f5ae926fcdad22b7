//! Playback controller state machine against fake host bridges.

mod common;

use bridge_traits::BridgeError;
use common::{drain_states, settle, Harness};
use core_playback::{PlaybackError, PlaybackRoute, PreloadScheduler, RetryPolicy};
use core_runtime::events::{CacheEvent, CoreEvent, PlaybackState};
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
async fn test_play_completes_back_to_idle() {
    let h = Harness::new();
    let mut rx = h.bus.subscribe();

    let session = h.controller.play("gato".into(), None).await.unwrap();

    assert_eq!(h.controller.state(), PlaybackState::Playing);
    assert_eq!(h.output.started_sessions(), vec![session]);
    assert_eq!(h.controller.snapshot().route, Some(PlaybackRoute::Clip));
    assert!(h.cache.contains("gato"));

    assert!(h.output.finish(session, Ok(())));
    settle().await;

    assert_eq!(h.controller.state(), PlaybackState::Idle);
    assert_eq!(
        drain_states(&mut rx),
        vec![
            PlaybackState::Loading,
            PlaybackState::Playing,
            PlaybackState::Idle
        ]
    );
}

#[tokio::test]
async fn test_second_play_uses_cache() {
    let h = Harness::new();

    let first = h.controller.play("gato".into(), None).await.unwrap();
    let second = h.controller.play("gato".into(), None).await.unwrap();

    assert_ne!(first, second);
    assert_eq!(h.fetchers.calls("gato"), 1);
    assert_eq!(*h.output.stopped.lock(), vec![first]);
    assert_eq!(h.cache.stats().hits, 1);
}

#[tokio::test]
async fn test_stop_is_immediate() {
    let h = Harness::new();
    let session = h.controller.play("gato".into(), None).await.unwrap();

    h.controller.stop().await;

    assert_eq!(h.controller.state(), PlaybackState::Idle);
    assert_eq!(*h.output.stopped.lock(), vec![session]);

    // A completion arriving after stop changes nothing.
    h.output.finish(session, Err(BridgeError::OperationFailed("late".into())));
    settle().await;
    assert_eq!(h.controller.state(), PlaybackState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_loading() {
    let h = Harness::new();
    h.fetchers.delay("lento", Duration::from_secs(5));

    let controller = h.controller.clone();
    let pending = tokio::spawn(async move { controller.play("lento".into(), None).await });
    settle().await;
    assert_eq!(h.controller.state(), PlaybackState::Loading);

    h.controller.stop().await;

    assert_eq!(h.controller.state(), PlaybackState::Idle);
    assert_eq!(pending.await.unwrap(), Err(PlaybackError::Cancelled));
    assert!(h.output.started_sessions().is_empty());
    assert!(!h.loader.is_loading("lento"));
}

#[tokio::test(start_paused = true)]
async fn test_new_play_supersedes_pending_one() {
    let h = Harness::new();
    h.fetchers.delay("x", Duration::from_secs(1));

    let controller = h.controller.clone();
    let first = tokio::spawn(async move { controller.play("x".into(), None).await });
    settle().await;

    let second = h.controller.play("y".into(), None).await.unwrap();

    assert_eq!(first.await.unwrap(), Err(PlaybackError::Cancelled));
    assert_eq!(h.controller.state(), PlaybackState::Playing);
    assert_eq!(h.controller.snapshot().key.as_deref(), Some("y"));
    assert_eq!(h.output.started_sessions(), vec![second]);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.output.started_sessions(), vec![second]);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_failures_fall_back_to_speech_once() {
    let h = Harness::new();
    h.fetchers.fail("gato");

    let session = h
        .controller
        .play("gato".into(), Some("gato".into()))
        .await
        .unwrap();

    assert_eq!(h.fetchers.calls("gato"), 3);
    assert_eq!(h.speech.texts(), vec!["gato".to_string()]);
    assert_eq!(
        h.speech.spoken.lock()[0].options.locale.as_deref(),
        Some("es-ES")
    );
    assert!(h.output.started_sessions().is_empty());

    let snapshot = h.controller.snapshot();
    assert_eq!(snapshot.session_id, Some(session));
    assert_eq!(snapshot.state, PlaybackState::Playing);
    assert_eq!(snapshot.route, Some(PlaybackRoute::Speech));

    assert!(h.speech.finish(Ok(())));
    settle().await;
    assert_eq!(h.controller.state(), PlaybackState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_failure_without_fallback_is_error() {
    let h = Harness::with_limits(4096, RetryPolicy::new(2, Duration::from_millis(10)));
    h.fetchers.fail("gato");

    let err = h.controller.play("gato".into(), None).await.unwrap_err();

    assert_eq!(err, PlaybackError::Fetch("HTTP 503".to_string()));
    assert_eq!(h.controller.state(), PlaybackState::Error);
    assert_eq!(h.controller.snapshot().error, Some(err));
    assert!(h.speech.texts().is_empty());
}

#[tokio::test]
async fn test_blank_fallback_text_is_ignored() {
    let h = Harness::new();
    h.output.fail_start.store(true, Ordering::SeqCst);

    let err = h
        .controller
        .play("gato".into(), Some("   ".into()))
        .await
        .unwrap_err();

    assert!(matches!(err, PlaybackError::Output(_)));
    assert!(h.speech.texts().is_empty());
}

#[tokio::test]
async fn test_missing_output_speaks_without_fetching() {
    let h = Harness::new();
    h.output.unavailable.store(true, Ordering::SeqCst);

    h.controller
        .play("hola".into(), Some("hola".into()))
        .await
        .unwrap();

    assert_eq!(h.fetchers.calls("hola"), 0);
    assert_eq!(h.speech.texts(), vec!["hola".to_string()]);
}

#[tokio::test]
async fn test_pause_and_resume() {
    let h = Harness::new();

    h.controller.pause().await.unwrap();
    assert!(h.output.paused.lock().is_empty());

    let session = h.controller.play("gato".into(), None).await.unwrap();
    h.controller.pause().await.unwrap();
    assert_eq!(h.controller.state(), PlaybackState::Paused);

    h.controller.pause().await.unwrap();
    assert_eq!(h.output.paused.lock().len(), 1);

    h.controller.resume().await.unwrap();
    assert_eq!(h.controller.state(), PlaybackState::Playing);
    assert_eq!(*h.output.resumed.lock(), vec![session]);
}

#[tokio::test(start_paused = true)]
async fn test_failing_speech_fallback_is_error() {
    let h = Harness::with_limits(4096, RetryPolicy::new(2, Duration::from_millis(10)));
    h.fetchers.fail("gato");
    h.speech.fail_speak.store(true, Ordering::SeqCst);
    let mut rx = h.bus.subscribe();

    let err = h
        .controller
        .play("gato".into(), Some("gato".into()))
        .await
        .unwrap_err();

    assert!(matches!(err, PlaybackError::Synthesis(_)));
    assert_eq!(h.fetchers.calls("gato"), 2);
    let snapshot = h.controller.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Error);
    assert_eq!(snapshot.route, Some(PlaybackRoute::Speech));
    assert_eq!(snapshot.error, Some(err));
    assert_eq!(
        drain_states(&mut rx),
        vec![PlaybackState::Loading, PlaybackState::Error]
    );

    h.controller.stop().await;
    assert_eq!(h.controller.state(), PlaybackState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_without_speech_engine_is_unsupported() {
    let h = Harness::without_speech();
    h.fetchers.fail("gato");

    let err = h
        .controller
        .play("gato".into(), Some("gato".into()))
        .await
        .unwrap_err();

    assert!(matches!(err, PlaybackError::UnsupportedCapability(_)));
    assert_eq!(h.controller.state(), PlaybackState::Error);
    assert!(h.speech.texts().is_empty());
}

#[tokio::test]
async fn test_stop_from_paused() {
    let h = Harness::new();
    let session = h.controller.play("gato".into(), None).await.unwrap();
    h.controller.pause().await.unwrap();
    assert_eq!(h.controller.state(), PlaybackState::Paused);

    h.controller.stop().await;

    assert_eq!(h.controller.state(), PlaybackState::Idle);
    assert_eq!(*h.output.stopped.lock(), vec![session]);

    // Nothing left to resume.
    h.controller.resume().await.unwrap();
    assert!(h.output.resumed.lock().is_empty());
    assert_eq!(h.controller.state(), PlaybackState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_stop_from_error() {
    let h = Harness::with_limits(4096, RetryPolicy::new(1, Duration::from_millis(10)));
    h.fetchers.fail("gato");
    h.controller.play("gato".into(), None).await.unwrap_err();
    assert_eq!(h.controller.state(), PlaybackState::Error);

    h.controller.stop().await;

    let snapshot = h.controller.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Idle);
    assert_eq!(snapshot.error, None);
    assert!(h.output.stopped.lock().is_empty());
}

#[tokio::test]
async fn test_output_failure_mid_clip_is_error() {
    let h = Harness::new();
    let session = h.controller.play("gato".into(), None).await.unwrap();

    h.output
        .finish(session, Err(BridgeError::OperationFailed("device lost".into())));
    settle().await;

    let snapshot = h.controller.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Error);
    assert!(matches!(snapshot.error, Some(PlaybackError::Output(_))));
}

#[tokio::test]
async fn test_oversized_clip_plays_uncached() {
    let h = Harness::with_limits(32, RetryPolicy::default());
    let mut rx = h.bus.subscribe();

    h.controller.play("largo".into(), None).await.unwrap();

    assert_eq!(h.controller.state(), PlaybackState::Playing);
    assert!(!h.cache.contains("largo"));
    let rejected = std::iter::from_fn(|| rx.try_recv().ok())
        .any(|event| matches!(event, CoreEvent::Cache(CacheEvent::Rejected { .. })));
    assert!(rejected);
}

#[tokio::test(start_paused = true)]
async fn test_play_joins_inflight_preload() {
    let h = Harness::new();
    h.fetchers.delay("gato", Duration::from_millis(500));
    let scheduler = PreloadScheduler::new(h.loader.clone(), h.fetchers.clone(), 2);

    let batch = scheduler.preload(["gato"]);
    settle().await;
    assert!(h.loader.is_loading("gato"));

    h.controller.play("gato".into(), None).await.unwrap();
    let report = batch.wait().await.unwrap();

    assert_eq!(h.fetchers.calls("gato"), 1);
    assert_eq!(report.loaded, 1);
    assert_eq!(h.controller.state(), PlaybackState::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_never_two_sessions_playing() {
    let h = Harness::new();
    let mut rx = h.bus.subscribe();

    for key in ["uno", "dos", "tres"] {
        h.controller.play(key.into(), None).await.unwrap();
    }

    let mut playing: Option<String> = None;
    while let Ok(CoreEvent::Playback(event)) = rx.try_recv() {
        match event.state {
            PlaybackState::Playing => {
                assert!(playing.is_none(), "two sessions playing");
                playing = Some(event.session_id);
            }
            _ if playing.as_deref() == Some(event.session_id.as_str()) => playing = None,
            _ => {}
        }
    }
    assert!(playing.is_some());
    assert_eq!(h.output.stopped.lock().len(), 2);
}
