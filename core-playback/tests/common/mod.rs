//! Shared fakes for core-playback integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    AudioFormat, AudioOutput, AudioResource, CompletionFuture, PlaybackSessionId, SpeechOptions,
    SpeechRequest, SpeechSynthesizer,
};
use core_playback::{
    BoxedFetcher, FallbackSynthesizer, FetcherFactory, LoadCoordinator, LoadError,
    PlaybackController, ResourceCache, RetryPolicy,
};
use core_runtime::events::{CoreEvent, EventBus, PlaybackState};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};

/// Samples per fake clip (64 bytes).
pub const CLIP_SAMPLES: usize = 16;

pub fn clip(samples: usize) -> AudioResource {
    AudioResource::from_samples(AudioFormat::speech_mono(), vec![0.25; samples])
}

/// Fetcher factory with per-key delays, failures and call counts.
#[derive(Default)]
pub struct ScriptedFetchers {
    calls: Arc<Mutex<HashMap<String, usize>>>,
    delays: Mutex<HashMap<String, Duration>>,
    failing: Mutex<HashSet<String>>,
    sizes: Mutex<HashMap<String, usize>>,
}

impl ScriptedFetchers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn delay(&self, key: &str, delay: Duration) {
        self.delays.lock().insert(key.to_string(), delay);
    }

    /// Every attempt for `key` fails with a network error.
    pub fn fail(&self, key: &str) {
        self.failing.lock().insert(key.to_string());
    }

    pub fn samples(&self, key: &str, samples: usize) {
        self.sizes.lock().insert(key.to_string(), samples);
    }

    pub fn calls(&self, key: &str) -> usize {
        self.calls.lock().get(key).copied().unwrap_or(0)
    }
}

impl FetcherFactory for ScriptedFetchers {
    fn fetcher(&self, key: &str) -> BoxedFetcher {
        let calls = Arc::clone(&self.calls);
        let key = key.to_string();
        let delay = self.delays.lock().get(&key).copied();
        let fails = self.failing.lock().contains(&key);
        let samples = self.sizes.lock().get(&key).copied().unwrap_or(CLIP_SAMPLES);

        Box::new(move || {
            *calls.lock().entry(key.clone()).or_default() += 1;
            async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if fails {
                    Err(LoadError::Fetch("HTTP 503".to_string()))
                } else {
                    Ok(clip(samples))
                }
            }
            .boxed()
        })
    }
}

type Completion = oneshot::Sender<BridgeResult<()>>;

fn completion_future(rx: oneshot::Receiver<BridgeResult<()>>) -> CompletionFuture {
    // A dropped sender means the fake was torn down; treat it as "never ends".
    async move {
        match rx.await {
            Ok(result) => result,
            Err(_) => futures::future::pending().await,
        }
    }
    .boxed()
}

/// Audio output that records calls and completes only when told to.
#[derive(Default)]
pub struct FakeOutput {
    pub started: Mutex<Vec<(PlaybackSessionId, AudioResource)>>,
    pub stopped: Mutex<Vec<PlaybackSessionId>>,
    pub paused: Mutex<Vec<PlaybackSessionId>>,
    pub resumed: Mutex<Vec<PlaybackSessionId>>,
    pub unavailable: AtomicBool,
    pub fail_start: AtomicBool,
    completions: Mutex<Vec<(PlaybackSessionId, Completion)>>,
}

impl FakeOutput {
    pub fn started_sessions(&self) -> Vec<PlaybackSessionId> {
        self.started.lock().iter().map(|(id, _)| *id).collect()
    }

    /// Resolve the completion future of `session`.
    pub fn finish(&self, session: PlaybackSessionId, result: BridgeResult<()>) -> bool {
        let mut completions = self.completions.lock();
        match completions.iter().position(|(id, _)| *id == session) {
            Some(index) => completions.remove(index).1.send(result).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl AudioOutput for FakeOutput {
    fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }

    async fn start(
        &self,
        session: PlaybackSessionId,
        resource: AudioResource,
    ) -> BridgeResult<CompletionFuture> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("device busy".to_string()));
        }
        self.started.lock().push((session, resource));
        let (tx, rx) = oneshot::channel();
        self.completions.lock().push((session, tx));
        Ok(completion_future(rx))
    }

    async fn pause(&self, session: PlaybackSessionId) -> BridgeResult<()> {
        self.paused.lock().push(session);
        Ok(())
    }

    async fn resume(&self, session: PlaybackSessionId) -> BridgeResult<()> {
        self.resumed.lock().push(session);
        Ok(())
    }

    async fn stop(&self, session: PlaybackSessionId) -> BridgeResult<()> {
        self.stopped.lock().push(session);
        Ok(())
    }
}

/// Speech engine that records utterances.
#[derive(Default)]
pub struct FakeSpeech {
    pub spoken: Mutex<Vec<SpeechRequest>>,
    pub cancels: Mutex<usize>,
    /// Refuse every utterance.
    pub fail_speak: AtomicBool,
    completions: Mutex<Vec<Completion>>,
}

impl FakeSpeech {
    pub fn texts(&self) -> Vec<String> {
        self.spoken.lock().iter().map(|r| r.text.clone()).collect()
    }

    /// Finish the oldest pending utterance.
    pub fn finish(&self, result: BridgeResult<()>) -> bool {
        let mut completions = self.completions.lock();
        if completions.is_empty() {
            return false;
        }
        completions.remove(0).send(result).is_ok()
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn speak(&self, request: SpeechRequest) -> BridgeResult<CompletionFuture> {
        if self.fail_speak.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("voice data missing".to_string()));
        }
        self.spoken.lock().push(request);
        let (tx, rx) = oneshot::channel();
        self.completions.lock().push(tx);
        Ok(completion_future(rx))
    }

    async fn cancel(&self) -> BridgeResult<()> {
        *self.cancels.lock() += 1;
        Ok(())
    }
}

/// Fully wired controller over fakes.
pub struct Harness {
    pub cache: Arc<ResourceCache>,
    pub loader: LoadCoordinator,
    pub fetchers: Arc<ScriptedFetchers>,
    pub output: Arc<FakeOutput>,
    pub speech: Arc<FakeSpeech>,
    pub bus: EventBus,
    pub controller: PlaybackController,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_limits(4096, RetryPolicy::new(3, Duration::from_millis(100)))
    }

    pub fn with_limits(ceiling_bytes: u64, policy: RetryPolicy) -> Self {
        Self::assemble(ceiling_bytes, policy, true)
    }

    /// A host without any speech engine; `speech` is never consulted.
    pub fn without_speech() -> Self {
        Self::assemble(4096, RetryPolicy::new(1, Duration::from_millis(10)), false)
    }

    fn assemble(ceiling_bytes: u64, policy: RetryPolicy, speech_installed: bool) -> Self {
        let bus = EventBus::new(256);
        let cache = Arc::new(ResourceCache::new(ceiling_bytes).with_event_bus(bus.clone()));
        let loader = LoadCoordinator::new(Arc::clone(&cache), policy);
        let fetchers = ScriptedFetchers::new();
        let output = Arc::new(FakeOutput::default());
        let speech = Arc::new(FakeSpeech::default());

        let controller = PlaybackController::builder(loader.clone(), fetchers.clone())
            .output(output.clone())
            .fallback(if speech_installed {
                FallbackSynthesizer::new(
                    Some(speech.clone()),
                    SpeechOptions::default().with_locale("es-ES"),
                )
            } else {
                FallbackSynthesizer::unavailable()
            })
            .event_bus(bus.clone())
            .build();

        Self {
            cache,
            loader,
            fetchers,
            output,
            speech,
            bus,
            controller,
        }
    }
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Playback states received so far, in order.
pub fn drain_states(rx: &mut broadcast::Receiver<CoreEvent>) -> Vec<PlaybackState> {
    let mut states = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let CoreEvent::Playback(event) = event {
            states.push(event.state);
        }
    }
    states
}
