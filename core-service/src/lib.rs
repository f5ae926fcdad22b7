//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (resource fetcher,
//! clip decoder, audio output, speech engine) into the playback core and
//! exposes the caller interface as [`AudioService`]. Desktop apps typically
//! enable the `desktop-shims` feature (which supplies a `bridge-desktop`
//! fetcher) together with `decoder` (Symphonia); mobile and web hosts inject
//! their own bridges.
//!
//! ```ignore
//! use core_runtime::config::AudioConfig;
//! use core_service::{AudioDependencies, AudioService};
//! use std::sync::Arc;
//!
//! let deps = AudioDependencies::builder()
//!     .output(Arc::new(MyAudioEngine::new()))
//!     .speech(Arc::new(MySpeechEngine::new()))
//!     .build()?;
//! let audio = AudioService::new(AudioConfig::default(), deps)?;
//!
//! audio.play("https://cdn.example.com/es/gato.mp3", Some("gato")).await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{
    AudioOutput, ClipDecoder, Clock, PlaybackSessionId, ResourceFetcher, SpeechSynthesizer,
    SystemClock,
};
use core_playback::{
    CacheStats, FallbackSynthesizer, FetchPipeline, FetcherFactory, LoadCoordinator,
    PlaybackController, PlaybackSnapshot, PreloadHandle, PreloadScheduler, ResourceCache,
    RetryPolicy,
};
use core_runtime::config::AudioConfig;
use core_runtime::events::{CoreEvent, EventBus, EventStream, PlaybackState, Receiver};
use tracing::info;

/// Aggregated handle to the bridges the audio core runs on.
pub struct AudioDependencies {
    pub fetcher: Arc<dyn ResourceFetcher>,
    pub decoder: Arc<dyn ClipDecoder>,
    pub output: Option<Arc<dyn AudioOutput>>,
    pub speech: Option<Arc<dyn SpeechSynthesizer>>,
    pub clock: Arc<dyn Clock>,
}

impl AudioDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        fetcher: Arc<dyn ResourceFetcher>,
        decoder: Arc<dyn ClipDecoder>,
        output: Option<Arc<dyn AudioOutput>>,
        speech: Option<Arc<dyn SpeechSynthesizer>>,
    ) -> Self {
        Self {
            fetcher,
            decoder,
            output,
            speech,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn builder() -> AudioDependenciesBuilder {
        AudioDependenciesBuilder::default()
    }
}

/// Builder for [`AudioDependencies`].
///
/// The fetcher and decoder are required. When omitted they fall back to the
/// feature-gated defaults (`desktop-shims`, `decoder`) or fail with
/// [`CoreError::CapabilityMissing`]. Output and speech stay optional: without
/// them playback degrades to `UnsupportedCapability` at call time.
#[derive(Default)]
pub struct AudioDependenciesBuilder {
    fetcher: Option<Arc<dyn ResourceFetcher>>,
    decoder: Option<Arc<dyn ClipDecoder>>,
    output: Option<Arc<dyn AudioOutput>>,
    speech: Option<Arc<dyn SpeechSynthesizer>>,
    clock: Option<Arc<dyn Clock>>,
}

impl AudioDependenciesBuilder {
    pub fn fetcher(mut self, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn ClipDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn output(mut self, output: Arc<dyn AudioOutput>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn speech(mut self, speech: Arc<dyn SpeechSynthesizer>) -> Self {
        self.speech = Some(speech);
        self
    }

    /// Time source for cache timestamps and session start times.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<AudioDependencies> {
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => provide_default_fetcher()?,
        };
        let decoder = match self.decoder {
            Some(decoder) => decoder,
            None => provide_default_decoder()?,
        };

        Ok(AudioDependencies {
            fetcher,
            decoder,
            output: self.output,
            speech: self.speech,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        })
    }
}

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
fn provide_default_fetcher() -> Result<Arc<dyn ResourceFetcher>> {
    use bridge_desktop::DesktopResourceFetcher;

    let fetcher = DesktopResourceFetcher::new()
        .map_err(|e| CoreError::InitializationFailed(format!("default fetcher: {}", e)))?;
    Ok(Arc::new(fetcher))
}

#[cfg(not(all(feature = "desktop-shims", not(target_arch = "wasm32"))))]
fn provide_default_fetcher() -> Result<Arc<dyn ResourceFetcher>> {
    Err(CoreError::CapabilityMissing {
        capability: "ResourceFetcher".to_string(),
        message: "A ResourceFetcher is required to download clips. \
                 Desktop: enable the 'desktop-shims' feature to use DesktopResourceFetcher. \
                 Mobile/Web: inject a fetcher backed by the platform HTTP stack."
            .to_string(),
    })
}

#[cfg(feature = "decoder")]
fn provide_default_decoder() -> Result<Arc<dyn ClipDecoder>> {
    Ok(Arc::new(core_playback::SymphoniaClipDecoder::new()))
}

#[cfg(not(feature = "decoder"))]
fn provide_default_decoder() -> Result<Arc<dyn ClipDecoder>> {
    Err(CoreError::CapabilityMissing {
        capability: "ClipDecoder".to_string(),
        message: "A ClipDecoder is required to turn fetched bytes into audio. \
                 Enable the 'decoder' feature to use the Symphonia decoder, \
                 or inject the platform's native decoder."
            .to_string(),
    })
}

struct ServiceInner {
    config: AudioConfig,
    event_bus: EventBus,
    cache: Arc<ResourceCache>,
    controller: PlaybackController,
    preloader: PreloadScheduler,
}

/// Primary façade exposed to host applications.
///
/// Cheap to clone; clones drive the same cache and playback session.
#[derive(Clone)]
pub struct AudioService {
    inner: Arc<ServiceInner>,
}

impl AudioService {
    /// Validate `config` and wire the playback core onto `deps`.
    pub fn new(config: AudioConfig, deps: AudioDependencies) -> Result<Self> {
        config.validate()?;

        let event_bus = EventBus::new(config.event_buffer_size);
        let cache = Arc::new(
            ResourceCache::new(config.ceiling_bytes)
                .with_clock(Arc::clone(&deps.clock))
                .with_event_bus(event_bus.clone()),
        );
        let loader = LoadCoordinator::new(Arc::clone(&cache), RetryPolicy::from_config(&config));
        let fetchers: Arc<dyn FetcherFactory> =
            Arc::new(FetchPipeline::new(deps.fetcher, deps.decoder));

        let mut controller = PlaybackController::builder(loader.clone(), Arc::clone(&fetchers))
            .fallback(FallbackSynthesizer::new(deps.speech, config.speech.clone()))
            .clock(deps.clock)
            .event_bus(event_bus.clone());
        if let Some(output) = deps.output {
            controller = controller.output(output);
        }
        let controller = controller.build();

        let preloader = PreloadScheduler::new(loader, fetchers, config.preload_concurrency)
            .with_event_bus(event_bus.clone());

        info!(
            ceiling_bytes = config.ceiling_bytes,
            max_retry_attempts = config.max_retry_attempts,
            preload_concurrency = config.preload_concurrency,
            "Audio service initialized"
        );

        Ok(Self {
            inner: Arc::new(ServiceInner {
                config,
                event_bus,
                cache,
                controller,
                preloader,
            }),
        })
    }

    /// Play `resource_id`, speaking `fallback_text` if the clip fails.
    ///
    /// Resolves once the session is audible or has failed. A session that is
    /// superseded by a later `play` or a `stop` resolves to
    /// `PlaybackError::Cancelled`.
    pub async fn play(
        &self,
        resource_id: &str,
        fallback_text: Option<&str>,
    ) -> Result<PlaybackSessionId> {
        let session = self
            .inner
            .controller
            .play(resource_id.to_string(), fallback_text.map(str::to_string))
            .await?;
        Ok(session)
    }

    pub async fn pause(&self) -> Result<()> {
        self.inner.controller.pause().await?;
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        self.inner.controller.resume().await?;
        Ok(())
    }

    pub async fn stop(&self) {
        self.inner.controller.stop().await;
    }

    /// Warm the cache in the background. Failures are only logged.
    ///
    /// Must be called from within a tokio runtime.
    pub fn preload<I, K>(&self, resource_ids: I) -> PreloadHandle
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.inner.preloader.preload(resource_ids)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    /// Drop every cached clip. Returns the number of entries removed.
    pub fn clear_cache(&self) -> usize {
        self.inner.cache.clear()
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.controller.state()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.inner.controller.snapshot()
    }

    /// Playback state transitions.
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.inner.event_bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Playback(_)))
    }

    /// Every core event, including cache and preload events.
    pub fn subscribe_all(&self) -> Receiver<CoreEvent> {
        self.inner.event_bus.subscribe()
    }

    pub fn config(&self) -> &AudioConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for AudioService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioService")
            .field("config", &self.inner.config)
            .field("controller", &self.inner.controller)
            .finish()
    }
}

/// Build an [`AudioService`] on the desktop default bridges.
///
/// Requires the `decoder` feature for the default clip decoder; audio
/// output and speech must still be injected through
/// [`AudioDependencies::builder`] to make anything audible.
#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub fn bootstrap_desktop(config: AudioConfig) -> Result<AudioService> {
    AudioService::new(config, AudioDependencies::builder().build()?)
}
