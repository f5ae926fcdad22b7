//! # Playback Controller
//!
//! Owns the single "currently audible" session and its state machine.
//!
//! ## States
//!
//! ```text
//!            play                 resolved + started
//! Idle ──────────────> Loading ─────────────────────> Playing ──(complete)──> Idle
//!                         │                           │    ▲
//!                         │ failed, no fallback       │    │
//!                         ▼                     pause │    │ resume
//!                       Error                         ▼    │
//!                                                    Paused
//!
//! any state ──stop──> Idle
//! ```
//!
//! A resource is resolved from the [`ResourceCache`] first, then through the
//! [`LoadCoordinator`]. If that fails and fallback text was supplied, the
//! text is spoken through the [`FallbackSynthesizer`] instead.
//!
//! ## Sessions
//!
//! Every `play` creates a new session and retires the previous one before
//! anything else happens: the old session's cancellation token fires (which
//! drops its load subscription) and its output is silenced. A generation
//! counter guards every later transition, so a late completion or a late
//! load result from a retired session can never change the visible state.

use crate::cache::ResourceCache;
use crate::error::{output_error, PlaybackError, Result};
use crate::fallback::FallbackSynthesizer;
use crate::loader::LoadCoordinator;
use crate::pipeline::FetcherFactory;
use bridge_traits::{AudioOutput, Clock, PlaybackSessionId, SystemClock};
use chrono::{DateTime, Utc};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent, PlaybackState};
use core_runtime::logging::redact_url;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Instrument};

/// Which output makes a session audible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackRoute {
    /// A decoded clip through the audio output.
    Clip,
    /// Synthesized speech through the fallback.
    Speech,
}

/// Read-only view of the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub session_id: Option<PlaybackSessionId>,
    pub key: Option<String>,
    pub state: PlaybackState,
    pub route: Option<PlaybackRoute>,
    pub started_at: Option<DateTime<Utc>>,
    pub error: Option<PlaybackError>,
}

struct Session {
    id: PlaybackSessionId,
    key: String,
    state: PlaybackState,
    route: Option<PlaybackRoute>,
    started_at: DateTime<Utc>,
    error: Option<PlaybackError>,
    cancel: CancellationToken,
}

/// A session that lost the slot and may still need silencing.
struct Retired {
    id: PlaybackSessionId,
    route: Option<PlaybackRoute>,
}

struct Slot {
    generation: u64,
    session: Option<Session>,
}

type Completion = BoxFuture<'static, Result<()>>;

struct ControllerShared {
    cache: Arc<ResourceCache>,
    loader: LoadCoordinator,
    fetchers: Arc<dyn FetcherFactory>,
    output: Option<Arc<dyn AudioOutput>>,
    fallback: FallbackSynthesizer,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    slot: Mutex<Slot>,
}

/// Builder for [`PlaybackController`].
pub struct PlaybackControllerBuilder {
    loader: LoadCoordinator,
    fetchers: Arc<dyn FetcherFactory>,
    output: Option<Arc<dyn AudioOutput>>,
    fallback: FallbackSynthesizer,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
}

impl PlaybackControllerBuilder {
    /// Platform audio output. Without one every clip request fails with
    /// `UnsupportedCapability` (and goes to the fallback when text is given).
    pub fn output(mut self, output: Arc<dyn AudioOutput>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn fallback(mut self, fallback: FallbackSynthesizer) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn build(self) -> PlaybackController {
        PlaybackController {
            shared: Arc::new(ControllerShared {
                cache: Arc::clone(self.loader.cache()),
                loader: self.loader,
                fetchers: self.fetchers,
                output: self.output,
                fallback: self.fallback,
                clock: self.clock,
                event_bus: self.event_bus,
                slot: Mutex::new(Slot {
                    generation: 0,
                    session: None,
                }),
            }),
        }
    }
}

/// Single-session playback state machine.
///
/// Cheap to clone; clones control the same session slot.
#[derive(Clone)]
pub struct PlaybackController {
    shared: Arc<ControllerShared>,
}

impl PlaybackController {
    /// Start building a controller that resolves misses through `loader`,
    /// using `fetchers` to create per-key fetch operations.
    pub fn builder(
        loader: LoadCoordinator,
        fetchers: Arc<dyn FetcherFactory>,
    ) -> PlaybackControllerBuilder {
        PlaybackControllerBuilder {
            loader,
            fetchers,
            output: None,
            fallback: FallbackSynthesizer::unavailable(),
            clock: Arc::new(SystemClock),
            event_bus: None,
        }
    }

    /// Play `key`, falling back to speaking `fallback_text` if the clip
    /// cannot be played.
    ///
    /// Any previous session is retired first. Resolves once the session is
    /// audible (`Ok`) or has reached `Error` (`Err`). If the session is
    /// superseded or stopped before that, resolves to
    /// `Err(PlaybackError::Cancelled)`.
    ///
    /// Dropping the returned future does not cancel the session; use
    /// [`stop`](Self::stop).
    #[instrument(skip_all, fields(key = %redact_url(&key)))]
    pub async fn play(
        &self,
        key: String,
        fallback_text: Option<String>,
    ) -> Result<PlaybackSessionId> {
        let (id, generation, token, retired) = self.shared.begin(&key);

        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            shared
                .run_session(id, generation, token, key, fallback_text, retired)
                .await
        }
        .in_current_span());

        match task.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                error!(error = %join_error, "Playback session task failed");
                let err = PlaybackError::Output(format!("session task failed: {}", join_error));
                self.shared.enter_error(generation, err.clone());
                Err(err)
            }
        }
    }

    /// Pause the active clip. Only valid from `Playing`; otherwise a no-op.
    ///
    /// Speech cannot be paused, so a session on the speech route ignores it.
    pub async fn pause(&self) -> Result<()> {
        let Some(output) = self.shared.output.clone() else {
            return Ok(());
        };
        let Some((id, generation)) =
            self.shared
                .audible_session(PlaybackState::Playing, PlaybackRoute::Clip)
        else {
            debug!("Pause ignored: nothing playing");
            return Ok(());
        };

        output.pause(id).await.map_err(output_error)?;
        self.shared
            .transition(generation, PlaybackState::Playing, PlaybackState::Paused);
        Ok(())
    }

    /// Resume a paused clip. Only valid from `Paused`; otherwise a no-op.
    pub async fn resume(&self) -> Result<()> {
        let Some(output) = self.shared.output.clone() else {
            return Ok(());
        };
        let Some((id, generation)) =
            self.shared
                .audible_session(PlaybackState::Paused, PlaybackRoute::Clip)
        else {
            debug!("Resume ignored: nothing paused");
            return Ok(());
        };

        output.resume(id).await.map_err(output_error)?;
        self.shared
            .transition(generation, PlaybackState::Paused, PlaybackState::Playing);
        Ok(())
    }

    /// Stop whatever is active and return to `Idle`.
    ///
    /// The state is `Idle` as soon as this is first polled; the pending
    /// load interest is dropped and output is silenced afterwards.
    pub async fn stop(&self) {
        let retired = self.shared.retire_current();
        if let Some(retired) = retired {
            info!(session = %retired.id, "Playback stopped");
            self.shared.silence(retired).await;
        }
    }

    /// Current state; `Idle` when no session exists.
    pub fn state(&self) -> PlaybackState {
        self.shared
            .slot
            .lock()
            .session
            .as_ref()
            .map_or(PlaybackState::Idle, |s| s.state)
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let slot = self.shared.slot.lock();
        match &slot.session {
            Some(s) => PlaybackSnapshot {
                session_id: Some(s.id),
                key: Some(s.key.clone()),
                state: s.state,
                route: s.route,
                started_at: Some(s.started_at),
                error: s.error.clone(),
            },
            None => PlaybackSnapshot {
                session_id: None,
                key: None,
                state: PlaybackState::Idle,
                route: None,
                started_at: None,
                error: None,
            },
        }
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.shared.cache
    }

    pub fn loader(&self) -> &LoadCoordinator {
        &self.shared.loader
    }
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("state", &self.state())
            .field("has_output", &self.shared.output.is_some())
            .finish()
    }
}

impl ControllerShared {
    /// Retire the current session and install a new `Loading` one.
    fn begin(&self, key: &str) -> (PlaybackSessionId, u64, CancellationToken, Option<Retired>) {
        let mut guard = self.slot.lock();
        let slot = &mut *guard;

        slot.generation += 1;
        let retired = slot.session.take().map(|old| self.retire(old));

        let id = PlaybackSessionId::new();
        let token = CancellationToken::new();
        slot.session = Some(Session {
            id,
            key: key.to_string(),
            state: PlaybackState::Loading,
            route: None,
            started_at: self.clock.now(),
            error: None,
            cancel: token.clone(),
        });
        self.emit(PlaybackEvent::new(
            id.to_string(),
            PlaybackState::Loading,
            Some(key.to_string()),
        ));

        (id, slot.generation, token, retired)
    }

    fn retire_current(&self) -> Option<Retired> {
        let mut guard = self.slot.lock();
        let slot = &mut *guard;
        slot.generation += 1;
        slot.session.take().map(|old| self.retire(old))
    }

    /// Cancel a session that just left the slot. Called under the slot lock.
    fn retire(&self, old: Session) -> Retired {
        old.cancel.cancel();
        self.emit(PlaybackEvent::new(
            old.id.to_string(),
            PlaybackState::Idle,
            Some(old.key),
        ));
        Retired {
            id: old.id,
            route: old.route,
        }
    }

    async fn silence(&self, retired: Retired) {
        match retired.route {
            Some(PlaybackRoute::Clip) => {
                if let Some(output) = &self.output {
                    if let Err(err) = output.stop(retired.id).await {
                        warn!(session = %retired.id, error = %err, "Failed to stop audio output");
                    }
                }
            }
            Some(PlaybackRoute::Speech) => {
                if let Err(err) = self.fallback.cancel().await {
                    warn!(session = %retired.id, error = %err, "Failed to cancel speech");
                }
            }
            None => {}
        }
    }

    async fn run_session(
        self: Arc<Self>,
        id: PlaybackSessionId,
        generation: u64,
        token: CancellationToken,
        key: String,
        fallback_text: Option<String>,
        retired: Option<Retired>,
    ) -> Result<PlaybackSessionId> {
        if let Some(retired) = retired {
            self.silence(retired).await;
        }
        if token.is_cancelled() {
            return Err(PlaybackError::Cancelled);
        }

        let clip_error = match self.start_clip(id, generation, &token, &key).await {
            Ok(completion) => {
                return self
                    .enter_playing(id, generation, &token, PlaybackRoute::Clip, completion)
                    .await;
            }
            Err(err) => err,
        };
        if token.is_cancelled() {
            return Err(PlaybackError::Cancelled);
        }

        // On the clip route UnsupportedCapability means "no audio output",
        // which speech can still cover.
        let eligible = clip_error.is_recoverable_by_fallback()
            || matches!(clip_error, PlaybackError::UnsupportedCapability(_));
        let text = fallback_text
            .as_deref()
            .map(str::trim)
            .filter(|text| eligible && !text.is_empty());
        let Some(text) = text else {
            warn!(key = %redact_url(&key), error = %clip_error, "Playback failed");
            self.enter_error(generation, clip_error.clone());
            return Err(clip_error);
        };

        info!(
            key = %redact_url(&key),
            error = %clip_error,
            "Clip unavailable, speaking fallback text"
        );
        self.set_route(generation, PlaybackRoute::Speech);
        let spoken = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(PlaybackError::Cancelled),
            spoken = self.fallback.speak(text, None) => spoken,
        };

        match spoken {
            Ok(utterance) => {
                self.enter_playing(
                    id,
                    generation,
                    &token,
                    PlaybackRoute::Speech,
                    utterance.into_completion(),
                )
                .await
            }
            Err(err) => {
                warn!(key = %redact_url(&key), error = %err, "Speech fallback failed");
                self.enter_error(generation, err.clone());
                Err(err)
            }
        }
    }

    /// Resolve the clip and start the audio output.
    async fn start_clip(
        &self,
        id: PlaybackSessionId,
        generation: u64,
        token: &CancellationToken,
        key: &str,
    ) -> Result<Completion> {
        let output = match &self.output {
            Some(output) if output.is_available() => Arc::clone(output),
            _ => {
                return Err(PlaybackError::UnsupportedCapability(
                    "audio output".to_string(),
                ))
            }
        };

        let resource = match self.cache.get(key) {
            Some(resource) => resource,
            None => {
                let fetcher = self.fetchers.fetcher(key);
                let loaded = tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(PlaybackError::Cancelled),
                    loaded = self.loader.load(key, fetcher) => loaded,
                };
                loaded?
            }
        };

        if token.is_cancelled() {
            return Err(PlaybackError::Cancelled);
        }

        self.set_route(generation, PlaybackRoute::Clip);
        let completion = output.start(id, resource).await.map_err(output_error)?;
        Ok(completion.map(|done| done.map_err(output_error)).boxed())
    }

    async fn enter_playing(
        self: &Arc<Self>,
        id: PlaybackSessionId,
        generation: u64,
        token: &CancellationToken,
        route: PlaybackRoute,
        completion: Completion,
    ) -> Result<PlaybackSessionId> {
        let (current, speech_taken_over) = {
            let mut guard = self.slot.lock();
            let slot = &mut *guard;
            let speech_taken_over = slot
                .session
                .as_ref()
                .is_some_and(|s| s.id != id && s.route == Some(PlaybackRoute::Speech));
            match slot.session.as_mut() {
                Some(session) if slot.generation == generation && !token.is_cancelled() => {
                    session.state = PlaybackState::Playing;
                    session.route = Some(route);
                    self.emit(PlaybackEvent::new(
                        id.to_string(),
                        PlaybackState::Playing,
                        Some(session.key.clone()),
                    ));
                    (true, speech_taken_over)
                }
                _ => (false, speech_taken_over),
            }
        };

        if !current {
            // Output started after the session was retired; silence it
            // unless a newer session already owns the speech engine.
            if !(route == PlaybackRoute::Speech && speech_taken_over) {
                self.silence(Retired {
                    id,
                    route: Some(route),
                })
                .await;
            }
            return Err(PlaybackError::Cancelled);
        }

        info!(session = %id, ?route, "Playback started");

        let shared = Arc::clone(self);
        let token = token.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                outcome = completion => outcome,
            };
            shared.finish(generation, outcome);
        });

        Ok(id)
    }

    /// Natural end of output for `generation`.
    fn finish(&self, generation: u64, outcome: Result<()>) {
        let mut guard = self.slot.lock();
        let slot = &mut *guard;
        if slot.generation != generation {
            return;
        }
        let audible = slot.session.as_ref().is_some_and(|s| {
            matches!(s.state, PlaybackState::Playing | PlaybackState::Paused)
        });
        if !audible {
            return;
        }

        match outcome {
            Ok(()) => {
                if let Some(done) = slot.session.take() {
                    info!(session = %done.id, "Playback completed");
                    self.emit(PlaybackEvent::new(
                        done.id.to_string(),
                        PlaybackState::Idle,
                        Some(done.key),
                    ));
                }
            }
            Err(err) => {
                if let Some(session) = slot.session.as_mut() {
                    warn!(session = %session.id, error = %err, "Playback failed mid-output");
                    session.state = PlaybackState::Error;
                    session.error = Some(err.clone());
                    self.emit(
                        PlaybackEvent::new(
                            session.id.to_string(),
                            PlaybackState::Error,
                            Some(session.key.clone()),
                        )
                        .with_error(err.to_string()),
                    );
                }
            }
        }
    }

    fn enter_error(&self, generation: u64, err: PlaybackError) {
        let mut guard = self.slot.lock();
        let slot = &mut *guard;
        if slot.generation != generation {
            return;
        }
        if let Some(session) = slot.session.as_mut() {
            session.state = PlaybackState::Error;
            session.error = Some(err.clone());
            self.emit(
                PlaybackEvent::new(
                    session.id.to_string(),
                    PlaybackState::Error,
                    Some(session.key.clone()),
                )
                .with_error(err.to_string()),
            );
        }
    }

    fn set_route(&self, generation: u64, route: PlaybackRoute) {
        let mut guard = self.slot.lock();
        let slot = &mut *guard;
        if slot.generation != generation {
            return;
        }
        if let Some(session) = slot.session.as_mut() {
            session.route = Some(route);
        }
    }

    /// The active session if it is in `state` on `route`.
    fn audible_session(
        &self,
        state: PlaybackState,
        route: PlaybackRoute,
    ) -> Option<(PlaybackSessionId, u64)> {
        let slot = self.slot.lock();
        slot.session
            .as_ref()
            .filter(|s| s.state == state && s.route == Some(route))
            .map(|s| (s.id, slot.generation))
    }

    fn transition(&self, generation: u64, from: PlaybackState, to: PlaybackState) {
        let mut guard = self.slot.lock();
        let slot = &mut *guard;
        if slot.generation != generation {
            return;
        }
        if let Some(session) = slot.session.as_mut().filter(|s| s.state == from) {
            session.state = to;
            debug!(session = %session.id, %from, %to, "Playback transition");
            self.emit(PlaybackEvent::new(
                session.id.to_string(),
                to,
                Some(session.key.clone()),
            ));
        }
    }

    fn emit(&self, event: PlaybackEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Playback(event));
        }
    }
}
