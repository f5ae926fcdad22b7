//! # Event Bus System
//!
//! Typed events published by the audio core through `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: `CoreEvent` wraps playback-state, cache and preload events
//! - **EventBus**: cloneable broadcast sender shared by all components
//! - **EventStream**: receiver wrapper with optional filtering
//!
//! The UI layer subscribes to reflect playback state (e.g. show a spinner on
//! `Loading`, a "playback unavailable" hint on `Error`). Components never
//! wait for subscribers; emitting with nobody listening is not an error the
//! core cares about.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent, PlaybackState};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(32);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Playback(PlaybackEvent::new(
//!     "session-1",
//!     PlaybackState::Loading,
//!     Some("https://cdn.example.com/hola.mp3".to_string()),
//! )))
//! .ok();
//!
//! let event = rx.recv().await.unwrap();
//! assert!(matches!(event, CoreEvent::Playback(_)));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: subscriber was too slow and missed `n` events.
//!   Non-fatal; keep receiving.
//! - **`RecvError::Closed`**: all senders dropped, treat as shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 64;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Playback state transitions
    Playback(PlaybackEvent),
    /// Cache occupancy changes
    Cache(CacheEvent),
    /// Preload batch progress
    Preload(PreloadEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Playback(e) => e.state.description(),
            CoreEvent::Cache(e) => e.description(),
            CoreEvent::Preload(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Playback(PlaybackEvent {
                state: PlaybackState::Error,
                ..
            }) => EventSeverity::Error,
            CoreEvent::Cache(CacheEvent::Rejected { .. }) => EventSeverity::Warning,
            CoreEvent::Preload(PreloadEvent::Completed { failed, .. }) if *failed > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Playback(_) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Playback Events
// ============================================================================

/// Observable state of the playback controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Paused,
    Error,
}

impl PlaybackState {
    fn description(&self) -> &str {
        match self {
            PlaybackState::Idle => "Playback idle",
            PlaybackState::Loading => "Loading audio",
            PlaybackState::Playing => "Playing audio",
            PlaybackState::Paused => "Playback paused",
            PlaybackState::Error => "Playback unavailable",
        }
    }

    /// Idle and Error are resting states: nothing is audible or pending.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlaybackState::Idle | PlaybackState::Error)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loading => "loading",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Error => "error",
        };
        f.write_str(name)
    }
}

/// A playback state transition, `{state, resource_id, error?}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaybackEvent {
    /// Session the transition belongs to.
    pub session_id: String,
    /// New state.
    pub state: PlaybackState,
    /// Resource identifier of the session, if any.
    pub resource_id: Option<String>,
    /// Error message when `state` is `Error`.
    pub error: Option<String>,
}

impl PlaybackEvent {
    pub fn new(
        session_id: impl Into<String>,
        state: PlaybackState,
        resource_id: Option<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            state,
            resource_id,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

// ============================================================================
// Cache Events
// ============================================================================

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    /// Removed to make room under the byte ceiling.
    Capacity,
    /// Removed by an explicit `evict` call.
    Explicit,
}

/// Events related to the in-memory resource cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    /// An entry was removed.
    Evicted {
        key: String,
        size_bytes: u64,
        reason: EvictionReason,
    },
    /// A resource larger than the whole ceiling was not cached.
    Rejected {
        key: String,
        size_bytes: u64,
        ceiling_bytes: u64,
    },
    /// The cache was emptied.
    Cleared { items: usize, bytes: u64 },
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::Evicted { .. } => "Cache entry evicted",
            CacheEvent::Rejected { .. } => "Resource too large to cache",
            CacheEvent::Cleared { .. } => "Cache cleared",
        }
    }
}

// ============================================================================
// Preload Events
// ============================================================================

/// Events related to background cache warming.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PreloadEvent {
    /// A preload batch was accepted.
    Started { batch_id: u64, requested: usize },
    /// A preload batch finished; failures are informational only.
    Completed {
        batch_id: u64,
        loaded: usize,
        already_cached: usize,
        failed: usize,
    },
}

impl PreloadEvent {
    fn description(&self) -> &str {
        match self {
            PreloadEvent::Started { .. } => "Preload started",
            PreloadEvent::Completed { .. } => "Preload completed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Clones share the same channel. Slow subscribers get `RecvError::Lagged`
/// instead of blocking publishers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` wrapper with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(16);
/// let playback_only = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Playback(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv`/`try_recv`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without waiting.
    ///
    /// Returns `None` if no matching event is currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playback(state: PlaybackState) -> CoreEvent {
        CoreEvent::Playback(PlaybackEvent::new(
            "s1",
            state,
            Some("https://cdn.example.com/a.mp3".to_string()),
        ))
    }

    #[tokio::test]
    async fn test_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(playback(PlaybackState::Idle)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let event = playback(PlaybackState::Loading);
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Playback(_)));

        bus.emit(CoreEvent::Cache(CacheEvent::Cleared { items: 2, bytes: 10 }))
            .ok();
        let wanted = playback(PlaybackState::Playing);
        bus.emit(wanted.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), wanted);
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();
        for _ in 0..5 {
            bus.emit(playback(PlaybackState::Loading)).ok();
        }
        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        assert_eq!(playback(PlaybackState::Error).severity(), EventSeverity::Error);
        assert_eq!(playback(PlaybackState::Playing).severity(), EventSeverity::Info);

        let rejected = CoreEvent::Cache(CacheEvent::Rejected {
            key: "big".to_string(),
            size_bytes: 2000,
            ceiling_bytes: 1000,
        });
        assert_eq!(rejected.severity(), EventSeverity::Warning);

        let clean = CoreEvent::Preload(PreloadEvent::Completed {
            batch_id: 1,
            loaded: 2,
            already_cached: 0,
            failed: 0,
        });
        assert_eq!(clean.severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_description() {
        assert_eq!(playback(PlaybackState::Error).description(), "Playback unavailable");
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Playback(
            PlaybackEvent::new("s9", PlaybackState::Error, Some("k".to_string()))
                .with_error("Fetch failed"),
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"state\":\"error\""));

        let back: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_state_display_and_terminal() {
        assert_eq!(PlaybackState::Paused.to_string(), "paused");
        assert!(PlaybackState::Error.is_terminal());
        assert!(!PlaybackState::Loading.is_terminal());
    }
}
