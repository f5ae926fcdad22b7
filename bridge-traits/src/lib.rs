//! # Host Bridge Traits
//!
//! Platform abstraction traits that each host must implement for the
//! pronunciation audio core.
//!
//! ## Overview
//!
//! This crate defines the contract between the core playback logic and the
//! platform. Each trait is a capability the core consumes but never implements
//! itself: the network/storage layer, the audio codec, the speaker, and the
//! speech engine.
//!
//! ## Traits
//!
//! ### Resources
//! - [`ResourceFetcher`](fetch::ResourceFetcher) - Raw bytes for a resource identifier
//! - [`ClipDecoder`](playback::ClipDecoder) - Encoded bytes to a playable [`AudioResource`](playback::AudioResource)
//!
//! ### Output
//! - [`AudioOutput`](playback::AudioOutput) - start/pause/resume/stop with an on-complete future
//! - [`SpeechSynthesizer`](speech::SpeechSynthesizer) - speak/cancel for synthesized speech
//!
//! ### Utilities
//! - [`Clock`](clock::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](log::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required capability is
//! missing. Optional capabilities (speech synthesis, audio output) degrade to
//! `UnsupportedCapability` errors at call time instead.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across async tasks behind `Arc`.

pub mod clock;
pub mod error;
pub mod fetch;
pub mod log;
pub mod playback;
pub mod speech;

pub use error::BridgeError;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use fetch::ResourceFetcher;
pub use log::{LogEntry, LogLevel, LoggerSink, MemoryLoggerSink};
pub use playback::{
    AudioCodec, AudioFormat, AudioOutput, AudioResource, ClipDecoder, CompletionFuture,
    DecodedClip, PlaybackSessionId,
};
pub use speech::{SpeechOptions, SpeechRequest, SpeechSynthesizer};
