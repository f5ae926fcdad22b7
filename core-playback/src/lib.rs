//! # Playback & Cache Module
//!
//! Bounded clip cache, deduplicating loader and the playback state machine
//! for pronunciation audio.
//!
//! ## Overview
//!
//! This module handles:
//! - In-memory LRU cache of decoded clips with a byte ceiling
//! - Deduplicated, retried loading through host fetch/decode bridges
//! - Single-session playback with a speech-synthesis fallback
//! - Background preloading of upcoming clips
//! - Audio decoding using symphonia (optional, feature-gated)

pub mod cache;
pub mod controller;
#[cfg(feature = "decoder")]
pub mod decoder;
pub mod error;
pub mod fallback;
pub mod loader;
pub mod pipeline;
pub mod preload;

pub use cache::{CacheEntry, CacheStats, PutOutcome, ResourceCache};
pub use controller::{
    PlaybackController, PlaybackControllerBuilder, PlaybackRoute, PlaybackSnapshot,
};
#[cfg(feature = "decoder")]
pub use decoder::SymphoniaClipDecoder;
pub use error::{LoadError, PlaybackError, Result};
pub use fallback::{FallbackSynthesizer, Utterance};
pub use loader::{LoadCoordinator, LoadResult, LoadStatus, RetryPolicy};
pub use pipeline::{BoxedFetcher, FetchPipeline, FetcherFactory, LoadFuture};
pub use preload::{PreloadHandle, PreloadReport, PreloadScheduler};
