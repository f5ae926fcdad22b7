//! # Resource Cache Module
//!
//! Bounded in-memory store of decoded pronunciation clips.
//!
//! ## Overview
//!
//! The cache keeps decoded clips so repeated plays of the same word skip the
//! network and the decoder. Key features:
//! - Byte-size accounting against a configurable ceiling
//! - Strict least-recently-used eviction, synchronous inside `put`
//! - Oversized resources rejected instead of cached
//! - Hit/miss/eviction counters for display
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │     ResourceCache                      │
//! │  - get() / put() / evict() / clear()   │
//! │  - stats()                             │
//! └────────┬───────────────────────────────┘
//!          │
//!          ├──> LruCache<String, CacheEntry> (recency order)
//!          ├──> Clock (insertion timestamps)
//!          └──> EventBus (eviction / rejection events)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use bridge_traits::{AudioFormat, AudioResource};
//! use core_playback::cache::ResourceCache;
//!
//! let cache = ResourceCache::new(1024);
//! let clip = AudioResource::from_samples(AudioFormat::speech_mono(), vec![0.0; 64]);
//!
//! cache.put("https://cdn.example.com/hola.mp3", clip.clone(), clip.size_bytes());
//! assert!(cache.get("https://cdn.example.com/hola.mp3").is_some());
//! assert_eq!(cache.stats().total_bytes, 256);
//! ```

pub mod stats;
mod store;

pub use stats::CacheStats;
pub use store::{CacheEntry, PutOutcome, ResourceCache};
