//! Workspace placeholder crate.
//!
//! This crate exposes shared feature flags that map to the individual
//! workspace crates (`core-service`, `core-playback`). Host applications can
//! depend on `pronounce-workspace` and enable the documented features without
//! wiring each crate individually.

#[cfg(any(feature = "desktop-shims", feature = "decoder"))]
pub use core_service::{AudioDependencies, AudioService, CoreError};
