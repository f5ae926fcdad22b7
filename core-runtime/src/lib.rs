//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the pronunciation audio core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the playback crates depend on.
//! It establishes the logging conventions, the tunable limits of the cache
//! and loader, and the broadcast channel through which playback state
//! reaches the UI.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
