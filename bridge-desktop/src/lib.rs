//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `ResourceFetcher` using `reqwest` for `http(s)://` identifiers and
//!   `tokio::fs` for `file://` URLs and plain paths
//!
//! Audio output and speech synthesis are deliberately absent: desktop hosts
//! inject their own engines, and the core reports `UnsupportedCapability`
//! when none is installed.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::DesktopResourceFetcher;
//! use std::sync::Arc;
//!
//! let fetcher = Arc::new(DesktopResourceFetcher::new()?);
//! let bytes = fetcher.fetch("https://cdn.example.com/audio/bonjour.mp3").await?;
//! ```

mod fetcher;

pub use fetcher::DesktopResourceFetcher;
