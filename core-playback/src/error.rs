//! # Playback Error Types
//!
//! Two layers of errors flow through the crate:
//!
//! - [`LoadError`] is the tagged outcome of the fetch/decode stage. It is what
//!   every subscriber of a load request receives, so it is `Clone`.
//! - [`PlaybackError`] is what the controller, the fallback synthesizer and the
//!   service surface to callers.

use bridge_traits::BridgeError;
use thiserror::Error;

/// Failure of a single load request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// Network or storage failure obtaining the raw bytes. Retried.
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Bytes were obtained but are not usable audio. Never retried.
    #[error("Decode failed: {0}")]
    Decode(String),

    /// The request was abandoned before it resolved.
    #[error("Load cancelled")]
    Cancelled,
}

impl LoadError {
    /// Returns `true` if another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoadError::Fetch(_))
    }

    pub fn fetch(err: impl std::fmt::Display) -> Self {
        LoadError::Fetch(err.to_string())
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        LoadError::Decode(err.to_string())
    }
}

/// Errors surfaced by playback operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    // ========================================================================
    // Load Errors (recoverable by the speech fallback)
    // ========================================================================
    /// Raw bytes could not be obtained after all attempts.
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Bytes were obtained but could not be decoded.
    #[error("Decode failed: {0}")]
    Decode(String),

    /// The audio output refused or failed to play the clip.
    #[error("Audio output error: {0}")]
    Output(String),

    // ========================================================================
    // Terminal Errors
    // ========================================================================
    /// The platform lacks speech synthesis or audio output entirely.
    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(String),

    /// A speech-synthesis attempt failed.
    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    // ========================================================================
    // Signals
    // ========================================================================
    /// A resource is larger than the whole cache ceiling. Playback proceeds
    /// uncached; this is only a cache-layer signal.
    #[error("Resource {key} ({size_bytes} bytes) exceeds cache ceiling of {ceiling_bytes} bytes")]
    CacheRejected {
        key: String,
        size_bytes: u64,
        ceiling_bytes: u64,
    },

    /// The session was superseded or stopped before it resolved.
    #[error("Playback cancelled")]
    Cancelled,

    /// Configuration or voice parameters were rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PlaybackError {
    /// Returns `true` if the speech fallback should be attempted.
    pub fn is_recoverable_by_fallback(&self) -> bool {
        matches!(
            self,
            PlaybackError::Fetch(_) | PlaybackError::Decode(_) | PlaybackError::Output(_)
        )
    }
}

impl From<LoadError> for PlaybackError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::Fetch(msg) => PlaybackError::Fetch(msg),
            LoadError::Decode(msg) => PlaybackError::Decode(msg),
            LoadError::Cancelled => PlaybackError::Cancelled,
        }
    }
}

impl From<core_runtime::Error> for PlaybackError {
    fn from(err: core_runtime::Error) -> Self {
        PlaybackError::InvalidConfig(err.to_string())
    }
}

/// Maps a speech bridge failure. `NotAvailable` means the platform has no
/// engine at all.
pub(crate) fn speech_error(err: BridgeError) -> PlaybackError {
    if err.is_not_available() {
        PlaybackError::UnsupportedCapability(err.to_string())
    } else {
        PlaybackError::Synthesis(err.to_string())
    }
}

/// Maps an audio output failure.
pub(crate) fn output_error(err: BridgeError) -> PlaybackError {
    if err.is_not_available() {
        PlaybackError::UnsupportedCapability(err.to_string())
    } else {
        PlaybackError::Output(err.to_string())
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_fetch_is_retryable() {
        assert!(LoadError::Fetch("timeout".into()).is_retryable());
        assert!(!LoadError::Decode("bad header".into()).is_retryable());
        assert!(!LoadError::Cancelled.is_retryable());
    }

    #[test]
    fn test_load_error_conversion() {
        assert_eq!(
            PlaybackError::from(LoadError::Fetch("HTTP 503".into())),
            PlaybackError::Fetch("HTTP 503".into())
        );
        assert_eq!(
            PlaybackError::from(LoadError::Cancelled),
            PlaybackError::Cancelled
        );
    }

    #[test]
    fn test_fallback_classification() {
        assert!(PlaybackError::Decode("x".into()).is_recoverable_by_fallback());
        assert!(PlaybackError::Output("device busy".into()).is_recoverable_by_fallback());
        assert!(!PlaybackError::Synthesis("x".into()).is_recoverable_by_fallback());
        assert!(!PlaybackError::CacheRejected {
            key: "k".into(),
            size_bytes: 64,
            ceiling_bytes: 32,
        }
        .is_recoverable_by_fallback());
    }

    #[test]
    fn test_bridge_mapping() {
        let unavailable = BridgeError::NotAvailable("no tts engine".into());
        assert!(matches!(
            speech_error(unavailable),
            PlaybackError::UnsupportedCapability(_)
        ));
        let failed = BridgeError::OperationFailed("voice missing".into());
        assert!(matches!(speech_error(failed), PlaybackError::Synthesis(_)));
        let busy = BridgeError::OperationFailed("device busy".into());
        assert!(matches!(output_error(busy), PlaybackError::Output(_)));
    }
}
