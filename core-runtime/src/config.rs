//! # Audio Configuration
//!
//! Tunable limits for the pronunciation audio core.
//!
//! ## Overview
//!
//! [`AudioConfig`] carries the options the cache, loader and preload
//! scheduler recognize:
//!
//! - `ceiling_bytes` - memory limit of the resource cache
//! - `max_retry_attempts` - total fetch attempts per load (first try included)
//! - `retry_backoff_ms` - fixed delay between attempts
//! - `preload_concurrency` - parallel loads a preload batch may run
//! - `event_buffer_size` - per-subscriber buffer of the event bus
//! - `speech` - default voice for the synthesized fallback
//!
//! Every field has a default, so hosts may ship a partial JSON document:
//!
//! ```
//! use core_runtime::config::AudioConfig;
//!
//! let config = AudioConfig::from_json_str(r#"{ "ceiling_bytes": 1048576 }"#).unwrap();
//! assert_eq!(config.ceiling_bytes, 1_048_576);
//! assert_eq!(config.max_retry_attempts, 3);
//! ```
//!
//! ## Error Handling
//!
//! `validate()` rejects values the subsystem cannot honor and returns an
//! actionable [`Error::Config`] message:
//!
//! ```
//! use core_runtime::config::AudioConfig;
//!
//! let err = AudioConfig::default().with_ceiling_bytes(0).validate().unwrap_err();
//! assert!(err.to_string().contains("ceiling"));
//! ```

use crate::error::{Error, Result};
use bridge_traits::speech::SpeechOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default cache ceiling: 16 MiB of decoded PCM.
pub const DEFAULT_CEILING_BYTES: u64 = 16 * 1024 * 1024;
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;
pub const DEFAULT_PRELOAD_CONCURRENCY: usize = 2;

const MAX_RETRY_ATTEMPTS_LIMIT: u32 = 10;
const MAX_RETRY_BACKOFF_MS: u64 = 60_000;

/// Configuration of the audio cache and playback subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Upper bound on the summed `size_bytes` of cached resources.
    #[serde(default = "default_ceiling_bytes")]
    pub ceiling_bytes: u64,

    /// Total fetch attempts per load request, first attempt included.
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// Fixed delay between failed attempts, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Maximum loads a single preload batch runs at once.
    #[serde(default = "default_preload_concurrency")]
    pub preload_concurrency: usize,

    /// Buffered events per subscriber before it starts lagging.
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,

    /// Voice used when no options are passed to the fallback synthesizer.
    #[serde(default)]
    pub speech: SpeechOptions,
}

fn default_ceiling_bytes() -> u64 {
    DEFAULT_CEILING_BYTES
}

fn default_max_retry_attempts() -> u32 {
    DEFAULT_MAX_RETRY_ATTEMPTS
}

fn default_retry_backoff_ms() -> u64 {
    DEFAULT_RETRY_BACKOFF_MS
}

fn default_preload_concurrency() -> usize {
    DEFAULT_PRELOAD_CONCURRENCY
}

fn default_event_buffer_size() -> usize {
    crate::events::DEFAULT_EVENT_BUFFER_SIZE
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            ceiling_bytes: default_ceiling_bytes(),
            max_retry_attempts: default_max_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            preload_concurrency: default_preload_concurrency(),
            event_buffer_size: default_event_buffer_size(),
            speech: SpeechOptions::default(),
        }
    }
}

impl AudioConfig {
    /// Parse a JSON document; missing fields take their defaults.
    ///
    /// The result is validated before it is returned.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: AudioConfig = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid audio configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_ceiling_bytes(mut self, ceiling_bytes: u64) -> Self {
        self.ceiling_bytes = ceiling_bytes;
        self
    }

    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    pub fn with_retry_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.retry_backoff_ms = backoff_ms;
        self
    }

    pub fn with_preload_concurrency(mut self, concurrency: usize) -> Self {
        self.preload_concurrency = concurrency;
        self
    }

    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }

    pub fn with_speech(mut self, speech: SpeechOptions) -> Self {
        self.speech = speech;
        self
    }

    /// Retry backoff as a `Duration`.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Validates the configuration.
    ///
    /// This checks:
    /// - The cache ceiling is non-zero
    /// - At least one fetch attempt is allowed, at most 10
    /// - The backoff stays under one minute
    /// - Preload concurrency and event buffer are non-zero
    /// - The default voice is within platform ranges
    pub fn validate(&self) -> Result<()> {
        if self.ceiling_bytes == 0 {
            return Err(Error::Config(
                "Cache ceiling must be greater than 0 bytes".to_string(),
            ));
        }

        if self.max_retry_attempts == 0 {
            return Err(Error::Config(
                "max_retry_attempts must allow at least one attempt".to_string(),
            ));
        }

        if self.max_retry_attempts > MAX_RETRY_ATTEMPTS_LIMIT {
            return Err(Error::Config(format!(
                "max_retry_attempts exceeds maximum of {}",
                MAX_RETRY_ATTEMPTS_LIMIT
            )));
        }

        if self.retry_backoff_ms > MAX_RETRY_BACKOFF_MS {
            return Err(Error::Config(
                "Retry backoff exceeds maximum of 60 seconds (60,000ms)".to_string(),
            ));
        }

        if self.preload_concurrency == 0 {
            return Err(Error::Config(
                "preload_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "event_buffer_size must be greater than 0".to_string(),
            ));
        }

        validate_speech_options(&self.speech)
    }
}

/// Checks a voice against the ranges every supported platform accepts.
///
/// - rate: `0.1..=10.0`
/// - pitch: `0.0..=2.0`
/// - volume: `0.0..=1.0`
/// - locale: non-empty BCP-47 style tag (`"en"`, `"es-MX"`)
pub fn validate_speech_options(options: &SpeechOptions) -> Result<()> {
    if !(0.1..=10.0).contains(&options.rate) {
        return Err(Error::Config(format!(
            "Speech rate {} outside 0.1..=10.0",
            options.rate
        )));
    }

    if !(0.0..=2.0).contains(&options.pitch) {
        return Err(Error::Config(format!(
            "Speech pitch {} outside 0.0..=2.0",
            options.pitch
        )));
    }

    if !(0.0..=1.0).contains(&options.volume) {
        return Err(Error::Config(format!(
            "Speech volume {} outside 0.0..=1.0",
            options.volume
        )));
    }

    if let Some(locale) = &options.locale {
        let well_formed = !locale.is_empty()
            && locale
                .split('-')
                .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric()));
        if !well_formed {
            return Err(Error::Config(format!("Invalid speech locale '{}'", locale)));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AudioConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ceiling_bytes, DEFAULT_CEILING_BYTES);
        assert_eq!(config.retry_backoff(), Duration::from_millis(500));
    }

    #[test]
    fn test_builder() {
        let config = AudioConfig::default()
            .with_ceiling_bytes(1000)
            .with_max_retry_attempts(5)
            .with_retry_backoff_ms(10)
            .with_preload_concurrency(4)
            .with_event_buffer_size(8)
            .with_speech(SpeechOptions::default().with_locale("es-ES"));

        assert!(config.validate().is_ok());
        assert_eq!(config.max_retry_attempts, 5);
        assert_eq!(config.preload_concurrency, 4);
        assert_eq!(config.speech.locale.as_deref(), Some("es-ES"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = AudioConfig::default();
        assert!(base.clone().with_ceiling_bytes(0).validate().is_err());
        assert!(base.clone().with_max_retry_attempts(0).validate().is_err());
        assert!(base.clone().with_max_retry_attempts(11).validate().is_err());
        assert!(base.clone().with_retry_backoff_ms(60_001).validate().is_err());
        assert!(base.clone().with_preload_concurrency(0).validate().is_err());
        assert!(base.clone().with_event_buffer_size(0).validate().is_err());
        assert!(base
            .with_speech(SpeechOptions::default().with_volume(1.5))
            .validate()
            .is_err());
    }

    #[test]
    fn test_speech_option_ranges() {
        assert!(validate_speech_options(&SpeechOptions::default()).is_ok());
        assert!(validate_speech_options(&SpeechOptions::default().with_rate(0.05)).is_err());
        assert!(validate_speech_options(&SpeechOptions::default().with_pitch(2.5)).is_err());
        assert!(validate_speech_options(&SpeechOptions::default().with_locale("")).is_err());
        assert!(validate_speech_options(&SpeechOptions::default().with_locale("en_US")).is_err());
        assert!(validate_speech_options(&SpeechOptions::default().with_locale("zh-Hant-TW")).is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let json = r#"{
            "max_retry_attempts": 2,
            "retry_backoff_ms": 250,
            "speech": { "rate": 0.8, "locale": "fr-FR" }
        }"#;
        let config = AudioConfig::from_json_str(json).unwrap();
        assert_eq!(config.max_retry_attempts, 2);
        assert_eq!(config.retry_backoff_ms, 250);
        assert_eq!(config.ceiling_bytes, DEFAULT_CEILING_BYTES);
        assert_eq!(config.speech.rate, 0.8);
        assert_eq!(config.speech.pitch, 1.0);
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(AudioConfig::from_json_str("not json").is_err());
        assert!(AudioConfig::from_json_str(r#"{ "preload_concurrency": 0 }"#).is_err());
    }
}
