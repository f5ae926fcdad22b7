//! Speech synthesis bridge.
//!
//! Hosts expose their text-to-speech engine (AVSpeechSynthesizer, Android
//! TextToSpeech, Web Speech API, ...) through [`SpeechSynthesizer`]. The core
//! uses it only as a fallback when a recorded clip cannot be played.

use crate::error::Result;
use crate::playback::CompletionFuture;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Voice parameters for a single utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechOptions {
    /// Speaking rate multiplier (1.0 = platform default).
    #[serde(default = "default_rate")]
    pub rate: f32,
    /// Pitch multiplier (1.0 = platform default).
    #[serde(default = "default_pitch")]
    pub pitch: f32,
    /// Volume in `0.0..=1.0`.
    #[serde(default = "default_volume")]
    pub volume: f32,
    /// BCP-47 locale such as `"en-US"`; `None` lets the platform choose.
    #[serde(default)]
    pub locale: Option<String>,
}

fn default_rate() -> f32 {
    1.0
}

fn default_pitch() -> f32 {
    1.0
}

fn default_volume() -> f32 {
    1.0
}

impl Default for SpeechOptions {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            pitch: default_pitch(),
            volume: default_volume(),
            locale: None,
        }
    }
}

impl SpeechOptions {
    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }
}

/// A single utterance handed to the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub options: SpeechOptions,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>, options: SpeechOptions) -> Self {
        Self {
            text: text.into(),
            options,
        }
    }
}

/// Platform text-to-speech engine.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Whether the platform has a usable speech engine.
    fn is_available(&self) -> bool {
        true
    }

    /// Start speaking. Resolves once the utterance is audible; the returned
    /// future resolves when it ends (`Err` for a mid-utterance failure).
    async fn speak(&self, request: SpeechRequest) -> Result<CompletionFuture>;

    /// Stop the current utterance, if any.
    async fn cancel(&self) -> Result<()>;
}
