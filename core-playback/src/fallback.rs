//! Speech-synthesis fallback.
//!
//! When a recorded clip cannot be played, the controller speaks the word
//! through the platform's text-to-speech engine instead. This is the last
//! stage of the chain: a failure here is surfaced as-is.

use crate::error::{speech_error, PlaybackError, Result};
use bridge_traits::{SpeechOptions, SpeechRequest, SpeechSynthesizer};
use core_runtime::config::validate_speech_options;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An utterance the platform has started speaking.
pub struct Utterance {
    completion: BoxFuture<'static, Result<()>>,
}

impl Utterance {
    /// Wait until the platform finishes speaking.
    ///
    /// A failure reported mid-utterance is a [`PlaybackError::Synthesis`].
    pub async fn finished(self) -> Result<()> {
        self.completion.await
    }

    pub(crate) fn into_completion(self) -> BoxFuture<'static, Result<()>> {
        self.completion
    }
}

impl std::fmt::Debug for Utterance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Utterance").finish_non_exhaustive()
    }
}

/// Text-to-speech through an optional [`SpeechSynthesizer`] bridge.
#[derive(Clone)]
pub struct FallbackSynthesizer {
    speech: Option<Arc<dyn SpeechSynthesizer>>,
    defaults: SpeechOptions,
}

impl FallbackSynthesizer {
    pub fn new(speech: Option<Arc<dyn SpeechSynthesizer>>, defaults: SpeechOptions) -> Self {
        Self { speech, defaults }
    }

    /// A synthesizer for hosts without any speech engine.
    pub fn unavailable() -> Self {
        Self::new(None, SpeechOptions::default())
    }

    /// Whether a speech engine is installed and reports itself usable.
    pub fn is_available(&self) -> bool {
        self.speech.as_ref().is_some_and(|s| s.is_available())
    }

    pub fn default_options(&self) -> &SpeechOptions {
        &self.defaults
    }

    /// Start speaking `text`.
    ///
    /// `options` overrides the configured default voice.
    ///
    /// # Errors
    ///
    /// - `UnsupportedCapability` if no speech engine is installed or usable
    /// - `InvalidConfig` if the voice parameters are out of range
    /// - `Synthesis` if `text` is blank or the engine refuses the request
    pub async fn speak(&self, text: &str, options: Option<SpeechOptions>) -> Result<Utterance> {
        let speech = match &self.speech {
            Some(speech) if speech.is_available() => speech,
            _ => {
                warn!("Speech fallback requested but no synthesizer is available");
                return Err(PlaybackError::UnsupportedCapability(
                    "speech synthesis".to_string(),
                ));
            }
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(PlaybackError::Synthesis("nothing to speak".to_string()));
        }

        let options = options.unwrap_or_else(|| self.defaults.clone());
        validate_speech_options(&options)?;

        debug!(chars = text.chars().count(), locale = ?options.locale, "Starting utterance");
        let completion = speech
            .speak(SpeechRequest::new(text, options))
            .await
            .map_err(speech_error)?;
        info!("Speaking fallback text");

        Ok(Utterance {
            completion: completion.map(|r| r.map_err(speech_error)).boxed(),
        })
    }

    /// Stop the current utterance. A no-op without a speech engine.
    pub async fn cancel(&self) -> Result<()> {
        match &self.speech {
            Some(speech) => speech.cancel().await.map_err(speech_error),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for FallbackSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackSynthesizer")
            .field("available", &self.is_available())
            .field("defaults", &self.defaults)
            .finish()
    }
}
