//! Playback bridge traits and supporting audio types.
//!
//! These abstractions let the core hand decoded clips to a platform audio
//! engine without knowing how that engine works. Host applications provide
//! concrete [`AudioOutput`] and [`ClipDecoder`] implementations.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Supported audio codec identifiers.
///
/// Use [`AudioCodec::Other`] for codecs not explicitly listed here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Mp3,
    Aac,
    Vorbis,
    Opus,
    Wav,
    Flac,
    /// Raw PCM produced in memory (tests, synthesized tones).
    Pcm,
    Unknown,
    Other(String),
}

/// Format of the decoded PCM held by a [`DecodedClip`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Codec the clip was decoded from.
    pub codec: AudioCodec,
    /// Sample rate in hertz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
}

impl AudioFormat {
    pub fn new(codec: AudioCodec, sample_rate: u32, channels: u16) -> Self {
        Self {
            codec,
            sample_rate,
            channels,
        }
    }

    /// Mono 22.05 kHz PCM, the usual shape of short pronunciation clips.
    pub fn speech_mono() -> Self {
        Self::new(AudioCodec::Pcm, 22_050, 1)
    }
}

/// A fully decoded clip: interleaved `f32` samples in `[-1.0, 1.0]`.
#[derive(Clone, PartialEq)]
pub struct DecodedClip {
    pub format: AudioFormat,
    pub samples: Vec<f32>,
}

impl DecodedClip {
    pub fn new(format: AudioFormat, samples: Vec<f32>) -> Self {
        Self { format, samples }
    }

    /// Number of frames (one sample per channel).
    pub fn frames(&self) -> usize {
        let channels = self.format.channels.max(1) as usize;
        self.samples.len() / channels
    }

    /// Playback length derived from frame count and sample rate.
    pub fn duration(&self) -> Duration {
        if self.format.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.format.sample_rate as f64)
    }

    /// Estimated memory footprint of the sample buffer.
    pub fn size_bytes(&self) -> u64 {
        (self.samples.len() * std::mem::size_of::<f32>()) as u64
    }
}

impl fmt::Debug for DecodedClip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedClip")
            .field("format", &self.format)
            .field("samples", &self.samples.len())
            .finish()
    }
}

/// Playable audio handle shared between the cache, the loader and callers.
///
/// Cloning is cheap; every clone points at the same decoded clip. Dropping
/// the last clone releases the sample buffer.
#[derive(Clone, Debug)]
pub struct AudioResource {
    clip: Arc<DecodedClip>,
}

impl AudioResource {
    pub fn new(clip: DecodedClip) -> Self {
        Self {
            clip: Arc::new(clip),
        }
    }

    /// Build a resource straight from PCM samples.
    pub fn from_samples(format: AudioFormat, samples: Vec<f32>) -> Self {
        Self::new(DecodedClip::new(format, samples))
    }

    pub fn clip(&self) -> &DecodedClip {
        &self.clip
    }

    pub fn format(&self) -> &AudioFormat {
        &self.clip.format
    }

    pub fn duration(&self) -> Duration {
        self.clip.duration()
    }

    pub fn size_bytes(&self) -> u64 {
        self.clip.size_bytes()
    }

    /// Returns `true` when both handles refer to the same decoded clip.
    pub fn ptr_eq(&self, other: &AudioResource) -> bool {
        Arc::ptr_eq(&self.clip, &other.clip)
    }
}

/// Unique identifier for playback sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaybackSessionId(Uuid);

impl PlaybackSessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PlaybackSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlaybackSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolves when output finishes on its own (end of clip, end of utterance).
///
/// `Err` means the platform reported a failure mid-playback. Implementations
/// may leave the future pending forever after an explicit stop; the core
/// never relies on it resolving in that case.
pub type CompletionFuture = BoxFuture<'static, Result<()>>;

/// Decodes encoded clip bytes into a playable resource.
#[async_trait]
pub trait ClipDecoder: Send + Sync {
    /// Decode the complete payload fetched for `key`.
    ///
    /// Implementations should return
    /// [`BridgeError::InvalidData`](crate::BridgeError::InvalidData) when the
    /// bytes are not usable audio.
    async fn decode(&self, key: &str, data: Bytes) -> Result<AudioResource>;
}

/// Platform audio engine that makes decoded clips audible.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Whether the platform can produce audio at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Begin audible output of `resource` for `session`. The returned future
    /// is the on-complete signal.
    async fn start(
        &self,
        session: PlaybackSessionId,
        resource: AudioResource,
    ) -> Result<CompletionFuture>;

    /// Pause output without releasing the session.
    async fn pause(&self, session: PlaybackSessionId) -> Result<()>;

    /// Resume a paused session.
    async fn resume(&self, session: PlaybackSessionId) -> Result<()>;

    /// Stop output immediately and release the session.
    async fn stop(&self, session: PlaybackSessionId) -> Result<()>;
}
