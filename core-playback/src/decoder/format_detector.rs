//! Probe hints and codec mapping for Symphonia.

use bridge_traits::AudioCodec;
use symphonia::core::codecs::CodecType;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

pub(crate) struct FormatDetector;

impl FormatDetector {
    /// Build a probe hint from the extension of a resource key.
    ///
    /// Works for URLs and plain paths; query strings and fragments are
    /// ignored. Without an extension Symphonia auto-detects the container.
    pub fn hint_from_key(key: &str) -> Hint {
        let mut hint = Hint::new();
        match Self::extension_of(key) {
            Some(extension) => {
                debug!(extension, "Setting probe hint extension");
                hint.with_extension(extension);
            }
            None => debug!("No extension in key, probe will auto-detect"),
        }
        hint
    }

    pub fn extension_of(key: &str) -> Option<&str> {
        let path = key.split(['?', '#']).next().unwrap_or(key);
        let name = path.rsplit('/').next().unwrap_or(path);
        let (stem, extension) = name.rsplit_once('.')?;
        if stem.is_empty() || extension.is_empty() {
            return None;
        }
        Some(extension)
    }

    /// Map Symphonia's codec type onto [`AudioCodec`].
    pub fn detect_codec(codec_type: CodecType) -> AudioCodec {
        use symphonia::core::codecs::*;

        if codec_type == CODEC_TYPE_MP3 {
            AudioCodec::Mp3
        } else if codec_type == CODEC_TYPE_AAC {
            AudioCodec::Aac
        } else if codec_type == CODEC_TYPE_FLAC {
            AudioCodec::Flac
        } else if codec_type == CODEC_TYPE_VORBIS {
            AudioCodec::Vorbis
        } else if codec_type == CODEC_TYPE_OPUS {
            AudioCodec::Opus
        } else if codec_type == CODEC_TYPE_PCM_S16LE
            || codec_type == CODEC_TYPE_PCM_S16BE
            || codec_type == CODEC_TYPE_PCM_S24LE
            || codec_type == CODEC_TYPE_PCM_S24BE
            || codec_type == CODEC_TYPE_PCM_S32LE
            || codec_type == CODEC_TYPE_PCM_S32BE
            || codec_type == CODEC_TYPE_PCM_F32LE
            || codec_type == CODEC_TYPE_PCM_F32BE
            || codec_type == CODEC_TYPE_PCM_U8
        {
            AudioCodec::Wav
        } else {
            warn!("Unknown codec type: {:?}", codec_type);
            AudioCodec::Unknown
        }
    }
}
