//! Symphonia implementation of [`ClipDecoder`].

use crate::decoder::format_detector::FormatDetector;
use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::{AudioFormat, AudioResource, ClipDecoder};
use bytes::Bytes;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, error, instrument, warn};

const DEFAULT_MAX_CONSECUTIVE_ERRORS: usize = 10;

/// Decodes a complete clip into interleaved `f32` samples.
///
/// Corrupt packets are skipped; the clip is rejected once
/// `max_consecutive_errors` packets in a row fail, or when nothing at all
/// could be decoded.
#[derive(Debug, Clone)]
pub struct SymphoniaClipDecoder {
    max_consecutive_errors: usize,
}

impl SymphoniaClipDecoder {
    pub fn new() -> Self {
        Self {
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
        }
    }

    pub fn with_max_consecutive_errors(mut self, max: usize) -> Self {
        self.max_consecutive_errors = max.max(1);
        self
    }
}

impl Default for SymphoniaClipDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClipDecoder for SymphoniaClipDecoder {
    #[instrument(skip_all, fields(bytes = data.len()))]
    async fn decode(&self, key: &str, data: Bytes) -> Result<AudioResource> {
        let hint = FormatDetector::hint_from_key(key);
        let max_errors = self.max_consecutive_errors;

        tokio::task::spawn_blocking(move || decode_clip(data, hint, max_errors))
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("decoder task failed: {}", e)))?
    }
}

fn invalid(message: String) -> BridgeError {
    error!("{}", message);
    BridgeError::InvalidData(message)
}

fn decode_clip(data: Bytes, hint: Hint, max_errors: usize) -> Result<AudioResource> {
    let stream = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| invalid(format!("unrecognized container: {}", e)))?;
    let mut reader = probed.format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| invalid("no decodable audio track".to_string()))?;
    let track_id = track.id;
    let codec = FormatDetector::detect_codec(track.codec_params.codec);
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    // AAC often only reports channels after the first packet.
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| invalid(format!("unsupported codec {:?}: {}", codec, e)))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut consecutive_errors = 0;

    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                // Chained streams: keep what the first track produced.
                debug!("Track list changed, stopping at first track");
                break;
            }
            Err(e) => return Err(invalid(format!("failed to read packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                consecutive_errors = 0;
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;

                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(err @ (SymphoniaError::DecodeError(_) | SymphoniaError::IoError(_))) => {
                consecutive_errors += 1;
                warn!(
                    attempt = consecutive_errors,
                    max = max_errors,
                    error = %err,
                    "Skipping corrupt packet"
                );
                if consecutive_errors >= max_errors {
                    return Err(invalid(format!(
                        "stream corrupt after {} failed packets",
                        consecutive_errors
                    )));
                }
            }
            Err(e) => return Err(invalid(format!("failed to decode packet: {}", e))),
        }
    }

    if samples.is_empty() {
        return Err(invalid("clip contains no audio frames".to_string()));
    }

    debug!(
        ?codec,
        sample_rate,
        channels,
        samples = samples.len(),
        "Decoded clip"
    );
    Ok(AudioResource::from_samples(
        AudioFormat::new(codec, sample_rate, channels),
        samples,
    ))
}
