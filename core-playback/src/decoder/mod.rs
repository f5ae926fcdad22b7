//! # Clip Decoder
//!
//! [`ClipDecoder`](bridge_traits::ClipDecoder) backed by Symphonia.
//!
//! Pronunciation clips are short, so a clip is decoded in one pass into
//! interleaved `f32` PCM instead of being streamed:
//!
//! ```text
//! Bytes → MediaSourceStream → FormatReader → Decoder → SampleBuffer<f32> → AudioResource
//! ```
//!
//! Decoding runs on the blocking pool so the async runtime keeps serving
//! other loads meanwhile.
//!
//! Only compiled with the `decoder` feature.

mod format_detector;
mod symphonia;

pub use self::symphonia::SymphoniaClipDecoder;
