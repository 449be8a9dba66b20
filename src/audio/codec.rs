//! PCM codec — turns captured `f32` chunks into the streaming wire format.
//!
//! The wire format is **16 kHz, mono, signed 16-bit little-endian PCM**.
//! Every function here is pure: no shared state, safe to call concurrently
//! on independent inputs.
//!
//! # Pipeline
//!
//! ```text
//! [AudioChunk] → merge_chunks → resample (if rate ≠ 16 kHz)
//!              → quantize_to_i16 → serialize_le → Vec<u8>
//! ```
//!
//! # Example
//!
//! ```rust
//! use voice_pcm::audio::{codec, AudioChunk};
//!
//! let chunks = vec![AudioChunk::from(vec![0.5_f32; 4_800])];
//! let bytes = codec::encode_pcm16(&chunks, 48_000, codec::TARGET_SAMPLE_RATE).unwrap();
//! assert_eq!(bytes.len(), 2 * 1_600);
//! ```

use thiserror::Error;

use super::chunk::AudioChunk;
use super::resample::resample;

/// Sample rate of the streaming wire format in Hz.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Bytes per encoded sample (`i16`).
pub const BYTES_PER_SAMPLE: usize = 2;

/// Scale applied to a clamped `[-1.0, 1.0]` sample before rounding.
const I16_SCALE: f32 = 32_768.0;

// ---------------------------------------------------------------------------
// CodecError
// ---------------------------------------------------------------------------

/// Invalid input to one of the codec stages.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    #[error("cannot resample from {from_rate} Hz to {to_rate} Hz: sample rate must be non-zero")]
    ZeroSampleRate { from_rate: u32, to_rate: u32 },

    #[error("PCM byte buffer has odd length {0}; expected whole 16-bit samples")]
    OddByteLength(usize),
}

// ---------------------------------------------------------------------------
// Encoding stages
// ---------------------------------------------------------------------------

/// Concatenate chunk samples in arrival order.
///
/// The output length is the sum of the chunk lengths.
pub fn merge_chunks(chunks: &[AudioChunk]) -> Vec<f32> {
    let total: usize = chunks.iter().map(AudioChunk::len).sum();
    let mut merged = Vec::with_capacity(total);
    for chunk in chunks {
        merged.extend_from_slice(chunk.samples());
    }
    merged
}

/// Quantize `f32` samples to `i16`.
///
/// Each sample is clamped to `[-1.0, 1.0]`, scaled by 32768 and rounded to
/// the nearest integer.  The positive end saturates: `1.0` becomes
/// `i16::MAX` (32767) rather than overflowing, `-1.0` becomes `i16::MIN`.
/// `NaN` quantizes to 0.
///
/// ```rust
/// use voice_pcm::audio::codec::quantize_to_i16;
///
/// assert_eq!(quantize_to_i16(&[0.0, 0.5, 1.0, -1.0]), vec![0, 16_384, 32_767, -32_768]);
/// ```
pub fn quantize_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let scaled = (s.clamp(-1.0, 1.0) * I16_SCALE).round();
            scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
        })
        .collect()
}

/// Serialize samples as little-endian byte pairs, low byte first.
///
/// The byte order is fixed regardless of host endianness.
///
/// ```rust
/// use voice_pcm::audio::codec::serialize_le;
///
/// assert_eq!(serialize_le(&[256, -1]), vec![0x00, 0x01, 0xFF, 0xFF]);
/// ```
pub fn serialize_le(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Run the full encode pipeline over one recording's chunks.
///
/// Resampling only happens when `actual_rate != target_rate`; merging,
/// quantization and serialization always run.
///
/// # Errors
///
/// [`CodecError::ZeroSampleRate`] when a rate is zero and resampling is
/// required.
pub fn encode_pcm16(
    chunks: &[AudioChunk],
    actual_rate: u32,
    target_rate: u32,
) -> Result<Vec<u8>, CodecError> {
    let merged = merge_chunks(chunks);
    let resampled = resample(&merged, actual_rate, target_rate)?;
    let pcm = quantize_to_i16(&resampled);

    log::debug!(
        "codec: {} chunks, {} samples @ {actual_rate} Hz → {} samples @ {target_rate} Hz",
        chunks.len(),
        merged.len(),
        pcm.len()
    );

    Ok(serialize_le(&pcm))
}

// ---------------------------------------------------------------------------
// Decoding helpers
// ---------------------------------------------------------------------------

/// Parse little-endian 16-bit samples back out of a PCM byte buffer.
///
/// # Errors
///
/// [`CodecError::OddByteLength`] when `bytes` does not hold whole samples.
pub fn deserialize_le(bytes: &[u8]) -> Result<Vec<i16>, CodecError> {
    if bytes.len() % BYTES_PER_SAMPLE != 0 {
        return Err(CodecError::OddByteLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Map `i16` samples back to `f32` in `[-1.0, 1.0)`.
pub fn dequantize_i16(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / I16_SCALE).collect()
}

/// Duration in seconds of a 16 kHz mono PCM byte buffer.
pub fn pcm_duration_secs(bytes: &[u8], sample_rate: u32) -> f32 {
    if sample_rate == 0 {
        return 0.0;
    }
    (bytes.len() / BYTES_PER_SAMPLE) as f32 / sample_rate as f32
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
