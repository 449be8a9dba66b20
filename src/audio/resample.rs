//! Sample-rate conversion and channel mixing.
//!
//! The streaming wire format is **16 kHz mono**.  Devices rarely deliver
//! exactly that, so this module provides the two conversion steps:
//!
//! 1. [`stereo_to_mono`] — downmix any number of interleaved channels to mono.
//! 2. [`resample`] — single-pass linear interpolation between any two rates.

use std::borrow::Cow;

use super::codec::CodecError;

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`; a trailing partial frame
/// is dropped.
///
/// * If `channels == 1` the input is borrowed back unchanged.
/// * If `channels == 0` an empty buffer is returned.
///
/// # Example
///
/// ```rust
/// use voice_pcm::audio::stereo_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, -0.2]; // L R L R
/// let mono = stereo_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Cow<'_, [f32]> {
    match channels {
        0 => Cow::Owned(Vec::new()),
        1 => Cow::Borrowed(samples),
        n => {
            let n = n as usize;
            Cow::Owned(
                samples
                    .chunks_exact(n)
                    .map(|frame| frame.iter().sum::<f32>() / n as f32)
                    .collect(),
            )
        }
    }
}

// ---------------------------------------------------------------------------
// resample
// ---------------------------------------------------------------------------

/// Number of samples [`resample`] produces for `input_len` samples going
/// from `from_rate` to `to_rate`: `round(input_len * to_rate / from_rate)`.
pub fn resampled_len(input_len: usize, from_rate: u32, to_rate: u32) -> usize {
    if from_rate == to_rate || from_rate == 0 {
        return input_len;
    }
    let ratio = from_rate as f64 / to_rate as f64;
    (input_len as f64 / ratio).round() as usize
}

/// Resample `samples` from `from_rate` Hz to `to_rate` Hz using linear
/// interpolation.
///
/// * Equal rates return the input borrowed, without copying.
/// * Works uniformly for up- and downsampling.  Output sample `i` reads
///   source position `i * from_rate / to_rate`, interpolating between the
///   floor index and the next index; the latter is clamped to the last
///   input sample at the tail.
///
/// # Errors
///
/// [`CodecError::ZeroSampleRate`] when either rate is zero.
///
/// # Example
///
/// ```rust
/// use voice_pcm::audio::resample;
///
/// let hi = vec![0.5_f32; 480];
/// let lo = resample(&hi, 48_000, 16_000).unwrap();
/// assert_eq!(lo.len(), 160);
/// ```
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Cow<'_, [f32]>, CodecError> {
    if from_rate == 0 || to_rate == 0 {
        return Err(CodecError::ZeroSampleRate { from_rate, to_rate });
    }

    if from_rate == to_rate {
        return Ok(Cow::Borrowed(samples));
    }

    if samples.is_empty() {
        return Ok(Cow::Owned(Vec::new()));
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = resampled_len(samples.len(), from_rate, to_rate);
    let last = samples.len() - 1;

    let output = (0..output_len)
        .map(|i| {
            let src_pos = i as f64 * ratio;
            let floor = (src_pos.floor() as usize).min(last);
            let ceil = (floor + 1).min(last);
            let frac = (src_pos - floor as f64) as f32;

            samples[floor] * (1.0 - frac) + samples[ceil] * frac
        })
        .collect();

    Ok(Cow::Owned(output))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- stereo_to_mono ----------------------------------------------------

    #[test]
    fn stereo_to_mono_already_mono_borrows() {
        let input = vec![0.1_f32, 0.2, 0.3];
        let out = stereo_to_mono(&input, 1);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(&*out, &input[..]);
    }

    #[test]
    fn stereo_to_mono_two_channel() {
        let input = vec![1.0_f32, -1.0, 0.5, 0.5];
        let out = stereo_to_mono(&input, 2);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.0).abs() < 1e-6); // (1.0 + -1.0) / 2
        assert!((out[1] - 0.5).abs() < 1e-6); // (0.5 + 0.5) / 2
    }

    #[test]
    fn stereo_to_mono_drops_partial_frame() {
        let out = stereo_to_mono(&[0.2_f32, 0.4, 0.9], 2);
        assert_eq!(out.len(), 1);
        assert!((out[0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn stereo_to_mono_zero_channels() {
        let out = stereo_to_mono(&[1.0_f32, 2.0], 0);
        assert!(out.is_empty());
    }

    // ---- resample ----------------------------------------------------------

    #[test]
    fn equal_rates_return_input_without_copy() {
        let input: Vec<f32> = (0..160).map(|i| i as f32 / 160.0).collect();
        for rate in [8_000, 16_000, 44_100, 48_000] {
            let out = resample(&input, rate, rate).unwrap();
            assert!(matches!(out, Cow::Borrowed(_)));
            assert_eq!(&*out, &input[..]);
        }
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let out = resample(&[], 48_000, 16_000).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert_eq!(
            resample(&[0.0], 0, 16_000).unwrap_err(),
            CodecError::ZeroSampleRate {
                from_rate: 0,
                to_rate: 16_000
            }
        );
        assert!(resample(&[0.0], 16_000, 0).is_err());
    }

    #[test]
    fn output_length_is_rounded_ratio() {
        let cases = [
            (480, 48_000, 16_000, 160),
            (44_100, 44_100, 16_000, 16_000),
            (80, 8_000, 16_000, 160),
            (1_000, 44_100, 16_000, 363), // 362.81 → 363
            (7, 22_050, 16_000, 5),       // 5.079 → 5
        ];
        for (len, from, to, expected) in cases {
            let input = vec![0.0_f32; len];
            let out = resample(&input, from, to).unwrap();
            assert_eq!(out.len(), expected, "{len} samples {from}→{to}");
            assert_eq!(resampled_len(len, from, to), expected);
        }
    }

    #[test]
    fn constant_signal_preserves_amplitude() {
        let input = vec![0.5_f32; 480];
        let out = resample(&input, 48_000, 16_000).unwrap();
        for &s in out.iter() {
            assert!((s - 0.5).abs() < 1e-6, "amplitude drift: {s}");
        }
    }

    #[test]
    fn downsample_by_three_picks_every_third_sample() {
        let input: Vec<f32> = (0..9).map(|i| i as f32).collect();
        let out = resample(&input, 48_000, 16_000).unwrap();
        assert_eq!(&*out, &[0.0, 3.0, 6.0]);
    }

    #[test]
    fn upsample_interpolates_midpoints() {
        let input = vec![0.0_f32, 1.0, 0.0];
        let out = resample(&input, 8_000, 16_000).unwrap();
        assert_eq!(out.len(), 6);
        assert_eq!(&out[..5], &[0.0, 0.5, 1.0, 0.5, 0.0]);
        // tail index is clamped to the last sample
        assert_eq!(out[5], 0.0);
    }

    #[test]
    fn single_sample_input_is_held() {
        let out = resample(&[0.25_f32], 8_000, 16_000).unwrap();
        assert_eq!(&*out, &[0.25, 0.25]);
    }
}
