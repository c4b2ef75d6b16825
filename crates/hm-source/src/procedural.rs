//! Synthetic test signals.

use std::f64::consts::TAU;

use anyhow::{Context, Result, bail};
use hm_core::Waveform;

fn sample_count(sample_rate: u32, duration_sec: f64) -> usize {
    (f64::from(sample_rate) * duration_sec.max(0.0)).round() as usize
}

/// Pure tone starting at phase 0.
///
/// # Example
/// ```
/// use hm_source::procedural::sine;
/// let w = sine(1_000.0, 1.0, 44_100, 1.0);
/// assert_eq!(w.len(), 44_100);
/// ```
#[must_use]
pub fn sine(freq_hz: f64, amplitude: f32, sample_rate: u32, duration_sec: f64) -> Waveform {
    let n = sample_count(sample_rate, duration_sec);
    let step = TAU * freq_hz / f64::from(sample_rate);
    let samples = (0..n)
        .map(|i| amplitude * (step * i as f64).sin() as f32)
        .collect();
    Waveform::new(samples, sample_rate)
}

/// Uniform white noise in `[-amplitude, amplitude]`, reproducible from `seed`.
#[must_use]
pub fn white_noise(amplitude: f32, sample_rate: u32, duration_sec: f64, seed: u64) -> Waveform {
    let mut rng = fastrand::Rng::with_seed(seed);
    let n = sample_count(sample_rate, duration_sec);
    let samples = (0..n)
        .map(|_| amplitude * (rng.f32() * 2.0 - 1.0))
        .collect();
    Waveform::new(samples, sample_rate)
}

/// Digital silence.
#[must_use]
pub fn silence(sample_rate: u32, duration_sec: f64) -> Waveform {
    Waveform::new(vec![0.0; sample_count(sample_rate, duration_sec)], sample_rate)
}

/// Parse a CLI signal description: `sine:<hz>`, `noise[:<seed>]` or `silence`.
///
/// # Errors
/// Returns an error for unknown kinds or malformed parameters.
///
/// # Example
/// ```
/// use hm_source::procedural::from_spec;
/// let w = from_spec("sine:440", 44_100, 0.5).unwrap();
/// assert_eq!(w.len(), 22_050);
/// ```
pub fn from_spec(spec: &str, sample_rate: u32, duration_sec: f64) -> Result<Waveform> {
    let (kind, arg) = spec
        .split_once(':')
        .map_or((spec, None), |(k, a)| (k, Some(a)));
    match kind.trim().to_ascii_lowercase().as_str() {
        "sine" => {
            let hz: f64 = arg
                .context("sine needs a frequency, e.g. sine:1000")?
                .trim()
                .parse()
                .with_context(|| format!("Invalid sine frequency in '{spec}'"))?;
            Ok(sine(hz, 1.0, sample_rate, duration_sec))
        }
        "noise" => {
            let seed = match arg {
                Some(a) => a
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid noise seed in '{spec}'"))?,
                None => 0,
            };
            Ok(white_noise(0.5, sample_rate, duration_sec, seed))
        }
        "silence" => Ok(silence(sample_rate, duration_sec)),
        other => bail!("Unknown synthetic signal '{other}' (expected sine, noise or silence)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_has_expected_peak_and_length() {
        let w = sine(1_000.0, 0.8, 44_100, 0.5);
        assert_eq!(w.len(), 22_050);
        assert_eq!(w.samples[0], 0.0);
        let peak = w.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - 0.8).abs() < 1e-3);
    }

    #[test]
    fn noise_is_seeded_and_bounded() {
        let a = white_noise(0.5, 8_000, 1.0, 9);
        let b = white_noise(0.5, 8_000, 1.0, 9);
        let c = white_noise(0.5, 8_000, 1.0, 10);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.samples.iter().all(|s| s.abs() <= 0.5));
    }

    #[test]
    fn parses_specs() {
        assert_eq!(from_spec("silence", 8_000, 0.25).unwrap().len(), 2_000);
        assert_eq!(
            from_spec("noise:3", 8_000, 0.1).unwrap(),
            white_noise(0.5, 8_000, 0.1, 3)
        );
        assert_eq!(from_spec("NOISE", 8_000, 0.1).unwrap().len(), 800);
        assert!(from_spec("sine", 8_000, 0.1).is_err());
        assert!(from_spec("sine:abc", 8_000, 0.1).is_err());
        assert!(from_spec("chirp:1", 8_000, 0.1).is_err());
    }
}
