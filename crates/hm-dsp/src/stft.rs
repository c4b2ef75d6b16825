//! Short-time Fourier analysis into a power spectrogram.
//!
//! Centre-padded framing with a periodic Hann window, one real FFT per
//! frame. Output is `|X|²`, shape `(n_fft/2 + 1) × frames`.

use std::f64::consts::PI;

use hm_core::{HrMelError, HrMelResult, StftParams, Waveform};
use ndarray::Array2;
use realfft::RealFftPlanner;

/// Non-negative `(freq_bins × frames)` power matrix plus the geometry that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerSpectrogram {
    data: Array2<f64>,
    params: StftParams,
}

impl PowerSpectrogram {
    /// Wrap an existing power matrix.
    ///
    /// # Errors
    /// Returns a shape error if the row count is not `n_fft / 2 + 1`, or an
    /// input error if any entry is negative or not finite.
    pub fn from_array(data: Array2<f64>, params: StftParams) -> HrMelResult<Self> {
        params.validate()?;
        if data.nrows() != params.freq_bins() {
            return Err(HrMelError::shape(
                "power spectrogram rows",
                params.freq_bins(),
                data.nrows(),
            ));
        }
        if data.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(HrMelError::input(
                "power spectrogram must be finite and non-negative",
            ));
        }
        Ok(Self { data, params })
    }

    /// Raw matrix.
    #[must_use]
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    /// Geometry used to compute this spectrogram.
    #[must_use]
    pub fn params(&self) -> StftParams {
        self.params
    }

    /// Number of frequency bins.
    #[must_use]
    pub fn bins(&self) -> usize {
        self.data.nrows()
    }

    /// Number of frames.
    #[must_use]
    pub fn frames(&self) -> usize {
        self.data.ncols()
    }

    /// Centre frequency of bin `k` in Hz.
    #[must_use]
    pub fn bin_frequency(&self, k: usize) -> f64 {
        bin_frequency(k, self.params.sample_rate, self.params.n_fft)
    }
}

/// Centre frequency of FFT bin `k`.
#[inline]
#[must_use]
pub fn bin_frequency(k: usize, sample_rate: u32, n_fft: usize) -> f64 {
    k as f64 * f64::from(sample_rate) / n_fft as f64
}

/// Periodic Hann window of `win_length`, centred inside `n_fft` zeros.
#[must_use]
pub fn hann_window(win_length: usize, n_fft: usize) -> Vec<f64> {
    let mut window = vec![0.0; n_fft];
    let offset = n_fft.saturating_sub(win_length) / 2;
    for (i, w) in window.iter_mut().skip(offset).take(win_length).enumerate() {
        *w = 0.5 - 0.5 * (2.0 * PI * i as f64 / win_length as f64).cos();
    }
    window
}

/// Number of frames produced for `len` samples.
#[must_use]
pub fn frame_count(len: usize, params: &StftParams) -> usize {
    let pad = params.n_fft / 2;
    1 + (len + 2 * pad - params.n_fft) / params.hop_length
}

/// Compute the power spectrogram of a mono waveform.
///
/// # Errors
/// Returns a configuration error for invalid geometry, and an input error
/// for an empty waveform, one shorter than the window, or a waveform whose
/// sample rate differs from `params.sample_rate`.
pub fn power_spectrogram(
    waveform: &Waveform,
    params: &StftParams,
) -> HrMelResult<PowerSpectrogram> {
    params.validate()?;
    if waveform.is_empty() {
        return Err(HrMelError::input("waveform is empty"));
    }
    if waveform.len() < params.win_length {
        return Err(HrMelError::input(format!(
            "waveform has {} samples, shorter than one {}-sample window",
            waveform.len(),
            params.win_length
        )));
    }
    if waveform.sample_rate != params.sample_rate {
        return Err(HrMelError::input(format!(
            "waveform is {} Hz, analysis expects {} Hz",
            waveform.sample_rate, params.sample_rate
        )));
    }

    let n_fft = params.n_fft;
    let pad = n_fft / 2;
    let frames = frame_count(waveform.len(), params);
    let window = hann_window(params.win_length, n_fft);

    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let mut input = fft.make_input_vec();
    let mut spectrum = fft.make_output_vec();
    let mut scratch = fft.make_scratch_vec();

    let samples = &waveform.samples;
    let mut data = Array2::<f64>::zeros((params.freq_bins(), frames));

    for t in 0..frames {
        let start = t * params.hop_length;
        for (i, slot) in input.iter_mut().enumerate() {
            // Index into the zero-padded signal.
            let sample = (start + i)
                .checked_sub(pad)
                .and_then(|j| samples.get(j))
                .map_or(0.0, |&s| f64::from(s));
            *slot = sample * window[i];
        }
        fft.process_with_scratch(&mut input, &mut spectrum, &mut scratch)
            .map_err(|e| HrMelError::input(format!("FFT failed on frame {t}: {e}")))?;
        for (k, c) in spectrum.iter().enumerate() {
            data[[k, t]] = c.norm_sqr();
        }
    }

    log::debug!(
        "STFT: {} samples -> {} bins x {frames} frames",
        waveform.len(),
        params.freq_bins()
    );
    Ok(PowerSpectrogram { data, params: *params })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hm_source::procedural;

    fn params() -> StftParams {
        StftParams {
            sample_rate: 44_100,
            n_fft: 2048,
            hop_length: 441,
            win_length: 2048,
        }
    }

    #[test]
    fn one_second_gives_101_frames() {
        let wave = procedural::sine(1_000.0, 1.0, 44_100, 1.0);
        let spec = power_spectrogram(&wave, &params()).unwrap();
        assert_eq!(spec.bins(), 1025);
        assert_eq!(spec.frames(), 101);
        assert!(spec.data().iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let wave = procedural::sine(1_000.0, 1.0, 44_100, 1.0);
        let spec = power_spectrogram(&wave, &params()).unwrap();
        let mid = spec.data().column(50);
        let peak = mid
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| k)
            .unwrap();
        let expected = (1_000.0 / spec.bin_frequency(1)).round() as usize;
        assert!(peak.abs_diff(expected) <= 1, "peak {peak} vs {expected}");
    }

    #[test]
    fn frame_energy_satisfies_parseval() {
        let p = params();
        let wave = procedural::white_noise(0.5, 44_100, 0.5, 21);
        let spec = power_spectrogram(&wave, &p).unwrap();
        let window = hann_window(p.win_length, p.n_fft);

        let t = 20;
        let start = t * p.hop_length - p.n_fft / 2;
        let time_energy: f64 = (0..p.n_fft)
            .map(|i| (f64::from(wave.samples[start + i]) * window[i]).powi(2))
            .sum();

        let col = spec.data().column(t);
        let last = p.n_fft / 2;
        let interior: f64 = col.iter().skip(1).take(last - 1).sum();
        let freq_energy = (col[0] + 2.0 * interior + col[last]) / p.n_fft as f64;
        assert!(
            ((time_energy - freq_energy) / time_energy).abs() < 1e-9,
            "{time_energy} vs {freq_energy}"
        );
    }

    #[test]
    fn hann_window_is_periodic_and_centred() {
        let w = hann_window(8, 8);
        assert_eq!(w[0], 0.0);
        assert!((w[4] - 1.0).abs() < 1e-12);
        let padded = hann_window(4, 8);
        assert_eq!(&padded[..2], &[0.0, 0.0]);
        assert_eq!(&padded[6..], &[0.0, 0.0]);
        assert!((padded[4] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn deterministic() {
        let wave = procedural::white_noise(0.5, 44_100, 0.5, 7);
        let a = power_spectrogram(&wave, &params()).unwrap();
        let b = power_spectrogram(&wave, &params()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_empty_short_and_mismatched_input() {
        let p = params();
        let empty = Waveform::new(vec![], 44_100);
        let short = Waveform::new(vec![0.1; 2047], 44_100);
        let wrong_rate = Waveform::new(vec![0.1; 4096], 22_050);
        for w in [empty, short, wrong_rate] {
            assert!(matches!(
                power_spectrogram(&w, &p),
                Err(HrMelError::Input { .. })
            ));
        }
        let bad = StftParams { hop_length: 0, ..p };
        let ok = Waveform::new(vec![0.1; 4096], 44_100);
        assert!(power_spectrogram(&ok, &bad).unwrap_err().is_config());
    }

    #[test]
    fn from_array_checks_shape_and_sign() {
        let p = params();
        assert!(PowerSpectrogram::from_array(Array2::zeros((10, 3)), p).is_err());
        let mut neg = Array2::zeros((1025, 3));
        neg[[0, 0]] = -1.0;
        assert!(PowerSpectrogram::from_array(neg, p).is_err());
        assert!(PowerSpectrogram::from_array(Array2::ones((1025, 3)), p).is_ok());
    }
}
