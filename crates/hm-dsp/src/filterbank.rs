//! Triangular Mel filterbanks over an arbitrary frequency sub-range.
//!
//! `bins + 2` edges evenly spaced on the Mel scale between `fmin` and
//! `fmax`, one triangle per consecutive triple, zero weight outside.
//! A filterbank is a pure function of its [`FilterbankKey`], so
//! [`FilterbankCache`] can hand out shared copies for the whole run.

use std::collections::HashMap;
use std::sync::Arc;

use hm_core::{FilterNorm, HrMelError, HrMelResult, MelScale};
use ndarray::Array2;

use crate::pinv::pseudo_inverse;
use crate::stft::bin_frequency;

/// Everything a filterbank depends on. Frequencies are stored as bits so
/// the key is hashable and exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterbankKey {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// FFT size.
    pub n_fft: usize,
    fmin_bits: u64,
    fmax_bits: u64,
    /// Number of filters.
    pub bins: usize,
    /// Mel scale variant.
    pub scale: MelScale,
    /// Weight normalization.
    pub norm: FilterNorm,
}

impl FilterbankKey {
    /// Key for `bins` filters over `[fmin, fmax]`, with `fmax` clipped to Nyquist.
    #[must_use]
    pub fn new(
        sample_rate: u32,
        n_fft: usize,
        fmin: f64,
        fmax: f64,
        bins: usize,
        scale: MelScale,
        norm: FilterNorm,
    ) -> Self {
        let fmax = fmax.min(f64::from(sample_rate) / 2.0);
        Self {
            sample_rate,
            n_fft,
            fmin_bits: fmin.to_bits(),
            fmax_bits: fmax.to_bits(),
            bins,
            scale,
            norm,
        }
    }

    /// Lower edge in Hz.
    #[must_use]
    pub fn fmin(&self) -> f64 {
        f64::from_bits(self.fmin_bits)
    }

    /// Upper edge in Hz (already clipped).
    #[must_use]
    pub fn fmax(&self) -> f64 {
        f64::from_bits(self.fmax_bits)
    }
}

/// A `(bins × freq_bins)` non-negative weight matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Filterbank {
    key: FilterbankKey,
    weights: Array2<f64>,
}

impl Filterbank {
    /// Build the filterbank described by `key`.
    ///
    /// # Errors
    /// Returns [`HrMelError::Config`] if the range is empty after clipping,
    /// `bins` is zero, or the FFT geometry is invalid.
    pub fn build(key: FilterbankKey) -> HrMelResult<Self> {
        let (fmin, fmax) = (key.fmin(), key.fmax());
        if key.bins == 0 {
            return Err(HrMelError::config("filterbank needs at least one bin"));
        }
        if key.sample_rate == 0 || key.n_fft < 2 {
            return Err(HrMelError::config(format!(
                "invalid FFT geometry: {} Hz, n_fft {}",
                key.sample_rate, key.n_fft
            )));
        }
        if !(fmin.is_finite() && fmax.is_finite()) || fmin < 0.0 || fmax <= fmin {
            return Err(HrMelError::config(format!(
                "empty filterbank range [{fmin}, {fmax}] Hz"
            )));
        }

        let freq_bins = key.n_fft / 2 + 1;
        let mel_low = hz_to_mel(fmin, key.scale);
        let mel_high = hz_to_mel(fmax, key.scale);
        let n_edges = key.bins + 2;
        let edges: Vec<f64> = (0..n_edges)
            .map(|i| {
                let mel = mel_low + (mel_high - mel_low) * i as f64 / (n_edges - 1) as f64;
                mel_to_hz(mel, key.scale)
            })
            .collect();

        let mut weights = Array2::<f64>::zeros((key.bins, freq_bins));
        for (m, mut row) in weights.rows_mut().into_iter().enumerate() {
            let (lower, center, upper) = (edges[m], edges[m + 1], edges[m + 2]);
            let enorm = match key.norm {
                FilterNorm::Slaney => 2.0 / (upper - lower),
                FilterNorm::None => 1.0,
            };
            for (k, w) in row.iter_mut().enumerate() {
                let freq = bin_frequency(k, key.sample_rate, key.n_fft);
                let rising = (freq - lower) / (center - lower);
                let falling = (upper - freq) / (upper - center);
                *w = enorm * rising.min(falling).max(0.0);
            }
        }

        let empty = weights
            .rows()
            .into_iter()
            .filter(|r| r.iter().all(|w| *w == 0.0))
            .count();
        if empty > 0 {
            log::debug!(
                "{empty} of {} filters in [{fmin}, {fmax}] Hz cover no FFT bin",
                key.bins
            );
        }
        log::debug!(
            "Built {}-bin filterbank over [{fmin:.1}, {fmax:.1}] Hz",
            key.bins
        );
        Ok(Self { key, weights })
    }

    /// Build key.
    #[must_use]
    pub fn key(&self) -> &FilterbankKey {
        &self.key
    }

    /// Weight matrix.
    #[must_use]
    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    /// Number of filters.
    #[must_use]
    pub fn bins(&self) -> usize {
        self.weights.nrows()
    }

    /// Number of linear frequency bins expected on input.
    #[must_use]
    pub fn freq_bins(&self) -> usize {
        self.weights.ncols()
    }

    /// Project a `(freq_bins × frames)` power matrix to `(bins × frames)`.
    ///
    /// # Errors
    /// Returns a shape error if the row count does not match.
    pub fn apply(&self, power: &Array2<f64>) -> HrMelResult<Array2<f64>> {
        if power.nrows() != self.freq_bins() {
            return Err(HrMelError::shape(
                "filterbank input rows",
                self.freq_bins(),
                power.nrows(),
            ));
        }
        Ok(self.weights.dot(power))
    }
}

/// Per-run memo of filterbanks and their pseudo-inverses.
///
/// Create one per analysis run and drop it afterwards; nothing is global.
#[derive(Debug, Default)]
pub struct FilterbankCache {
    banks: HashMap<FilterbankKey, Arc<Filterbank>>,
    inverses: HashMap<(FilterbankKey, u64), Arc<Array2<f64>>>,
    hits: usize,
}

impl FilterbankCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared filterbank for `key`, built on first use.
    ///
    /// # Errors
    /// Propagates [`Filterbank::build`] errors; failures are not cached.
    pub fn get_or_build(&mut self, key: FilterbankKey) -> HrMelResult<Arc<Filterbank>> {
        if let Some(fb) = self.banks.get(&key) {
            self.hits += 1;
            return Ok(Arc::clone(fb));
        }
        let fb = Arc::new(Filterbank::build(key)?);
        self.banks.insert(key, Arc::clone(&fb));
        Ok(fb)
    }

    /// Shared `(freq_bins × bins)` pseudo-inverse of `fb` at `rcond`.
    ///
    /// # Errors
    /// Propagates [`crate::pinv::pseudo_inverse`] errors; failures are not cached.
    pub fn pseudo_inverse(
        &mut self,
        fb: &Filterbank,
        rcond: f64,
    ) -> HrMelResult<Arc<Array2<f64>>> {
        let slot = (*fb.key(), rcond.to_bits());
        if let Some(inv) = self.inverses.get(&slot) {
            self.hits += 1;
            return Ok(Arc::clone(inv));
        }
        let inv = Arc::new(pseudo_inverse(fb.weights(), rcond)?);
        self.inverses.insert(slot, Arc::clone(&inv));
        Ok(inv)
    }

    /// Number of cached filterbanks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.banks.len()
    }

    /// True when nothing has been built yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.banks.is_empty()
    }

    /// Lookups answered from the cache.
    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits
    }
}

/// Hz to Mel.
#[inline]
#[must_use]
pub fn hz_to_mel(hz: f64, scale: MelScale) -> f64 {
    match scale {
        MelScale::Htk => 2595.0 * (1.0 + hz / 700.0).log10(),
        MelScale::Slaney => {
            if hz < SLANEY_MIN_LOG_HZ {
                hz / SLANEY_F_SP
            } else {
                SLANEY_MIN_LOG_MEL + (hz / SLANEY_MIN_LOG_HZ).ln() / SLANEY_LOGSTEP
            }
        }
    }
}

/// Mel to Hz.
#[inline]
#[must_use]
pub fn mel_to_hz(mel: f64, scale: MelScale) -> f64 {
    match scale {
        MelScale::Htk => 700.0 * (10.0_f64.powf(mel / 2595.0) - 1.0),
        MelScale::Slaney => {
            if mel < SLANEY_MIN_LOG_MEL {
                mel * SLANEY_F_SP
            } else {
                SLANEY_MIN_LOG_HZ * ((mel - SLANEY_MIN_LOG_MEL) * SLANEY_LOGSTEP).exp()
            }
        }
    }
}

const SLANEY_F_SP: f64 = 200.0 / 3.0;
const SLANEY_MIN_LOG_HZ: f64 = 1000.0;
const SLANEY_MIN_LOG_MEL: f64 = 15.0;
// ln(6.4) / 27
const SLANEY_LOGSTEP: f64 = 0.068_751_777_420_949_12;

#[cfg(test)]
mod tests {
    use super::*;

    fn key(fmin: f64, fmax: f64, bins: usize) -> FilterbankKey {
        FilterbankKey::new(44_100, 2048, fmin, fmax, bins, MelScale::Slaney, FilterNorm::Slaney)
    }

    #[test]
    fn mel_scale_round_trip() {
        for scale in [MelScale::Slaney, MelScale::Htk] {
            for hz in [0.0, 100.0, 999.0, 1000.0, 4000.0, 20_000.0] {
                let back = mel_to_hz(hz_to_mel(hz, scale), scale);
                assert!((back - hz).abs() < 1e-6, "{scale:?} {hz} -> {back}");
            }
        }
        assert!((hz_to_mel(1000.0, MelScale::Slaney) - 15.0).abs() < 1e-12);
    }

    #[test]
    fn shape_and_support() {
        let fb = Filterbank::build(key(1_500.0, 6_000.0, 32)).unwrap();
        assert_eq!(fb.weights().dim(), (32, 1025));
        for (k, col) in fb.weights().columns().into_iter().enumerate() {
            let f = bin_frequency(k, 44_100, 2048);
            if f <= 1_500.0 || f >= 6_000.0 {
                assert!(col.iter().all(|w| *w == 0.0), "weight outside band at {f} Hz");
            }
        }
        assert!(fb.weights().iter().all(|w| *w >= 0.0));
    }

    #[test]
    fn unit_peak_triangles_without_norm() {
        let k = FilterbankKey::new(44_100, 2048, 0.0, 8_000.0, 20, MelScale::Htk, FilterNorm::None);
        let fb = Filterbank::build(k).unwrap();
        for row in fb.weights().rows() {
            let peak = row.iter().copied().fold(0.0, f64::max);
            assert!(peak > 0.5 && peak <= 1.0 + 1e-12);
        }
    }

    #[test]
    fn bit_identical_rebuild() {
        let a = Filterbank::build(key(0.0, 20_000.0, 96)).unwrap();
        let b = Filterbank::build(key(0.0, 20_000.0, 96)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fmax_clipped_to_nyquist() {
        let k = key(0.0, 30_000.0, 24);
        assert_eq!(k.fmax(), 22_050.0);
        assert_eq!(k, key(0.0, 22_050.0, 24));
        assert!(Filterbank::build(k).is_ok());
    }

    #[test]
    fn invalid_ranges_are_config_errors() {
        for k in [key(6_000.0, 1_500.0, 8), key(0.0, 8_000.0, 0), key(25_000.0, 30_000.0, 8)] {
            assert!(Filterbank::build(k).unwrap_err().is_config());
        }
    }

    #[test]
    fn apply_checks_rows() {
        let fb = Filterbank::build(key(0.0, 8_000.0, 16)).unwrap();
        assert!(fb.apply(&Array2::zeros((10, 2))).is_err());
        let out = fb.apply(&Array2::ones((1025, 2))).unwrap();
        assert_eq!(out.dim(), (16, 2));
    }

    #[test]
    fn cache_shares_instances() {
        let mut cache = FilterbankCache::new();
        let a = cache.get_or_build(key(0.0, 1_500.0, 40)).unwrap();
        let b = cache.get_or_build(key(0.0, 1_500.0, 40)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.hits(), 1);

        let p1 = cache.pseudo_inverse(&a, 1e-10).unwrap();
        let p2 = cache.pseudo_inverse(&a, 1e-10).unwrap();
        assert!(Arc::ptr_eq(&p1, &p2));
        assert_eq!(p1.dim(), (1025, 40));
        assert!(cache.pseudo_inverse(&a, -1.0).is_err());
        assert!(cache.get_or_build(key(0.0, 0.0, 4)).is_err());
        assert_eq!(cache.len(), 1);
    }
}
