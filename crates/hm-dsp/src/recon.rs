//! Reconstruction-error analysis.
//!
//! Decode each segment (undo compression, apply the pseudo-inverse of its
//! filterbank), sum the segments back into a linear power estimate, and
//! compare it to the original with one global Frobenius ratio.

use hm_core::{AnalysisConfig, HrMelError, HrMelResult};
use ndarray::{Array2, ArrayView2, Axis};

use crate::encoder::{EncodedRepresentation, LinearMap};
use crate::filterbank::FilterbankCache;
use crate::stft::PowerSpectrogram;

/// Relative error of one reconstruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconstructionOutcome {
    /// `‖x − x̂‖_F / ‖x‖_F`.
    Error(f64),
    /// The reference has zero energy, so the ratio has no meaning.
    Undefined,
}

impl ReconstructionOutcome {
    /// The ratio, if defined.
    #[must_use]
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Error(e) => Some(e),
            Self::Undefined => None,
        }
    }
}

/// Error restricted to the STFT rows in `[fmin, fmax)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionError {
    /// Lower edge in Hz.
    pub fmin: f64,
    /// Upper edge in Hz.
    pub fmax: f64,
    /// Error over that region.
    pub outcome: ReconstructionOutcome,
}

/// Full analysis of one representation.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Global relative error.
    pub outcome: ReconstructionOutcome,
    /// Per-region errors, in the order requested.
    pub regions: Vec<RegionError>,
}

/// Inverts encodings and measures what was lost.
#[derive(Debug, Clone, Copy)]
pub struct ReconstructionAnalyzer {
    rcond: f64,
    clamp_negative: bool,
}

impl Default for ReconstructionAnalyzer {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}

impl ReconstructionAnalyzer {
    /// Analyzer with an explicit singular value cutoff.
    #[must_use]
    pub fn new(rcond: f64, clamp_negative: bool) -> Self {
        Self {
            rcond,
            clamp_negative,
        }
    }

    /// Analyzer matching a configuration.
    #[must_use]
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.rcond, config.clamp_negative)
    }

    /// Estimate the `(freq_bins × frames)` power spectrogram behind `encoded`.
    ///
    /// # Errors
    /// Returns a shape error if the encoding does not match `freq_bins`.
    pub fn reconstruct(
        &self,
        encoded: &EncodedRepresentation,
        freq_bins: usize,
        cache: &mut FilterbankCache,
    ) -> HrMelResult<Array2<f64>> {
        let covered: usize = encoded.segments().iter().map(|s| s.bins).sum();
        if covered != encoded.total_bins() {
            return Err(HrMelError::shape(
                "encoded rows",
                covered,
                encoded.total_bins(),
            ));
        }

        let mut recon = Array2::<f64>::zeros((freq_bins, encoded.frames()));
        for segment in encoded.segments() {
            let mut linear = encoded.segment_data(segment).to_owned();
            segment.compression.inverse_in_place(linear.iter_mut());
            match &segment.map {
                LinearMap::Identity => {
                    if linear.nrows() != freq_bins {
                        return Err(HrMelError::shape(
                            "identity segment rows",
                            freq_bins,
                            linear.nrows(),
                        ));
                    }
                    recon += &linear;
                }
                LinearMap::Filterbank(fb) => {
                    if fb.freq_bins() != freq_bins {
                        return Err(HrMelError::shape(
                            "filterbank columns",
                            freq_bins,
                            fb.freq_bins(),
                        ));
                    }
                    let pinv = cache.pseudo_inverse(fb, self.rcond)?;
                    recon += &pinv.dot(&linear);
                }
            }
        }

        if self.clamp_negative {
            recon.mapv_inplace(|v| v.max(0.0));
        }
        Ok(recon)
    }

    /// Global relative error of `encoded` against `power`.
    ///
    /// # Errors
    /// Returns a shape error if frames or bins disagree.
    pub fn relative_error(
        &self,
        power: &PowerSpectrogram,
        encoded: &EncodedRepresentation,
        cache: &mut FilterbankCache,
    ) -> HrMelResult<ReconstructionOutcome> {
        Ok(self.analyze(power, encoded, &[], cache)?.outcome)
    }

    /// Global error plus one error per `(fmin, fmax)` region.
    ///
    /// # Errors
    /// Returns a shape error if frames or bins disagree.
    pub fn analyze(
        &self,
        power: &PowerSpectrogram,
        encoded: &EncodedRepresentation,
        regions: &[(f64, f64)],
        cache: &mut FilterbankCache,
    ) -> HrMelResult<Analysis> {
        if encoded.frames() != power.frames() {
            return Err(HrMelError::shape(
                "encoded frames",
                power.frames(),
                encoded.frames(),
            ));
        }
        let recon = self.reconstruct(encoded, power.bins(), cache)?;
        let outcome = relative_error(power.data().view(), recon.view());

        let regions = regions
            .iter()
            .map(|&(fmin, fmax)| {
                let rows: Vec<usize> = (0..power.bins())
                    .filter(|&k| {
                        let f = power.bin_frequency(k);
                        f >= fmin && f < fmax
                    })
                    .collect();
                let target = power.data().select(Axis(0), &rows);
                let approx = recon.select(Axis(0), &rows);
                RegionError {
                    fmin,
                    fmax,
                    outcome: relative_error(target.view(), approx.view()),
                }
            })
            .collect();

        if let ReconstructionOutcome::Error(e) = outcome {
            log::debug!("{}: relative error {e:.6}", encoded.name());
        } else {
            log::warn!("{}: reference has zero energy, error undefined", encoded.name());
        }
        Ok(Analysis { outcome, regions })
    }
}

/// `‖target − approx‖_F / ‖target‖_F`, or `Undefined` when `target` is silent.
#[must_use]
pub fn relative_error(
    target: ArrayView2<'_, f64>,
    approx: ArrayView2<'_, f64>,
) -> ReconstructionOutcome {
    let denom = frobenius(target.iter().copied());
    if denom == 0.0 || !denom.is_finite() {
        return ReconstructionOutcome::Undefined;
    }
    let num = frobenius(target.iter().zip(approx.iter()).map(|(t, a)| t - a));
    ReconstructionOutcome::Error(num / denom)
}

/// Frobenius norm with scaling against overflow on loud input.
fn frobenius(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let scale = values.clone().fold(0.0_f64, |m, v| m.max(v.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return scale;
    }
    let sum: f64 = values.map(|v| (v / scale).powi(2)).sum();
    scale * sum.sqrt()
}
