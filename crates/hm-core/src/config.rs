//! Analysis configuration and band partition.
//!
//! Loaded from TOML with every field optional; missing fields fall back to
//! the 44.1 kHz operating point.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::compression::Compression;
use crate::error::{HrMelError, HrMelResult};

/// Frequencies closer than this are treated as the same band edge.
const EDGE_TOLERANCE_HZ: f64 = 1e-6;

/// Mel frequency scale used to space filter edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MelScale {
    /// Linear below 1 kHz, logarithmic above.
    #[default]
    Slaney,
    /// `2595 × log10(1 + f / 700)`.
    Htk,
}

/// Per-filter weight normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterNorm {
    /// Area normalization: each triangle scaled by `2 / (f_upper - f_lower)`.
    #[default]
    Slaney,
    /// Unit peak triangles.
    None,
}

/// One band of a partition as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandSpec {
    /// Lower edge in Hz.
    pub fmin: f64,
    /// Upper edge in Hz. `None` extends the band to the effective fmax.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fmax: Option<f64>,
    /// Number of Mel bins in this band.
    pub bins: usize,
    /// Compression applied to the band energy.
    #[serde(default)]
    pub compression: Compression,
}

impl BandSpec {
    /// The 40/32/24 partition with sqrt-log on the top band.
    #[must_use]
    pub fn default_partition() -> Vec<Self> {
        vec![
            Self {
                fmin: 0.0,
                fmax: Some(1_500.0),
                bins: 40,
                compression: Compression::Log1p,
            },
            Self {
                fmin: 1_500.0,
                fmax: Some(6_000.0),
                bins: 32,
                compression: Compression::Log1p,
            },
            Self {
                fmin: 6_000.0,
                fmax: None,
                bins: 24,
                compression: Compression::SqrtLog1p,
            },
        ]
    }
}

/// A band with both edges resolved against the effective fmax.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    /// Lower edge in Hz.
    pub fmin: f64,
    /// Upper edge in Hz, never above the effective fmax.
    pub fmax: f64,
    /// Number of Mel bins.
    pub bins: usize,
    /// Compression applied to the band energy.
    pub compression: Compression,
}

/// Validated, contiguous tiling of `[0, fmax]`.
#[derive(Debug, Clone, PartialEq)]
pub struct BandPartition {
    bands: Vec<Band>,
}

impl BandPartition {
    /// Resolve and validate band specs against `fmax` (already clipped to Nyquist).
    ///
    /// # Errors
    /// Returns [`HrMelError::Config`] on gaps, overlaps, empty bands, zero bin
    /// counts, or a partition that does not start at 0 Hz or stop at `fmax`.
    pub fn resolve(specs: &[BandSpec], fmax: f64) -> HrMelResult<Self> {
        if specs.is_empty() {
            return Err(HrMelError::config("band partition is empty"));
        }
        if !(fmax.is_finite() && fmax > 0.0) {
            return Err(HrMelError::config(format!("invalid fmax {fmax} Hz")));
        }

        let mut bands = Vec::with_capacity(specs.len());
        let mut prev_edge = 0.0_f64;
        for (i, spec) in specs.iter().enumerate() {
            if spec.bins == 0 {
                return Err(HrMelError::config(format!("band {i} has zero bins")));
            }
            if !spec.fmin.is_finite() || spec.fmin < 0.0 {
                return Err(HrMelError::config(format!(
                    "band {i} has invalid lower edge {} Hz",
                    spec.fmin
                )));
            }
            let diff = spec.fmin - prev_edge;
            if diff > EDGE_TOLERANCE_HZ {
                return Err(HrMelError::config(format!(
                    "gap between {prev_edge} Hz and {} Hz before band {i}",
                    spec.fmin
                )));
            }
            if diff < -EDGE_TOLERANCE_HZ {
                return Err(HrMelError::config(format!(
                    "band {i} starts at {} Hz, overlapping the previous band ending at {prev_edge} Hz",
                    spec.fmin
                )));
            }
            let upper = spec.fmax.unwrap_or(fmax).min(fmax);
            if upper <= spec.fmin {
                return Err(HrMelError::config(format!(
                    "band {i} is empty: [{}, {upper}] Hz after clipping to {fmax} Hz",
                    spec.fmin
                )));
            }
            bands.push(Band {
                fmin: spec.fmin,
                fmax: upper,
                bins: spec.bins,
                compression: spec.compression,
            });
            prev_edge = upper;
        }

        if fmax - prev_edge > EDGE_TOLERANCE_HZ {
            return Err(HrMelError::config(format!(
                "band partition stops at {prev_edge} Hz, below fmax {fmax} Hz"
            )));
        }
        Ok(Self { bands })
    }

    /// Bands in partition order.
    #[must_use]
    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    /// Sum of per-band bin counts.
    #[must_use]
    pub fn total_bins(&self) -> usize {
        self.bands.iter().map(|b| b.bins).sum()
    }

    /// Frequency ranges of each band, in order.
    #[must_use]
    pub fn ranges(&self) -> Vec<(f64, f64)> {
        self.bands.iter().map(|b| (b.fmin, b.fmax)).collect()
    }
}

/// STFT geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StftParams {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// FFT size.
    pub n_fft: usize,
    /// Hop between frames in samples.
    pub hop_length: usize,
    /// Analysis window length in samples.
    pub win_length: usize,
}

impl StftParams {
    /// Check `0 < hop <= n_fft` and `0 < win <= n_fft`.
    ///
    /// # Errors
    /// Returns [`HrMelError::Config`] describing the first violated constraint.
    pub fn validate(&self) -> HrMelResult<()> {
        if self.sample_rate == 0 {
            return Err(HrMelError::config("sample rate must be positive"));
        }
        if self.n_fft < 2 {
            return Err(HrMelError::config(format!(
                "n_fft must be at least 2, got {}",
                self.n_fft
            )));
        }
        if self.hop_length == 0 || self.hop_length > self.n_fft {
            return Err(HrMelError::config(format!(
                "hop_length {} must be in 1..={}",
                self.hop_length, self.n_fft
            )));
        }
        if self.win_length == 0 || self.win_length > self.n_fft {
            return Err(HrMelError::config(format!(
                "win_length {} must be in 1..={}",
                self.win_length, self.n_fft
            )));
        }
        if self.win_length != self.n_fft {
            log::debug!(
                "win_length {} < n_fft {}: window is zero-padded",
                self.win_length,
                self.n_fft
            );
        }
        Ok(())
    }

    /// Number of frequency bins, `n_fft / 2 + 1`.
    #[must_use]
    pub fn freq_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Nyquist frequency in Hz.
    #[must_use]
    pub fn nyquist(&self) -> f64 {
        f64::from(self.sample_rate) / 2.0
    }
}

/// Complete configuration for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Target sample rate in Hz.
    pub sample_rate: u32,
    /// FFT size.
    pub n_fft: usize,
    /// Hop length in samples.
    pub hop_length: usize,
    /// Window length in samples.
    pub win_length: usize,
    /// Upper frequency for every filterbank, clipped to Nyquist.
    pub fmax: f64,
    /// HR-Mel band partition.
    pub bands: Vec<BandSpec>,
    /// Bin counts of the uniform Mel / Log-Mel baselines.
    pub baseline_bins: Vec<usize>,
    /// Mel scale for every filterbank.
    pub mel_scale: MelScale,
    /// Filter normalization for every filterbank.
    pub norm: FilterNorm,
    /// Relative cutoff for singular values in the pseudo-inverse.
    pub rcond: f64,
    /// Clamp reconstructed power to be non-negative.
    pub clamp_negative: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            n_fft: 2048,
            hop_length: 441,
            win_length: 2048,
            fmax: 20_000.0,
            bands: BandSpec::default_partition(),
            baseline_bins: vec![80, 96],
            mel_scale: MelScale::Slaney,
            norm: FilterNorm::Slaney,
            rcond: 1e-10,
            clamp_negative: true,
        }
    }
}

impl AnalysisConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    /// Returns [`HrMelError::Config`] if the document is malformed.
    pub fn from_toml_str(text: &str) -> HrMelResult<Self> {
        toml::from_str(text).map_err(|e| HrMelError::config(format!("invalid TOML: {e}")))
    }

    /// Load a TOML file.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be read, or a configuration
    /// error if it cannot be parsed.
    pub fn load(path: &Path) -> HrMelResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg = Self::from_toml_str(&text)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(cfg)
    }

    /// STFT geometry of this configuration.
    #[must_use]
    pub fn stft(&self) -> StftParams {
        StftParams {
            sample_rate: self.sample_rate,
            n_fft: self.n_fft,
            hop_length: self.hop_length,
            win_length: self.win_length,
        }
    }

    /// `fmax` clipped to Nyquist.
    #[must_use]
    pub fn effective_fmax(&self) -> f64 {
        self.fmax.min(self.stft().nyquist())
    }

    /// True when the requested `fmax` lies above Nyquist.
    #[must_use]
    pub fn fmax_clipped(&self) -> bool {
        self.fmax > self.stft().nyquist()
    }

    /// Resolved HR-Mel partition.
    ///
    /// # Errors
    /// Returns [`HrMelError::Config`] if the partition is invalid.
    pub fn partition(&self) -> HrMelResult<BandPartition> {
        BandPartition::resolve(&self.bands, self.effective_fmax())
    }

    /// Validate everything that downstream matrices depend on.
    ///
    /// # Errors
    /// Returns the first [`HrMelError::Config`] found.
    pub fn validate(&self) -> HrMelResult<BandPartition> {
        self.stft().validate()?;
        if self.baseline_bins.contains(&0) {
            return Err(HrMelError::config("baseline bin counts must be positive"));
        }
        if !(self.rcond.is_finite() && (0.0..1.0).contains(&self.rcond)) {
            return Err(HrMelError::config(format!(
                "rcond must be in [0, 1), got {}",
                self.rcond
            )));
        }
        self.partition()
    }
}
