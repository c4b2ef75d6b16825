//! Representation encoders: linear STFT power, uniform Mel / Log-Mel
//! baselines, and the band-partitioned HR-Mel.
//!
//! Every encoding is a stack of segments. A segment records its rows, its
//! frequency range, its compression and the forward map that produced it,
//! which is everything the analyzer needs to invert it.

use std::sync::Arc;

use hm_core::{
    AnalysisConfig, Band, BandPartition, Compression, FilterNorm, HrMelError, HrMelResult, MelScale,
};
use ndarray::{Array2, ArrayView2, Axis, s};

use crate::filterbank::{Filterbank, FilterbankCache, FilterbankKey};
use crate::stft::PowerSpectrogram;

/// Bin count that keeps the bare `mel` / `log_mel` names.
pub const CANONICAL_MEL_BINS: usize = 80;

/// Forward linear map of one segment.
#[derive(Debug, Clone)]
pub enum LinearMap {
    /// Rows are copied verbatim from the power spectrogram.
    Identity,
    /// Rows are a filterbank projection.
    Filterbank(Arc<Filterbank>),
}

/// A contiguous block of rows inside an encoding.
#[derive(Debug, Clone)]
pub struct Segment {
    /// First row of the block.
    pub offset: usize,
    /// Number of rows.
    pub bins: usize,
    /// Lower edge in Hz.
    pub fmin: f64,
    /// Upper edge in Hz.
    pub fmax: f64,
    /// Compression applied after the linear map.
    pub compression: Compression,
    /// Linear map applied to the power spectrogram.
    pub map: LinearMap,
}

impl Segment {
    /// Row range of this segment.
    #[must_use]
    pub fn rows(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.bins
    }
}

/// Representations known to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum RepresentationKind {
    /// Linear power spectrogram, the lossless reference.
    Stft,
    /// Uniform Mel power.
    Mel {
        /// Number of Mel bins.
        bins: usize,
    },
    /// `log1p` of uniform Mel power.
    LogMel {
        /// Number of Mel bins.
        bins: usize,
    },
    /// Band-partitioned Mel with per-band compression.
    HrMel(BandPartition),
}

impl RepresentationKind {
    /// Report key, e.g. `mel`, `log_mel_96`, `hr_mel`.
    #[must_use]
    pub fn name(&self) -> String {
        let suffix = |bins: usize| {
            if bins == CANONICAL_MEL_BINS {
                String::new()
            } else {
                format!("_{bins}")
            }
        };
        match self {
            Self::Stft => "stft".to_string(),
            Self::Mel { bins } => format!("mel{}", suffix(*bins)),
            Self::LogMel { bins } => format!("log_mel{}", suffix(*bins)),
            Self::HrMel(_) => "hr_mel".to_string(),
        }
    }

    /// Short human description for reports.
    #[must_use]
    pub fn note(&self) -> String {
        match self {
            Self::Stft => "linear power spectrogram (reference)".to_string(),
            Self::Mel { bins } => format!("{bins}-bin mel power"),
            Self::LogMel { bins } => format!("log1p on {bins}-bin mel power"),
            Self::HrMel(partition) => hr_note(partition),
        }
    }

    /// The representations compared by a default analysis run.
    ///
    /// # Errors
    /// Returns a configuration error if the band partition is invalid.
    pub fn standard_set(config: &AnalysisConfig) -> HrMelResult<Vec<Self>> {
        let partition = config.partition()?;
        let mut kinds = vec![Self::Stft];
        for &bins in &config.baseline_bins {
            kinds.push(Self::Mel { bins });
            kinds.push(Self::LogMel { bins });
        }
        kinds.push(Self::HrMel(partition));
        Ok(kinds)
    }
}

/// "40/32/24 bins, log1p/log1p/sqrt_log1p".
fn hr_note(partition: &BandPartition) -> String {
    let bands = partition.bands();
    let bins: Vec<String> = bands.iter().map(|b| b.bins.to_string()).collect();
    let curves: Vec<&str> = bands.iter().map(|b| b.compression.name()).collect();
    format!("{} bins, {}", bins.join("/"), curves.join("/"))
}

/// An encoded `(total_bins × frames)` matrix plus its layout.
#[derive(Debug, Clone)]
pub struct EncodedRepresentation {
    name: String,
    note: String,
    data: Array2<f64>,
    segments: Vec<Segment>,
    sample_rate: u32,
    fmax: f64,
}

impl EncodedRepresentation {
    /// Report key.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human description.
    #[must_use]
    pub fn note(&self) -> &str {
        &self.note
    }

    /// Encoded values.
    #[must_use]
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    /// Rows of one segment.
    #[must_use]
    pub fn segment_data(&self, segment: &Segment) -> ArrayView2<'_, f64> {
        self.data.slice(s![segment.rows(), ..])
    }

    /// Segments in row order.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Total encoded rows.
    #[must_use]
    pub fn total_bins(&self) -> usize {
        self.data.nrows()
    }

    /// Number of frames.
    #[must_use]
    pub fn frames(&self) -> usize {
        self.data.ncols()
    }

    /// Sample rate of the source audio.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Effective upper frequency.
    #[must_use]
    pub fn fmax(&self) -> f64 {
        self.fmax
    }
}

/// Builds encodings from a power spectrogram, sharing filterbanks through
/// an injected [`FilterbankCache`].
#[derive(Debug, Clone, Copy)]
pub struct Encoder {
    scale: MelScale,
    norm: FilterNorm,
    fmax: f64,
}

impl Encoder {
    /// Encoder with explicit filterbank settings; `fmax` must already be clipped.
    #[must_use]
    pub fn new(scale: MelScale, norm: FilterNorm, fmax: f64) -> Self {
        Self { scale, norm, fmax }
    }

    /// Encoder matching an analysis configuration.
    #[must_use]
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.mel_scale, config.norm, config.effective_fmax())
    }

    /// Encode `power` as `kind`.
    ///
    /// # Errors
    /// Returns a configuration error if a filterbank cannot be built, or a
    /// domain error if a compression sees a negative value.
    pub fn encode(
        &self,
        kind: &RepresentationKind,
        power: &PowerSpectrogram,
        cache: &mut FilterbankCache,
    ) -> HrMelResult<EncodedRepresentation> {
        match kind {
            RepresentationKind::Stft => Ok(self.stft(power)),
            RepresentationKind::Mel { bins } => {
                self.mel(kind, power, *bins, Compression::None, cache)
            }
            RepresentationKind::LogMel { bins } => {
                self.mel(kind, power, *bins, Compression::Log1p, cache)
            }
            RepresentationKind::HrMel(partition) => {
                self.banded(kind, power, partition.bands(), cache)
            }
        }
    }

    /// Identity encoding of the full spectrogram.
    #[must_use]
    pub fn stft(&self, power: &PowerSpectrogram) -> EncodedRepresentation {
        let params = power.params();
        let kind = RepresentationKind::Stft;
        EncodedRepresentation {
            name: kind.name(),
            note: kind.note(),
            data: power.data().clone(),
            segments: vec![Segment {
                offset: 0,
                bins: power.bins(),
                fmin: 0.0,
                fmax: params.nyquist(),
                compression: Compression::None,
                map: LinearMap::Identity,
            }],
            sample_rate: params.sample_rate,
            fmax: params.nyquist(),
        }
    }

    fn mel(
        &self,
        kind: &RepresentationKind,
        power: &PowerSpectrogram,
        bins: usize,
        compression: Compression,
        cache: &mut FilterbankCache,
    ) -> HrMelResult<EncodedRepresentation> {
        let band = Band {
            fmin: 0.0,
            fmax: self.fmax,
            bins,
            compression,
        };
        self.banded(kind, power, &[band], cache)
    }

    fn banded(
        &self,
        kind: &RepresentationKind,
        power: &PowerSpectrogram,
        bands: &[Band],
        cache: &mut FilterbankCache,
    ) -> HrMelResult<EncodedRepresentation> {
        let params = power.params();
        let mut blocks = Vec::with_capacity(bands.len());
        let mut segments = Vec::with_capacity(bands.len());
        let mut offset = 0;

        for band in bands {
            let key = FilterbankKey::new(
                params.sample_rate,
                params.n_fft,
                band.fmin,
                band.fmax.min(self.fmax),
                band.bins,
                self.scale,
                self.norm,
            );
            let fb = cache.get_or_build(key)?;
            let mut block = fb.apply(power.data())?;
            band.compression.forward_in_place(block.iter_mut())?;
            segments.push(Segment {
                offset,
                bins: band.bins,
                fmin: key.fmin(),
                fmax: key.fmax(),
                compression: band.compression,
                map: LinearMap::Filterbank(fb),
            });
            offset += band.bins;
            blocks.push(block);
        }

        let views: Vec<ArrayView2<'_, f64>> = blocks.iter().map(Array2::view).collect();
        let data = ndarray::concatenate(Axis(0), &views)
            .map_err(|e| HrMelError::config(format!("cannot stack bands: {e}")))?;

        log::debug!(
            "Encoded {}: {} bins x {} frames",
            kind.name(),
            data.nrows(),
            data.ncols()
        );
        Ok(EncodedRepresentation {
            name: kind.name(),
            note: kind.note(),
            data,
            segments,
            sample_rate: params.sample_rate,
            fmax: self.fmax,
        })
    }
}
