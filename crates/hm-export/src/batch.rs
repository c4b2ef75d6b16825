//! Multi-track aggregation, serialized as `batch.json`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::report::AnalysisSummary;

/// Population mean and standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeanStd {
    pub mean: f64,
    /// Population (not sample) deviation.
    pub std: f64,
}

/// `None` for an empty sample.
#[must_use]
pub fn mean_std(values: &[f64]) -> Option<MeanStd> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(MeanStd {
        mean,
        std: var.sqrt(),
    })
}

/// Aggregate of one representation across tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepresentationAggregate {
    /// Bins as reported by the first track.
    pub bins: usize,
    pub note: String,
    /// Tracks with a defined error.
    pub defined: usize,
    /// Over the `defined` tracks only.
    pub relative_recon_error: Option<MeanStd>,
    pub bytes_compressed: Option<MeanStd>,
}

/// Settings shared by every track of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Rate every track is resampled to.
    pub target_sr: u32,
    /// Effective upper frequency in Hz.
    pub fmax: f64,
    pub n_fft: usize,
    pub hop_length: usize,
    pub win_length: usize,
}

/// A track that could not be analyzed at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedTrack {
    pub file: String,
    /// Full error chain.
    pub error: String,
}

/// Cross-track statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    /// Tracks that were analyzed, failed tracks excluded.
    pub file_count: usize,
    pub duration_sec: Option<MeanStd>,
    pub frames: Option<MeanStd>,
    pub representations: BTreeMap<String, RepresentationAggregate>,
}

impl Aggregate {
    /// Fold per-track summaries. Representations are keyed by name; rows
    /// that failed on a track are left out of that representation's stats.
    #[must_use]
    pub fn from_summaries(per_file: &[AnalysisSummary]) -> Self {
        let durations: Vec<f64> = per_file.iter().map(|s| s.duration_sec).collect();
        let frames: Vec<f64> = per_file.iter().map(|s| s.frames as f64).collect();

        let mut errors: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        let mut sizes: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        let mut representations = BTreeMap::new();
        for summary in per_file {
            for (name, row) in &summary.representations {
                representations
                    .entry(name.clone())
                    .or_insert_with(|| RepresentationAggregate {
                        bins: row.bins,
                        note: row.note.clone(),
                        defined: 0,
                        relative_recon_error: None,
                        bytes_compressed: None,
                    });
                let errs = errors.entry(name.as_str()).or_default();
                if let Some(e) = row.relative_recon_error {
                    errs.push(e);
                }
                let sz = sizes.entry(name.as_str()).or_default();
                if let Some(b) = row.bytes_compressed {
                    sz.push(b as f64);
                }
            }
        }
        for (name, agg) in &mut representations {
            let errs = errors.get(name.as_str()).map_or(&[][..], Vec::as_slice);
            agg.defined = errs.len();
            agg.relative_recon_error = mean_std(errs);
            agg.bytes_compressed = sizes.get(name.as_str()).and_then(|v| mean_std(v));
        }

        Self {
            file_count: per_file.len(),
            duration_sec: mean_std(&durations),
            frames: mean_std(&frames),
            representations,
        }
    }
}

/// Full `batch.json` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub settings: BatchSettings,
    /// Every input, including failed ones, in input order.
    pub audio_files: Vec<String>,
    /// Summaries of the analyzed tracks, in input order.
    pub per_file: Vec<AnalysisSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<FailedTrack>,
    pub aggregate: Aggregate,
}

impl BatchReport {
    /// Assemble the report and compute the aggregate.
    #[must_use]
    pub fn new(
        settings: BatchSettings,
        audio_files: Vec<String>,
        per_file: Vec<AnalysisSummary>,
        failed: Vec<FailedTrack>,
    ) -> Self {
        let aggregate = Aggregate::from_summaries(&per_file);
        Self {
            settings,
            audio_files,
            per_file,
            failed,
            aggregate,
        }
    }
}
