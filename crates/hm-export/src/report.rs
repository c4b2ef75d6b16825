//! Per-track analysis report, serialized as `analysis.json`.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use hm_core::{StftParams, Waveform};
use hm_dsp::{Analysis, EncodedRepresentation, ReconstructionOutcome};
use serde::{Deserialize, Serialize};

/// Outcome class of one representation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Encoded and analyzed, error is finite.
    Ok,
    /// Encoded, but the reference spectrogram is silent.
    Undefined,
    /// Encoding or analysis failed; see `error`.
    Failed,
}

/// Error restricted to one frequency region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandErrorReport {
    /// `[fmin, fmax)` in Hz.
    pub range_hz: [f64; 2],
    /// `None` when the region has no energy.
    pub relative_recon_error: Option<f64>,
}

/// One entry of `representations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepresentationReport {
    /// Rows of the encoding; 0 when it could not be produced.
    pub bins: usize,
    /// STFT frames of the track.
    pub frames: usize,
    /// Global Frobenius ratio; `None` unless `status` is `ok`.
    pub relative_recon_error: Option<f64>,
    /// zstd size of the encoding as little-endian `f32`.
    pub bytes_compressed: Option<usize>,
    /// Human readable layout, e.g. "40/32/24 bins, log1p/log1p/sqrt_log1p".
    pub note: String,
    pub status: Status,
    /// Failure message, present only for `failed` rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Per-region errors, in partition order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub band_errors: Vec<BandErrorReport>,
}

impl RepresentationReport {
    /// Row for a successfully analyzed encoding.
    #[must_use]
    pub fn from_analysis(
        encoded: &EncodedRepresentation,
        analysis: &Analysis,
        bytes_compressed: Option<usize>,
    ) -> Self {
        let status = match analysis.outcome {
            ReconstructionOutcome::Error(_) => Status::Ok,
            ReconstructionOutcome::Undefined => Status::Undefined,
        };
        Self {
            bins: encoded.total_bins(),
            frames: encoded.frames(),
            relative_recon_error: analysis.outcome.value(),
            bytes_compressed,
            note: encoded.note().to_owned(),
            status,
            error: None,
            band_errors: analysis
                .regions
                .iter()
                .map(|r| BandErrorReport {
                    range_hz: [r.fmin, r.fmax],
                    relative_recon_error: r.outcome.value(),
                })
                .collect(),
        }
    }

    /// Row for a representation that could not be produced.
    #[must_use]
    pub fn failed(note: impl Into<String>, frames: usize, error: impl ToString) -> Self {
        Self {
            bins: 0,
            frames,
            relative_recon_error: None,
            bytes_compressed: None,
            note: note.into(),
            status: Status::Failed,
            error: Some(error.to_string()),
            band_errors: Vec::new(),
        }
    }
}

/// Report for one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    /// Sample rate the track was analyzed at, after resampling.
    pub input_sr: u32,
    /// Rounded to two decimals.
    pub duration_sec: f64,
    /// STFT frames.
    pub frames: usize,
    pub n_fft: usize,
    pub hop_length: usize,
    pub win_length: usize,
    /// Effective upper frequency in Hz, already clipped to Nyquist.
    pub fmax: f64,
    /// Rows keyed by representation name (`stft`, `mel`, `hr_mel`, ...).
    pub representations: BTreeMap<String, RepresentationReport>,
    /// Source path in batch runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl AnalysisSummary {
    /// Empty summary for `waveform` analyzed with `params`.
    #[must_use]
    pub fn new(waveform: &Waveform, params: &StftParams, frames: usize, fmax: f64) -> Self {
        Self {
            input_sr: waveform.sample_rate,
            duration_sec: round2(waveform.duration_sec()),
            frames,
            n_fft: params.n_fft,
            hop_length: params.hop_length,
            win_length: params.win_length,
            fmax,
            representations: BTreeMap::new(),
            file: None,
        }
    }

    /// Tag the summary with its source file.
    #[must_use]
    pub fn with_file(mut self, path: &Path) -> Self {
        self.file = Some(path.display().to_string());
        self
    }

    /// Add or replace a row.
    pub fn insert(&mut self, name: impl Into<String>, report: RepresentationReport) {
        self.representations.insert(name.into(), report);
    }

    /// Relative error of `name`, if present and defined.
    #[must_use]
    pub fn relative_error(&self, name: &str) -> Option<f64> {
        self.representations
            .get(name)
            .and_then(|r| r.relative_recon_error)
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Pretty-print `value` as JSON into `path`, creating parent directories.
///
/// # Errors
/// Returns an error if serialization or any file operation fails.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(value).context("JSON serialization failed")?;
    std::fs::write(path, text).with_context(|| format!("Cannot write {}", path.display()))?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hm_core::AnalysisConfig;
    use hm_dsp::{Encoder, FilterbankCache, ReconstructionAnalyzer, power_spectrogram};
    use hm_source::procedural;

    fn summary_for(wave: &Waveform) -> AnalysisSummary {
        let cfg = AnalysisConfig::default();
        let power = power_spectrogram(wave, &cfg.stft()).unwrap();
        let mut cache = FilterbankCache::new();
        let encoded = Encoder::from_config(&cfg).stft(&power);
        let analysis = ReconstructionAnalyzer::from_config(&cfg)
            .analyze(&power, &encoded, &[(0.0, 1_000.0)], &mut cache)
            .unwrap();
        let mut summary = AnalysisSummary::new(wave, &cfg.stft(), power.frames(), 20_000.0);
        summary.insert(
            encoded.name(),
            RepresentationReport::from_analysis(&encoded, &analysis, Some(123)),
        );
        summary
    }

    #[test]
    fn json_uses_report_field_names() {
        let wave = procedural::sine(1_000.0, 0.5, 44_100, 1.234);
        let mut summary = summary_for(&wave);
        summary.insert("broken", RepresentationReport::failed("x", 10, "boom"));
        let json = serde_json::to_value(&summary).unwrap();

        for key in [
            "input_sr",
            "duration_sec",
            "frames",
            "n_fft",
            "hop_length",
            "win_length",
            "fmax",
            "representations",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert!(json.get("file").is_none());
        assert_eq!(json["duration_sec"], 1.23);

        let stft = &json["representations"]["stft"];
        assert_eq!(stft["bins"], 1025);
        assert_eq!(stft["status"], "ok");
        assert_eq!(stft["relative_recon_error"], 0.0);
        assert_eq!(stft["bytes_compressed"], 123);
        assert_eq!(stft["band_errors"][0]["range_hz"][1], 1_000.0);
        assert!(stft.get("error").is_none());

        let broken = &json["representations"]["broken"];
        assert_eq!(broken["status"], "failed");
        assert_eq!(broken["error"], "boom");
        assert!(broken["relative_recon_error"].is_null());
    }

    #[test]
    fn silent_track_reports_undefined() {
        let wave = procedural::silence(44_100, 0.5);
        let summary = summary_for(&wave);
        let row = &summary.representations["stft"];
        assert_eq!(row.status, Status::Undefined);
        assert_eq!(row.relative_recon_error, None);
        assert_eq!(summary.relative_error("stft"), None);
    }

    #[test]
    fn write_json_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/analysis.json");
        let wave = procedural::sine(440.0, 0.5, 44_100, 0.25);
        let summary = summary_for(&wave);
        write_json(&path, &summary).unwrap();
        let back: AnalysisSummary =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.frames, summary.frames);
        assert_eq!(back.representations["stft"].status, Status::Ok);
    }
}
