use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use hm_core::{AnalysisConfig, BandPartition, Waveform};
use hm_dsp::{
    EncodedRepresentation, Encoder, FilterbankCache, PowerSpectrogram, ReconstructionAnalyzer,
    RepresentationKind, power_spectrogram,
};
use hm_export::archive::ExtractSummary;
use hm_export::batch::{BatchReport, BatchSettings, FailedTrack};
use hm_export::{AnalysisSummary, HrMelMeta, RepresentationReport, compressed_size_bytes};
use rayon::prelude::*;

/// Everything shared by the representations of one track.
struct Track<'a> {
    config: &'a AnalysisConfig,
    partition: BandPartition,
    power: PowerSpectrogram,
}

impl<'a> Track<'a> {
    fn prepare(wave: &Waveform, config: &'a AnalysisConfig) -> Result<Self> {
        let partition = config.validate().context("Invalid analysis configuration")?;
        if wave.sample_rate != config.sample_rate {
            bail!(
                "Waveform is {} Hz, configuration expects {} Hz",
                wave.sample_rate,
                config.sample_rate
            );
        }
        let power = power_spectrogram(wave, &config.stft()).context("STFT failed")?;
        log::info!(
            "STFT: {} bins × {} frames ({:.2} s)",
            power.bins(),
            power.frames(),
            wave.duration_sec()
        );
        Ok(Self {
            config,
            partition,
            power,
        })
    }

    fn encode(
        &self,
        kind: &RepresentationKind,
        cache: &mut FilterbankCache,
    ) -> Result<EncodedRepresentation> {
        Encoder::from_config(self.config)
            .encode(kind, &self.power, cache)
            .with_context(|| format!("Encoding {} failed", kind.name()))
    }

    fn report(
        &self,
        kind: &RepresentationKind,
        cache: &mut FilterbankCache,
    ) -> Result<RepresentationReport> {
        let encoded = self.encode(kind, cache)?;
        let analysis = ReconstructionAnalyzer::from_config(self.config)
            .analyze(&self.power, &encoded, &self.partition.ranges(), cache)
            .with_context(|| format!("Analyzing {} failed", kind.name()))?;
        let bytes = compressed_size_bytes(encoded.data())?;
        Ok(RepresentationReport::from_analysis(
            &encoded,
            &analysis,
            Some(bytes),
        ))
    }
}

/// Encode `wave` as every representation in `kinds` and measure how well each
/// one reconstructs the power spectrogram.
///
/// Representations are independent: one that fails is reported with status
/// `failed` and the others still complete.
///
/// # Errors
/// Returns an error only for track-level failures (invalid configuration,
/// sample rate mismatch, waveform too short for one window).
pub fn analyze_kinds(
    wave: &Waveform,
    config: &AnalysisConfig,
    kinds: &[RepresentationKind],
    cache: &mut FilterbankCache,
) -> Result<AnalysisSummary> {
    let track = Track::prepare(wave, config)?;
    let mut summary = AnalysisSummary::new(
        wave,
        &config.stft(),
        track.power.frames(),
        config.effective_fmax(),
    );
    for kind in kinds {
        let row = match track.report(kind, cache) {
            Ok(row) => row,
            Err(e) => {
                log::warn!("{}: {e:#}", kind.name());
                RepresentationReport::failed(kind.note(), track.power.frames(), format!("{e:#}"))
            }
        };
        if let Some(err) = row.relative_recon_error {
            log::info!("{:<12} bins={:<5} error={err:.6}", kind.name(), row.bins);
        }
        summary.insert(kind.name(), row);
    }
    log::debug!(
        "Filterbank cache: {} built, {} hits",
        cache.len(),
        cache.hits()
    );
    Ok(summary)
}

/// Analyze `wave` with the standard set: STFT, Mel and Log-Mel at every
/// baseline size, and HR-Mel.
///
/// # Errors
/// See [`analyze_kinds`].
///
/// # Example
/// ```
/// use hm_core::AnalysisConfig;
/// use hm_dsp::FilterbankCache;
/// use hm_app::pipeline::analyze_waveform;
///
/// let wave = hm_source::procedural::sine(1_000.0, 0.5, 44_100, 0.5);
/// let summary =
///     analyze_waveform(&wave, &AnalysisConfig::default(), &mut FilterbankCache::new()).unwrap();
/// assert_eq!(summary.representations["hr_mel"].bins, 96);
/// ```
pub fn analyze_waveform(
    wave: &Waveform,
    config: &AnalysisConfig,
    cache: &mut FilterbankCache,
) -> Result<AnalysisSummary> {
    let kinds = RepresentationKind::standard_set(config).context("Invalid band partition")?;
    analyze_kinds(wave, config, &kinds, cache)
}

/// Encode `wave` as HR-Mel and write the archive plus `summary.json` to `out_dir`.
///
/// # Errors
/// Returns an error if the track cannot be encoded or files cannot be written.
pub fn extract(wave: &Waveform, config: &AnalysisConfig, out_dir: &Path) -> Result<ExtractSummary> {
    let track = Track::prepare(wave, config)?;
    let mut cache = FilterbankCache::new();
    let kind = RepresentationKind::HrMel(track.partition.clone());
    let encoded = track.encode(&kind, &mut cache)?;

    hm_export::save_hr_mel(&encoded, &config.stft(), out_dir)?;
    let summary = ExtractSummary::new(
        &HrMelMeta::describe(&encoded, &config.stft()),
        wave.duration_sec(),
    );
    hm_export::write_json(&out_dir.join("summary.json"), &summary)?;
    Ok(summary)
}

/// Decode and analyze every file in parallel, one filterbank cache per track.
///
/// Files that fail to decode or analyze are listed under `failed`; they do not
/// abort the batch.
#[must_use]
pub fn analyze_batch(files: &[PathBuf], config: &AnalysisConfig) -> BatchReport {
    log::info!("Analyzing {} files", files.len());
    let results: Vec<Result<AnalysisSummary>> = files
        .par_iter()
        .map(|path| {
            let wave = hm_source::audio::load_mono(path, config.sample_rate)?;
            let mut cache = FilterbankCache::new();
            Ok(analyze_waveform(&wave, config, &mut cache)?.with_file(path))
        })
        .collect();

    let mut per_file = Vec::new();
    let mut failed = Vec::new();
    for (path, result) in files.iter().zip(results) {
        match result {
            Ok(summary) => per_file.push(summary),
            Err(e) => {
                log::warn!("Skipping {}: {e:#}", path.display());
                failed.push(FailedTrack {
                    file: path.display().to_string(),
                    error: format!("{e:#}"),
                });
            }
        }
    }

    let stft = config.stft();
    BatchReport::new(
        BatchSettings {
            target_sr: config.sample_rate,
            fmax: config.effective_fmax(),
            n_fft: stft.n_fft,
            hop_length: stft.hop_length,
            win_length: stft.win_length,
        },
        files.iter().map(|p| p.display().to_string()).collect(),
        per_file,
        failed,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use hm_export::Status;
    use hm_source::procedural;

    /// Mono 16-bit PCM WAV.
    fn write_wav(path: &Path, wave: &Waveform) {
        let data_len = (wave.samples.len() * 2) as u32;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&wave.sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(wave.sample_rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for s in &wave.samples {
            let pcm = (s.clamp(-1.0, 1.0) * 32_767.0) as i16;
            bytes.extend_from_slice(&pcm.to_le_bytes());
        }
        std::fs::write(path, bytes).unwrap();
    }

    fn run(wave: &Waveform) -> AnalysisSummary {
        analyze_waveform(wave, &AnalysisConfig::default(), &mut FilterbankCache::new()).unwrap()
    }

    #[test]
    fn standard_set_rows() {
        let summary = run(&procedural::white_noise(0.3, 44_100, 1.0, 42));
        let names: Vec<_> = summary.representations.keys().cloned().collect();
        assert_eq!(
            names,
            ["hr_mel", "log_mel", "log_mel_96", "mel", "mel_96", "stft"]
        );
        assert_eq!(summary.frames, 101);
        assert_eq!(summary.fmax, 20_000.0);
        assert_eq!(summary.duration_sec, 1.0);

        let rows = &summary.representations;
        assert_eq!(rows["stft"].relative_recon_error, Some(0.0));
        assert_eq!(rows["hr_mel"].bins, 96);
        assert_eq!(rows["mel"].bins, 80);
        assert!(rows.values().all(|r| r.status == Status::Ok));
        assert!(rows.values().all(|r| r.bytes_compressed.unwrap_or(0) > 0));
        assert_eq!(rows["hr_mel"].band_errors.len(), 3);
        assert!(
            rows["mel_96"].relative_recon_error.unwrap()
                <= rows["mel"].relative_recon_error.unwrap()
        );
    }

    #[test]
    fn failing_representation_does_not_abort_track() {
        let wave = procedural::sine(440.0, 0.5, 44_100, 0.5);
        let kinds = [RepresentationKind::Stft, RepresentationKind::Mel { bins: 0 }];
        let summary = analyze_kinds(
            &wave,
            &AnalysisConfig::default(),
            &kinds,
            &mut FilterbankCache::new(),
        )
        .unwrap();
        assert_eq!(summary.representations["stft"].status, Status::Ok);
        let failed = &summary.representations["mel_0"];
        assert_eq!(failed.status, Status::Failed);
        assert!(failed.error.as_deref().unwrap().contains("bin"));
    }

    #[test]
    fn silent_track_is_undefined_not_failed() {
        let summary = run(&procedural::silence(44_100, 0.5));
        assert!(
            summary
                .representations
                .values()
                .all(|r| r.status == Status::Undefined && r.relative_recon_error.is_none())
        );
    }

    #[test]
    fn track_level_errors_propagate() {
        let cfg = AnalysisConfig::default();
        let mut cache = FilterbankCache::new();
        let wrong_rate = procedural::sine(440.0, 0.5, 22_050, 0.5);
        assert!(analyze_waveform(&wrong_rate, &cfg, &mut cache).is_err());
        let too_short = procedural::sine(440.0, 0.5, 44_100, 0.01);
        assert!(analyze_waveform(&too_short, &cfg, &mut cache).is_err());
    }

    #[test]
    fn extract_writes_archive_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let wave = procedural::white_noise(0.3, 44_100, 0.5, 1);
        let summary = extract(&wave, &AnalysisConfig::default(), dir.path()).unwrap();
        assert_eq!(summary.hr_mel_encoded[0], 96);
        assert!(dir.path().join("hr_mel.bin.zst").is_file());
        assert!(dir.path().join("summary.json").is_file());
        let (data, meta) = hm_export::load_hr_mel(dir.path()).unwrap();
        assert_eq!(data.dim(), (96, summary.hr_mel_encoded[1]));
        assert_eq!(meta.bands.len(), 3);
    }

    #[test]
    fn batch_keeps_going_past_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("broken.wav");
        std::fs::write(&bad, b"not audio").unwrap();
        let report = analyze_batch(&[bad], &AnalysisConfig::default());
        assert_eq!(report.aggregate.file_count, 0);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.audio_files.len(), 1);
    }

    #[test]
    fn batch_aggregates_decoded_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let noise = dir.path().join("a_noise.wav");
        let tone = dir.path().join("b_tone.wav");
        let low_rate = dir.path().join("c_low_rate.wav");
        let broken = dir.path().join("d_broken.wav");
        write_wav(&noise, &procedural::white_noise(0.3, 44_100, 0.5, 5));
        write_wav(&tone, &procedural::sine(440.0, 0.5, 44_100, 0.5));
        write_wav(&low_rate, &procedural::sine(1_000.0, 0.5, 22_050, 0.5));
        std::fs::write(&broken, b"not audio").unwrap();

        let files = vec![noise, tone, low_rate, broken.clone()];
        let report = analyze_batch(&files, &AnalysisConfig::default());

        assert_eq!(report.audio_files.len(), 4);
        assert_eq!(report.aggregate.file_count, 3);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].file, broken.display().to_string());

        assert!(report.per_file.iter().all(|s| s.input_sr == 44_100));
        let frames = report.aggregate.frames.unwrap();
        assert_eq!(frames.mean, 51.0);
        assert_eq!(frames.std, 0.0);

        let hr = &report.aggregate.representations["hr_mel"];
        assert_eq!(hr.bins, 96);
        assert_eq!(hr.defined, 3);
        let err = hr.relative_recon_error.unwrap();
        assert!(err.mean.is_finite() && err.mean > 0.0);
        assert_eq!(report.aggregate.representations["stft"].defined, 3);
    }
}
