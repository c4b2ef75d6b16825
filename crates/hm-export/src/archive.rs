//! Compressed matrix payloads.
//!
//! Matrices are stored row-major as little-endian `f32` and compressed with
//! zstd. The same byte stream backs the `bytes_compressed` column of the
//! analysis report, so sizes and archives agree.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use hm_core::{Compression, StftParams};
use hm_dsp::EncodedRepresentation;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::report::{round2, write_json};

const ZSTD_LEVEL: i32 = 3;

/// Archive payload file name.
pub const ARCHIVE_FILE: &str = "hr_mel.bin.zst";
/// Archive metadata file name.
pub const META_FILE: &str = "hr_mel.json";

/// Row-major little-endian `f32` bytes of `data`.
#[must_use]
pub fn to_f32_le_bytes(data: &Array2<f64>) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(data.len() * 4);
    for &v in data {
        bytes.extend_from_slice(&(v as f32).to_le_bytes());
    }
    bytes
}

fn compress(data: &Array2<f64>) -> Result<Vec<u8>> {
    zstd::encode_all(Cursor::new(to_f32_le_bytes(data)), ZSTD_LEVEL)
        .context("Zstd compression failed")
}

/// Size in bytes of `data` as compressed `f32`.
///
/// # Errors
/// Returns an error if the compressor fails.
pub fn compressed_size_bytes(data: &Array2<f64>) -> Result<usize> {
    Ok(compress(data)?.len())
}

/// One band of an archived HR-Mel encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandMeta {
    /// `[fmin, fmax)` in Hz.
    pub range_hz: [f64; 2],
    pub bins: usize,
    pub compression: Compression,
}

/// Sidecar metadata written next to the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HrMelMeta {
    /// FFT size of the source spectrogram.
    pub n_fft: usize,
    /// Hop between frames, in samples.
    pub hop_length: usize,
    /// Hann window length, in samples.
    pub win_length: usize,
    /// Total rows of the payload, summed over `bands`.
    pub n_mels: usize,
    /// Columns of the payload.
    pub frames: usize,
    /// Band layout, top to bottom of the payload.
    pub bands: Vec<BandMeta>,
    /// Sample rate in Hz.
    pub sr: u32,
    /// Effective upper frequency in Hz.
    pub fmax: f64,
}

impl HrMelMeta {
    /// Describe `encoded`, computed with `params`.
    #[must_use]
    pub fn describe(encoded: &EncodedRepresentation, params: &StftParams) -> Self {
        Self {
            n_fft: params.n_fft,
            hop_length: params.hop_length,
            win_length: params.win_length,
            n_mels: encoded.total_bins(),
            frames: encoded.frames(),
            bands: encoded
                .segments()
                .iter()
                .map(|s| BandMeta {
                    range_hz: [s.fmin, s.fmax],
                    bins: s.bins,
                    compression: s.compression,
                })
                .collect(),
            sr: encoded.sample_rate(),
            fmax: encoded.fmax(),
        }
    }
}

/// `summary.json` written by the extract command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractSummary {
    pub input_sr: u32,
    /// Rounded to two decimals.
    pub duration_sec: f64,
    /// `[bins, frames]`.
    pub hr_mel_encoded: [usize; 2],
    pub bands: Vec<BandMeta>,
    pub n_fft: usize,
    pub hop_length: usize,
    pub win_length: usize,
    pub fmax: f64,
}

impl ExtractSummary {
    /// Summary of an archive described by `meta`, cut from `duration_sec` of audio.
    #[must_use]
    pub fn new(meta: &HrMelMeta, duration_sec: f64) -> Self {
        Self {
            input_sr: meta.sr,
            duration_sec: round2(duration_sec),
            hr_mel_encoded: [meta.n_mels, meta.frames],
            bands: meta.bands.clone(),
            n_fft: meta.n_fft,
            hop_length: meta.hop_length,
            win_length: meta.win_length,
            fmax: meta.fmax,
        }
    }
}

/// Paths written by [`save_hr_mel`].
#[derive(Debug, Clone)]
pub struct ArchivePaths {
    /// Compressed `f32` payload.
    pub payload: PathBuf,
    /// JSON sidecar.
    pub meta: PathBuf,
}

/// Write `encoded` to `out_dir` as [`ARCHIVE_FILE`] plus [`META_FILE`].
///
/// # Errors
/// Returns an error if compression or any file operation fails.
pub fn save_hr_mel(
    encoded: &EncodedRepresentation,
    params: &StftParams,
    out_dir: &Path,
) -> Result<ArchivePaths> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Cannot create {}", out_dir.display()))?;
    let payload = out_dir.join(ARCHIVE_FILE);
    let bytes = compress(encoded.data())?;
    std::fs::write(&payload, &bytes)
        .with_context(|| format!("Cannot write {}", payload.display()))?;
    log::info!(
        "Archived {} ({}×{}) in {} bytes",
        encoded.name(),
        encoded.total_bins(),
        encoded.frames(),
        bytes.len()
    );

    let meta = out_dir.join(META_FILE);
    write_json(&meta, &HrMelMeta::describe(encoded, params))?;
    Ok(ArchivePaths { payload, meta })
}

/// Read back an archive written by [`save_hr_mel`].
///
/// # Errors
/// Returns an error if a file is missing or the payload does not match the
/// metadata shape.
pub fn load_hr_mel(dir: &Path) -> Result<(Array2<f32>, HrMelMeta)> {
    let meta_path = dir.join(META_FILE);
    let meta: HrMelMeta = serde_json::from_str(
        &std::fs::read_to_string(&meta_path)
            .with_context(|| format!("Cannot read {}", meta_path.display()))?,
    )
    .with_context(|| format!("Invalid metadata in {}", meta_path.display()))?;

    let payload_path = dir.join(ARCHIVE_FILE);
    let compressed = std::fs::read(&payload_path)
        .with_context(|| format!("Cannot read {}", payload_path.display()))?;
    let raw = zstd::decode_all(Cursor::new(compressed)).context("Zstd decompression failed")?;

    let expected = meta.n_mels * meta.frames * 4;
    if raw.len() != expected {
        bail!(
            "{} holds {} bytes, metadata implies {expected}",
            payload_path.display(),
            raw.len()
        );
    }
    let values: Vec<f32> = raw
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let data = Array2::from_shape_vec((meta.n_mels, meta.frames), values)
        .context("Payload shape mismatch")?;
    Ok((data, meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hm_core::AnalysisConfig;
    use hm_dsp::{Encoder, FilterbankCache, RepresentationKind, power_spectrogram};
    use hm_source::procedural;

    fn hr_mel(seconds: f64) -> (EncodedRepresentation, StftParams) {
        let cfg = AnalysisConfig::default();
        let wave = procedural::white_noise(0.3, 44_100, seconds, 5);
        let power = power_spectrogram(&wave, &cfg.stft()).unwrap();
        let kind = RepresentationKind::HrMel(cfg.partition().unwrap());
        let encoded = Encoder::from_config(&cfg)
            .encode(&kind, &power, &mut FilterbankCache::new())
            .unwrap();
        (encoded, cfg.stft())
    }

    #[test]
    fn bytes_are_row_major_f32() {
        let m = Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let bytes = to_f32_le_bytes(&m);
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[4..8], &2.0f32.to_le_bytes());
        assert_eq!(&bytes[8..12], &3.0f32.to_le_bytes());
    }

    #[test]
    fn silence_compresses_far_below_raw_size() {
        let zeros = Array2::<f64>::zeros((96, 400));
        let size = compressed_size_bytes(&zeros).unwrap();
        assert!(size > 0);
        assert!(size < 96 * 400 * 4 / 50, "{size}");
    }

    #[test]
    fn archive_restores_layout_and_values() {
        let dir = tempfile::tempdir().unwrap();
        let (encoded, params) = hr_mel(0.5);
        let paths = save_hr_mel(&encoded, &params, dir.path()).unwrap();
        assert!(paths.payload.ends_with(ARCHIVE_FILE));

        let (data, meta) = load_hr_mel(dir.path()).unwrap();
        assert_eq!(meta.n_mels, 96);
        assert_eq!(meta.frames, encoded.frames());
        assert_eq!(meta.sr, 44_100);
        assert_eq!(
            meta.bands.iter().map(|b| b.bins).collect::<Vec<_>>(),
            [40, 32, 24]
        );
        assert_eq!(meta.bands[2].compression, Compression::SqrtLog1p);
        assert_eq!(meta.bands[0].range_hz, [0.0, 1_500.0]);
        assert_eq!(meta.bands[2].range_hz[1], 20_000.0);

        let original = encoded.data();
        let max_diff = data
            .iter()
            .zip(original.iter())
            .map(|(&a, &b)| (f64::from(a) - b).abs() / b.abs().max(1.0))
            .fold(0.0, f64::max);
        assert!(max_diff < 1e-6, "{max_diff}");

        let summary = ExtractSummary::new(&meta, 0.5);
        assert_eq!(summary.hr_mel_encoded, [96, encoded.frames()]);
        assert_eq!(summary.duration_sec, 0.5);
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (encoded, params) = hr_mel(0.25);
        save_hr_mel(&encoded, &params, dir.path()).unwrap();
        let short = zstd::encode_all(Cursor::new(vec![0u8; 8]), ZSTD_LEVEL).unwrap();
        std::fs::write(dir.path().join(ARCHIVE_FILE), short).unwrap();
        assert!(load_hr_mel(dir.path()).is_err());
    }
}
