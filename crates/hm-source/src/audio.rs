//! Audio file decoding into a mono waveform.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, bail};
use hm_core::Waveform;
use rubato::{FftFixedInOut, Resampler};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Input chunk handed to the FFT resampler.
const RESAMPLE_CHUNK: usize = 1024;

/// Decode `path`, downmix it to mono and resample it to `target_sr`.
///
/// # Errors
/// Returns an error if the file cannot be opened, decoded or resampled,
/// or has no audio track.
///
/// # Example
/// ```no_run
/// use hm_source::audio::load_mono;
/// use std::path::Path;
/// let wave = load_mono(Path::new("track.flac"), 44_100).unwrap();
/// ```
pub fn load_mono(path: &Path, target_sr: u32) -> Result<Waveform> {
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("Unsupported audio format: {}", path.display()))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .with_context(|| format!("No audio track in {}", path.display()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let native_sr = codec_params
        .sample_rate
        .with_context(|| format!("Unknown sample rate in {}", path.display()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .with_context(|| format!("No decoder for {}", path.display()))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(e).with_context(|| format!("Read error in {}", path.display()));
            }
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(msg)) => {
                log::warn!("Skipping corrupt packet in {}: {msg}", path.display());
                continue;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Decode error in {}", path.display()));
            }
        };
        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        downmix_into(buf.samples(), channels, &mut samples);
    }

    if samples.is_empty() {
        bail!("{} decoded to zero samples", path.display());
    }
    log::info!(
        "Loaded {}: {} samples @ {native_sr} Hz",
        path.display(),
        samples.len()
    );
    if native_sr != target_sr {
        log::info!("Resampling {}: {native_sr} -> {target_sr} Hz", path.display());
        samples = resample(&samples, native_sr, target_sr)
            .with_context(|| format!("Cannot resample {}", path.display()))?;
    }
    Ok(Waveform::new(samples, target_sr))
}

/// Band-limited resampling of a mono signal from `from_rate` to `to_rate`.
///
/// The output holds `round(len · to_rate / from_rate)` samples, aligned
/// with the input: the resampler's group delay is dropped from the front
/// and its tail is flushed with zeros.
///
/// # Errors
/// Returns an error for a zero rate or if the resampler fails.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == 0 || to_rate == 0 {
        bail!("Cannot resample from {from_rate} Hz to {to_rate} Hz");
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler =
        FftFixedInOut::<f32>::new(from_rate as usize, to_rate as usize, RESAMPLE_CHUNK, 1)
            .context("Failed to create resampler")?;
    let delay = resampler.output_delay();
    let expected =
        (samples.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).round() as usize;

    let mut output = Vec::with_capacity(expected + delay + 2 * RESAMPLE_CHUNK);
    let mut pos = 0;
    while output.len() < expected + delay {
        let need = resampler.input_frames_next();
        let mut chunk = vec![0.0f32; need];
        if pos < samples.len() {
            let end = (pos + need).min(samples.len());
            chunk[..end - pos].copy_from_slice(&samples[pos..end]);
        }
        pos += need;
        let result = resampler
            .process(&[chunk], None)
            .context("Resampling failed")?;
        output.extend_from_slice(&result[0]);
    }

    output.drain(..delay);
    output.truncate(expected);
    log::debug!(
        "Resampled {} -> {} samples ({from_rate} -> {to_rate} Hz)",
        samples.len(),
        output.len()
    );
    Ok(output)
}

/// Average interleaved channels into `out`.
pub fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    let scale = 1.0 / channels as f32;
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}
