use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hm_core::{AnalysisConfig, Waveform};

/// High-resolution band-partitioned Mel features and their
/// reconstruction error against standard Mel baselines.
#[derive(Parser, Debug)]
#[command(name = "hrmel", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file (bands, STFT geometry, rcond...).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Target sample rate in Hz (overrides the config file).
    #[arg(long, global = true)]
    pub sr: Option<u32>,

    /// Upper frequency in Hz, clipped to Nyquist (overrides the config file).
    #[arg(long, global = true)]
    pub fmax: Option<f64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compare STFT, Mel, Log-Mel and HR-Mel on one track.
    Analyze(SourceArgs),
    /// Encode one track as HR-Mel and archive it.
    Extract(SourceArgs),
    /// Analyze every audio file in the given folders or files, in parallel.
    Batch {
        /// Audio files or folders.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Output directory for batch.json.
        #[arg(long, short = 'o', default_value = "outputs")]
        output_dir: PathBuf,
    },
}

/// Where a single-track command reads its audio.
#[derive(Args, Debug)]
pub struct SourceArgs {
    /// Audio file to decode.
    #[arg(long, short = 'i', required_unless_present = "synth", conflicts_with = "synth")]
    pub input: Option<PathBuf>,

    /// Synthetic signal instead of a file: sine:<hz>, noise[:<seed>] or silence.
    #[arg(long)]
    pub synth: Option<String>,

    /// Length of the synthetic signal in seconds.
    #[arg(long, default_value_t = 5.0)]
    pub duration: f64,

    /// Output directory.
    #[arg(long, short = 'o', default_value = "outputs")]
    pub output_dir: PathBuf,
}

impl SourceArgs {
    /// Decode the input file or synthesize the requested signal.
    ///
    /// # Errors
    /// Returns an error if decoding or signal parsing fails.
    pub fn load(&self, sample_rate: u32) -> Result<Waveform> {
        if let Some(path) = &self.input {
            return hm_source::audio::load_mono(path, sample_rate);
        }
        match &self.synth {
            Some(spec) => hm_source::procedural::from_spec(spec, sample_rate, self.duration),
            None => anyhow::bail!("No input given (use --input or --synth)"),
        }
    }

    /// Label for logs and reports.
    #[must_use]
    pub fn label(&self) -> String {
        if let Some(path) = &self.input {
            return path.display().to_string();
        }
        self.synth
            .as_ref()
            .map_or_else(|| String::from("<none>"), |spec| format!("synth:{spec}"))
    }
}

impl Cli {
    /// Configuration file (or defaults) with CLI overrides applied and
    /// validated. An `fmax` above Nyquist is reported here, once.
    ///
    /// # Errors
    /// Returns an error if the configuration file cannot be loaded or the
    /// resulting configuration is invalid.
    pub fn resolve_config(&self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::load(path)
                .with_context(|| format!("Cannot load config {}", path.display()))?,
            None => AnalysisConfig::default(),
        };
        if let Some(sr) = self.sr {
            config.sample_rate = sr;
        }
        if let Some(fmax) = self.fmax {
            config.fmax = fmax;
        }
        config
            .validate()
            .context("Invalid analysis configuration")?;
        if config.fmax_clipped() {
            log::warn!(
                "fmax {} Hz is above Nyquist, clipped to {} Hz",
                config.fmax,
                config.effective_fmax()
            );
        }
        Ok(config)
    }
}
