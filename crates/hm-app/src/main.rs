use anyhow::{Context, Result};
use clap::Parser;
use hm_app::cli::{Cli, Command};
use hm_app::pipeline;
use hm_dsp::FilterbankCache;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    log::info!(
        "hrmel {}: sr={} fmax={} (effective {})",
        env!("CARGO_PKG_VERSION"),
        config.sample_rate,
        config.fmax,
        config.effective_fmax()
    );

    match &cli.command {
        Command::Analyze(args) => {
            let wave = args
                .load(config.sample_rate)
                .with_context(|| format!("Cannot load {}", args.label()))?;
            let mut cache = FilterbankCache::new();
            let summary = pipeline::analyze_waveform(&wave, &config, &mut cache)?;
            hm_export::write_json(&args.output_dir.join("analysis.json"), &summary)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Extract(args) => {
            let wave = args
                .load(config.sample_rate)
                .with_context(|| format!("Cannot load {}", args.label()))?;
            let summary = pipeline::extract(&wave, &config, &args.output_dir)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Batch { inputs, output_dir } => {
            let files = hm_source::folder_batch::expand_inputs(inputs)?;
            if files.is_empty() {
                anyhow::bail!("No audio files found");
            }
            let report = pipeline::analyze_batch(&files, &config);
            hm_export::write_json(&output_dir.join("batch.json"), &report)?;
            println!("{}", serde_json::to_string_pretty(&report.aggregate)?);
        }
    }
    Ok(())
}
