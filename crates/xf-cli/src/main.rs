//! Crossfade mixdown CLI
//!
//! Usage:
//!   crossfade --first a.wav --second b.flac --mix 0.25 --out mix.mp3
//!   crossfade --first a.wav --second b.wav --mix -1 --out a.mp3 --wav a.wav --bitrate 192

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use xf_offline::{AudioDecoder, MixConfig, MixPipeline};

#[derive(Parser)]
#[command(name = "crossfade", version, about = "Mix two audio files at a crossfade position")]
struct Cli {
    /// First source (heard alone at --mix -1)
    #[arg(long)]
    first: PathBuf,

    /// Second source (heard alone at --mix 1)
    #[arg(long)]
    second: PathBuf,

    /// Crossfade position, -1.0 to 1.0
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    mix: f64,

    /// MP3 output path
    #[arg(short, long)]
    out: PathBuf,

    /// Also write the 16-bit WAV mixdown here
    #[arg(long)]
    wav: Option<PathBuf>,

    /// MP3 bitrate in kbps (overrides --config)
    #[arg(short, long)]
    bitrate: Option<u32>,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = load_config(&cli)?;
    if !(-1.0..=1.0).contains(&cli.mix) {
        log::warn!("Crossfade {} is outside [-1, 1], gains will be extrapolated", cli.mix);
    }

    let first = AudioDecoder::decode(&cli.first)
        .with_context(|| format!("Failed to decode {}", cli.first.display()))?;
    let second = AudioDecoder::decode(&cli.second)
        .with_context(|| format!("Failed to decode {}", cli.second.display()))?;

    let pipeline = MixPipeline::new(config);
    let output = pipeline
        .start(&first, &second, cli.mix)
        .context("Mixdown failed")?;

    write_file(&cli.out, &output.mp3.to_bytes())?;
    if let Some(path) = &cli.wav {
        write_file(path, output.wav.as_bytes())?;
    }

    log::info!(
        "Wrote {} ({:.2}s, peak {:.1} dBFS)",
        cli.out.display(),
        output.spec.duration(),
        output.peak_db
    );
    Ok(())
}

fn load_config(cli: &Cli) -> Result<MixConfig> {
    let mut config = match &cli.config {
        Some(path) => MixConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => MixConfig::default(),
    };
    if let Some(kbps) = cli.bitrate {
        if kbps == 0 {
            bail!("Bitrate must be non-zero");
        }
        config = config.with_bitrate(kbps);
    }
    Ok(config)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}
