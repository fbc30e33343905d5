//! Features subcommand - compute one file's spectrogram and print a summary.

use crate::config::AudioArgs;
use eyre::{Context, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use speechfeed::config::AudioConfig;
use speechfeed::preprocessor::SpectrogramParser;
use std::path::PathBuf;

/// CLI arguments for feature extraction.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Path to input WAV file
    pub path: PathBuf,

    /// Seed for augmentation draws
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    #[command(flatten)]
    pub audio_args: AudioArgs,
}

/// Resolved configuration for feature extraction.
#[derive(Debug)]
pub struct Config {
    pub path: PathBuf,
    pub seed: u64,
    pub audio: AudioConfig,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        Ok(Self {
            path: args.path,
            seed: args.seed,
            audio: args.audio_args.try_into()?,
        })
    }
}

/// Shape and value statistics of a feature matrix.
#[derive(Debug, PartialEq)]
pub struct FeatureSummary {
    pub freq_bins: usize,
    pub frames: usize,
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

pub fn execute(config: Config) -> Result<()> {
    let summary = summarize(&config)?;

    let line = serde_json::json!({
        "path": config.path,
        "freq_bins": summary.freq_bins,
        "frames": summary.frames,
        "min": summary.min,
        "max": summary.max,
        "mean": summary.mean,
    });
    println!("{line}");

    Ok(())
}

pub fn summarize(config: &Config) -> Result<FeatureSummary> {
    let parser = SpectrogramParser::new(&config.audio).wrap_err("failed to build parser")?;

    tracing::info!(path = ?config.path.display(), "computing features");

    let features = parser
        .parse_audio(&config.path, &mut StdRng::seed_from_u64(config.seed))
        .wrap_err_with(|| format!("failed to process audio: {:?}", config.path.display()))?;

    let (freq_bins, frames) = features.dim();
    let min = features.iter().copied().fold(f32::INFINITY, f32::min);
    let max = features.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mean = features.mean().unwrap_or(0.0);

    Ok(FeatureSummary {
        freq_bins,
        frames,
        min,
        max,
        mean,
    })
}
