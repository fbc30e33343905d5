//! Shared argument groups and their resolution into library configs.

use eyre::{Context, Result};
use speechfeed::collate::BatchLayout;
use speechfeed::config::AudioConfig;
use std::path::PathBuf;

/// Audio flags, optionally replaced by a JSON file.
#[derive(clap::Args, Debug)]
pub struct AudioArgs {
    /// JSON file with audio settings; replaces the audio flags when given
    #[arg(long)]
    pub audio_config: Option<PathBuf>,

    #[command(flatten)]
    pub audio: AudioConfig,
}

impl TryFrom<AudioArgs> for AudioConfig {
    type Error = eyre::Error;

    fn try_from(args: AudioArgs) -> Result<Self> {
        let config = match args.audio_config {
            Some(path) => AudioConfig::from_json_file(&path)
                .wrap_err_with(|| format!("failed to load audio config: {:?}", path.display()))?,
            None => args.audio,
        };

        config.validate().wrap_err("invalid audio config")?;

        Ok(config)
    }
}

/// Optional payloads carried in each batch.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LayoutArg {
    /// Tensors only
    #[default]
    Plain,
    /// Tensors and audio paths
    Paths,
    /// Tensors, audio paths and precomputed logits
    Logits,
}

impl From<LayoutArg> for BatchLayout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Plain => BatchLayout::PLAIN,
            LayoutArg::Paths => BatchLayout::WITH_PATHS,
            LayoutArg::Logits => BatchLayout::WITH_LOGITS,
        }
    }
}
