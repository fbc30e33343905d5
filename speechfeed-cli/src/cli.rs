//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use eyre::Result;

#[derive(Debug, Parser)]
#[command(name = "speechfeed")]
#[command(about = "Spectrogram batch loading and inspection tools")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load a manifest in batches and print per-batch metadata as JSON lines
    Batches(crate::batches::Args),

    /// Compute the spectrogram of one WAV file and print its summary
    Features(crate::features::Args),
}

/// Execute CLI command - separated for testing.
pub fn run_cli(cli: Cli) -> Result<()> {
    tracing::debug!(?cli, "parsed arguments");

    match cli.command {
        Commands::Batches(args) => crate::batches::execute(args.try_into()?),
        Commands::Features(args) => crate::features::execute(args.try_into()?),
    }
}
