//! Batches subcommand - run the loader and stream per-batch metadata as JSON lines.

use crate::config::{AudioArgs, LayoutArg};
use eyre::{Context, Result, eyre};
use speechfeed::config::{AudioConfig, LoaderConfig};
use speechfeed::dataset::SpectrogramDataset;
use speechfeed::error::{Error, MetaError};
use speechfeed::loader::AudioDataLoader;
use speechfeed::meta::{DEFAULT_META_CAPACITY, MetaReceiver};
use speechfeed::vocab::LabelVocabulary;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// CLI arguments for batch loading.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Manifest of `audio_path,transcript_path` lines
    pub manifest: PathBuf,

    /// Labels file: JSON array of single characters
    #[arg(short, long)]
    pub labels: PathBuf,

    /// Stop after this many batches
    #[arg(long)]
    pub limit: Option<usize>,

    /// Payloads carried in each batch
    #[arg(long, value_enum, default_value_t = LayoutArg::Plain)]
    pub layout: LayoutArg,

    /// Metadata records buffered before the oldest is dropped
    #[arg(long, default_value_t = DEFAULT_META_CAPACITY)]
    pub meta_capacity: usize,

    #[command(flatten)]
    pub audio_args: AudioArgs,

    #[command(flatten)]
    pub loader_config: LoaderConfig,
}

/// Resolved configuration for batch loading.
#[derive(Debug)]
pub struct Config {
    pub manifest: PathBuf,
    pub labels: PathBuf,
    pub limit: Option<usize>,
    pub layout: LayoutArg,
    pub meta_capacity: usize,
    pub audio: AudioConfig,
    pub loader: LoaderConfig,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        args.loader_config
            .validate()
            .wrap_err("invalid loader config")?;

        Ok(Self {
            manifest: args.manifest,
            labels: args.labels,
            limit: args.limit,
            layout: args.layout,
            meta_capacity: args.meta_capacity,
            audio: args.audio_args.try_into()?,
            loader: args.loader_config,
        })
    }
}

/// Summary of one run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub batches: usize,
    pub samples: usize,
    pub records: usize,
}

pub fn execute(config: Config) -> Result<()> {
    let summary = run(config, &mut std::io::stdout())?;

    tracing::info!(
        batches = summary.batches,
        samples = summary.samples,
        records = summary.records,
        "done"
    );

    Ok(())
}

/// Run the loader, writing metadata records to `out`.
pub fn run(config: Config, out: &mut (impl Write + Send)) -> Result<Summary> {
    let vocab = LabelVocabulary::from_json_file(&config.labels)
        .wrap_err_with(|| format!("failed to load labels: {:?}", config.labels.display()))?;

    let dataset = SpectrogramDataset::from_manifest_file(
        &config.manifest,
        vocab,
        &config.audio,
        config.layout.into(),
    )
    .wrap_err_with(|| format!("failed to load manifest: {:?}", config.manifest.display()))?;

    tracing::info!(
        manifest = ?config.manifest.display(),
        samples = dataset.size(),
        "dataset ready"
    );

    let (mut loader, receiver) = AudioDataLoader::new(Arc::new(dataset), config.loader)?
        .with_metadata(config.meta_capacity);

    let limit = config.limit.unwrap_or(usize::MAX);

    thread::scope(|scope| {
        let consumer = scope.spawn(|| write_records(&receiver, out));

        let mut summary = Summary::default();
        let s = Instant::now();

        for batch in loader.iter().take(limit) {
            let batch = batch.wrap_err("failed to load batch")?;

            tracing::info!(
                batch = summary.batches,
                shape = ?batch.inputs.shape(),
                targets = batch.targets.len(),
                "batch"
            );

            summary.batches += 1;
            summary.samples += batch.len();
        }

        tracing::debug!(elapsed = ?s.elapsed(), "epoch finished");

        // Disconnects the metadata channel so the consumer drains and exits
        drop(loader);

        summary.records = consumer
            .join()
            .map_err(|_| eyre!("metadata consumer panicked"))??;

        Ok(summary)
    })
}

/// Pop records until the producer is gone, one JSON object per line.
fn write_records(receiver: &MetaReceiver, out: &mut impl Write) -> Result<usize> {
    let mut count = 0;

    loop {
        match receiver.pop_meta_buffer() {
            Ok(record) => {
                serde_json::to_writer(&mut *out, &record)?;
                writeln!(out)?;
                count += 1;
            }
            Err(Error::Meta(MetaError::Underflow { .. })) => continue,
            Err(Error::Meta(MetaError::Disconnected)) => return Ok(count),
            Err(e) => return Err(e.into()),
        }
    }
}
