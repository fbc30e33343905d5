//! speechfeed: audio-to-spectrogram data pipeline for speech model training.
//!
//! Turns a manifest of `(audio, transcript)` pairs into padded batches of
//! log-magnitude spectrograms and flattened character labels, ready for a
//! CTC-style acoustic model.
//!
//! # Architecture
//!
//! - [`dataset::SpectrogramDataset`]: loads one sample (waveform, optional
//!   tempo/gain and noise augmentation, spectrogram, label ids)
//! - [`collate::collate`]: pads samples into a [`collate::Batch`]
//! - [`meta::MetaPipeline`]: per-batch file provenance over a bounded queue
//! - [`loader::AudioDataLoader`]: sampler and worker threads tying it together
//!
//! The seams are two traits: [`traits::AudioPreprocessor`] (samples to
//! features) and [`traits::Perturber`] (external tempo/gain tool).
//!
//! # Quick Start
//!
//! ```ignore
//! use speechfeed::collate::BatchLayout;
//! use speechfeed::config::{AudioConfig, LoaderConfig};
//! use speechfeed::dataset::SpectrogramDataset;
//! use speechfeed::loader::AudioDataLoader;
//! use speechfeed::vocab::LabelVocabulary;
//! use std::sync::Arc;
//!
//! let vocab = LabelVocabulary::from_json_file("labels.json")?;
//! let dataset = SpectrogramDataset::from_manifest_file(
//!     "train_manifest.csv",
//!     vocab,
//!     &AudioConfig::default(),
//!     BatchLayout::PLAIN,
//! )?;
//!
//! let (mut loader, meta) = AudioDataLoader::new(Arc::new(dataset), LoaderConfig::default())?
//!     .with_metadata(64);
//!
//! for batch in loader.iter() {
//!     let batch = batch?;
//!     println!("{:?} {:?}", batch.inputs.shape(), meta.pop_meta_buffer()?.batch);
//! }
//! ```

pub mod audio;
pub mod augment;
pub mod collate;
pub mod config;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod meta;
pub mod preprocessor;
pub mod spectrogram;
pub mod traits;
pub mod types;
pub mod vocab;
