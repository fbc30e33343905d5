//! Core types for speechfeed

use ndarray::Array2;
use serde::Serialize;
use std::path::PathBuf;

/// One loaded training example.
#[derive(Clone, Debug)]
pub struct Sample {
    /// Manifest index the sample was drawn from
    pub index: usize,
    /// Log-magnitude spectrogram, `(freq_bins, frames)`
    pub features: Array2<f32>,
    /// Transcript label ids
    pub labels: Vec<u32>,
    /// Source audio path, when the layout carries paths
    pub audio_path: Option<PathBuf>,
    /// Precomputed model outputs, `(frames, classes)`, when the layout carries logits
    pub logits: Option<Array2<f32>>,
}

impl Sample {
    pub fn new(index: usize, features: Array2<f32>, labels: Vec<u32>) -> Self {
        Self {
            index,
            features,
            labels,
            audio_path: None,
            logits: None,
        }
    }

    pub fn freq_bins(&self) -> usize {
        self.features.nrows()
    }

    pub fn frames(&self) -> usize {
        self.features.ncols()
    }
}

/// File-level provenance of a manifest entry.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SampleMeta {
    pub audio_path: PathBuf,
    pub transcript_path: PathBuf,
    /// Audio duration in seconds
    pub duration_secs: f64,
    /// Audio file size in kilobytes (1 kB = 1000 bytes)
    pub size_kb: f64,
}
