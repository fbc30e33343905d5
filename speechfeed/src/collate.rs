//! Variable-length batch collation.

use crate::error::{BatchError, Result};
use crate::types::Sample;
use ndarray::{Array1, Array3, Array4, s};
use std::path::PathBuf;

/// Optional per-sample payloads carried into a [`Batch`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchLayout {
    /// Collect each sample's audio path
    pub paths: bool,
    /// Pad and stack each sample's precomputed logits
    pub logits: bool,
}

impl BatchLayout {
    /// Tensors only.
    pub const PLAIN: Self = Self {
        paths: false,
        logits: false,
    };

    /// Tensors plus audio paths.
    pub const WITH_PATHS: Self = Self {
        paths: true,
        logits: false,
    };

    /// Tensors plus audio paths and logits.
    pub const WITH_LOGITS: Self = Self {
        paths: true,
        logits: true,
    };
}

/// Padded, model-facing batch.
#[derive(Clone, Debug)]
pub struct Batch {
    /// Zero-padded features, `[N, 1, freq_bins, max_time]`
    pub inputs: Array4<f32>,
    /// All label sequences concatenated in sample order
    pub targets: Array1<u32>,
    /// Valid fraction of the time axis per sample
    pub input_percentages: Array1<f32>,
    /// Label count per sample
    pub target_sizes: Array1<u32>,
    /// Unpadded frame count per sample
    pub frame_lengths: Vec<usize>,
    /// Manifest indices in sample order
    pub indices: Vec<usize>,
    pub paths: Option<Vec<PathBuf>>,
    /// `-inf`-padded logits, `[N, max_logit_len, classes]`
    pub logits: Option<Array3<f32>>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Padded time length of `inputs`.
    pub fn max_time(&self) -> usize {
        self.inputs.shape()[3]
    }

    /// Per-sample label slices recovered from `targets` and `target_sizes`.
    pub fn split_targets(&self) -> Vec<&[u32]> {
        let flat = self.targets.as_slice().unwrap_or_default();
        let mut offset = 0;

        self.target_sizes
            .iter()
            .map(|&size| {
                let end = (offset + size as usize).min(flat.len());
                let slice = &flat[offset.min(end)..end];
                offset = end;
                slice
            })
            .collect()
    }

    /// Valid output lengths for a model emitting `seq_len` steps over the
    /// padded input.
    pub fn output_sizes(&self, seq_len: usize) -> Vec<usize> {
        self.input_percentages
            .iter()
            .map(|&fraction| (fraction as f64 * seq_len as f64).floor() as usize)
            .collect()
    }
}

/// Pad and stack samples into a [`Batch`].
///
/// Features are zero-padded on the time axis to the longest sample. Logits
/// are padded with `-inf` so that padded steps carry no probability mass.
///
/// # Errors
///
/// Fails on an empty slice, on mismatched frequency bins or logit classes,
/// and when `layout` asks for a payload a sample does not carry.
pub fn collate(samples: &[Sample], layout: BatchLayout) -> Result<Batch> {
    let first = samples.first().ok_or(BatchError::Empty)?;
    let freq_bins = first.freq_bins();

    if let Some((index, got)) = samples
        .iter()
        .map(Sample::freq_bins)
        .enumerate()
        .find(|&(_, bins)| bins != freq_bins)
    {
        return Err(BatchError::InconsistentFeatureShape {
            index,
            expected: freq_bins,
            got,
        }
        .into());
    }

    let frame_lengths: Vec<usize> = samples.iter().map(Sample::frames).collect();
    let max_time = frame_lengths.iter().copied().max().unwrap_or(0);

    let mut inputs = Array4::zeros((samples.len(), 1, freq_bins, max_time));
    for (i, sample) in samples.iter().enumerate() {
        inputs
            .slice_mut(s![i, 0, .., ..sample.frames()])
            .assign(&sample.features);
    }

    let input_percentages = frame_lengths
        .iter()
        .map(|&t| t as f32 / max_time.max(1) as f32)
        .collect();
    let target_sizes = samples.iter().map(|s| s.labels.len() as u32).collect();
    let targets = samples
        .iter()
        .flat_map(|s| s.labels.iter().copied())
        .collect();
    let indices = samples.iter().map(|s| s.index).collect();

    let paths = layout
        .paths
        .then(|| {
            samples
                .iter()
                .enumerate()
                .map(|(i, s)| s.audio_path.clone().ok_or(BatchError::MissingPath(i)))
                .collect::<std::result::Result<Vec<_>, _>>()
        })
        .transpose()?;

    let logits = if layout.logits {
        Some(stack_logits(samples)?)
    } else {
        None
    };

    tracing::debug!(
        batch_size = samples.len(),
        freq_bins,
        max_time,
        "collated batch"
    );

    Ok(Batch {
        inputs,
        targets,
        input_percentages,
        target_sizes,
        frame_lengths,
        indices,
        paths,
        logits,
    })
}

fn stack_logits(samples: &[Sample]) -> std::result::Result<Array3<f32>, BatchError> {
    let matrices = samples
        .iter()
        .enumerate()
        .map(|(i, s)| s.logits.as_ref().ok_or(BatchError::MissingLogits(i)))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let classes = matrices.first().map_or(0, |m| m.ncols());
    if let Some((index, got)) = matrices
        .iter()
        .map(|m| m.ncols())
        .enumerate()
        .find(|&(_, c)| c != classes)
    {
        return Err(BatchError::InconsistentLogitsShape {
            index,
            expected: classes,
            got,
        });
    }

    let max_len = matrices.iter().map(|m| m.nrows()).max().unwrap_or(0);

    let mut logits = Array3::from_elem((samples.len(), max_len, classes), f32::NEG_INFINITY);
    for (i, matrix) in matrices.iter().enumerate() {
        logits
            .slice_mut(s![i, ..matrix.nrows(), ..])
            .assign(*matrix);
    }

    Ok(logits)
}
