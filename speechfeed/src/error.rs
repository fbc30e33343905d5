//! Error types for speechfeed organized by pipeline stage.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Pipeline error variants organized by processing stage.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration stage error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Audio loading stage error
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Tempo/gain augmentation error
    #[error(transparent)]
    Augment(#[from] AugmentError),

    /// Manifest, vocabulary and sample provider errors
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// Batch collation error
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// Metadata buffer error
    #[error(transparent)]
    Meta(#[from] MetaError),

    /// Worker pool error
    #[error(transparent)]
    Loader(#[from] LoaderError),
}

/// Configuration errors (ranges, window sizes, noise sources).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Range with min greater than max or non-finite bounds
    #[error("invalid {name} range: [{min}, {max}]")]
    InvalidRange { name: &'static str, min: f64, max: f64 },

    /// Probability outside [0, 1]
    #[error("invalid noise probability: {0} (expected 0..=1)")]
    InvalidProbability(f64),

    /// Window size or stride resolves to zero samples
    #[error("invalid window: n_fft={n_fft}, hop_length={hop_length} (both must be > 0)")]
    InvalidWindow { n_fft: usize, hop_length: usize },

    /// Batch size of zero
    #[error("batch size must be > 0")]
    InvalidBatchSize,

    /// Noise directory without any usable clip
    #[error("no noise clips (*.wav) found in: {0}")]
    NoNoiseFiles(PathBuf),

    /// Malformed range string
    #[error("invalid range {0:?}: expected \"min,max\"")]
    RangeSyntax(String),

    /// Config file could not be read
    #[error("failed to read config {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Audio loading and validation errors.
#[derive(Debug, Error)]
pub enum AudioError {
    /// File could not be decoded as audio
    #[error("failed to decode audio: {path}")]
    Decode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    /// Decoded audio holds no samples
    #[error("audio contains no samples: {0}")]
    Empty(PathBuf),

    /// IO error while scanning audio files
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// External tempo/gain augmentation errors.
#[derive(Debug, Error)]
pub enum AugmentError {
    /// Temporary output file could not be created
    #[error("failed to create temporary file")]
    TempFile(#[source] std::io::Error),

    /// External tool could not be started
    #[error("failed to run {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// External tool exited unsuccessfully
    #[error("{program} exited with {status}")]
    ExitStatus { program: String, status: ExitStatus },

    /// External tool reported success but produced no audio
    #[error("augmented output missing: {0}")]
    MissingOutput(PathBuf),
}

/// Manifest, vocabulary and sample provider errors.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Manifest index outside `0..len`
    #[error("index {index} out of range for manifest of {len} entries")]
    IndexOutOfRange { index: usize, len: usize },

    /// Manifest line without two comma-separated fields
    #[error("malformed manifest line {line}: {content:?}")]
    Manifest { line: usize, content: String },

    /// Label listed twice in the alphabet
    #[error("duplicate label {0:?} in vocabulary")]
    DuplicateLabel(char),

    /// Labels file entry that is not a single character
    #[error("invalid label {0:?}: expected a single character")]
    InvalidLabel(String),

    /// File could not be read
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Logits or labels file is not valid JSON
    #[error("failed to parse {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Logits rows of unequal width
    #[error("ragged logits in {path}: row {row} has {got} classes, expected {expected}")]
    RaggedLogits {
        path: PathBuf,
        row: usize,
        expected: usize,
        got: usize,
    },
}

/// Batch collation errors.
#[derive(Debug, Error)]
pub enum BatchError {
    /// No samples to collate
    #[error("cannot collate an empty batch")]
    Empty,

    /// Frequency bins differ across the batch
    #[error("sample {index} has {got} frequency bins, expected {expected}")]
    InconsistentFeatureShape {
        index: usize,
        expected: usize,
        got: usize,
    },

    /// Logit classes differ across the batch
    #[error("sample {index} has {got} logit classes, expected {expected}")]
    InconsistentLogitsShape {
        index: usize,
        expected: usize,
        got: usize,
    },

    /// Layout requires paths but the sample has none
    #[error("sample {0} has no audio path")]
    MissingPath(usize),

    /// Layout requires logits but the sample has none
    #[error("sample {0} has no logits")]
    MissingLogits(usize),
}

/// Metadata buffer errors.
#[derive(Debug, Error)]
pub enum MetaError {
    /// Buffer still empty after the bounded wait
    #[error("metadata buffer empty after waiting {waited:?}")]
    Underflow { waited: Duration },

    /// Producer dropped and buffer drained
    #[error("metadata producer disconnected")]
    Disconnected,
}

/// Data loader worker errors.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Building a batch panicked inside a worker
    #[error("worker panicked while building batch {batch}: {message}")]
    WorkerPanicked { batch: usize, message: String },

    /// Every worker stopped before the batch was delivered
    #[error("workers exited before delivering batch {batch}")]
    WorkersExited { batch: usize },
}

/// Result type alias for speechfeed operations.
pub type Result<T> = std::result::Result<T, Error>;

// Nested From implementations for automatic error conversion chains

// serde_json::Error → ConfigError → Error
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(ConfigError::Json(e))
    }
}

// std::io::Error → AudioError → Error
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Audio(AudioError::Io(e))
    }
}
