//! Audio and loader configuration.
//!
//! Both configs derive `clap::Args` so binaries can flatten them into
//! subcommands, and `serde::Deserialize` so they can be read from JSON.
//! Missing JSON keys take the same defaults as the CLI flags.

use crate::error::{ConfigError, Result};
use crate::spectrogram::WindowKind;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 16000;

/// Default STFT window size in seconds
pub const DEFAULT_WINDOW_SIZE: f64 = 0.02;

/// Default STFT window stride in seconds
pub const DEFAULT_WINDOW_STRIDE: f64 = 0.01;

/// Default noise level range
pub const DEFAULT_NOISE_LEVELS: ValueRange = ValueRange::new(0.0, 0.5);

/// Default per-sample noise injection probability
pub const DEFAULT_NOISE_PROB: f64 = 0.4;

/// Default tempo multiplier range
pub const DEFAULT_TEMPO_RANGE: ValueRange = ValueRange::new(0.85, 1.15);

/// Default gain range in dB
pub const DEFAULT_GAIN_RANGE: ValueRange = ValueRange::new(-6.0, 8.0);

/// Sentinel for "keep native duration"
pub const NO_FORCED_DURATION: f64 = -1.0;

/// Default external tempo/gain tool
pub const DEFAULT_SOX_PROGRAM: &str = "sox";

/// Default number of samples per batch
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Default number of loader worker threads
pub const DEFAULT_NUM_WORKERS: usize = 4;

/// Closed interval `[min, max]` used for random draws.
///
/// Parses from and displays as `"min,max"`; deserializes from `[min, max]`.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(from = "(f64, f64)")]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Check bounds are finite and ordered.
    pub fn validate(&self, name: &'static str) -> std::result::Result<(), ConfigError> {
        if self.min.is_finite() && self.max.is_finite() && self.min <= self.max {
            Ok(())
        } else {
            Err(ConfigError::InvalidRange {
                name,
                min: self.min,
                max: self.max,
            })
        }
    }
}

impl From<(f64, f64)> for ValueRange {
    fn from((min, max): (f64, f64)) -> Self {
        Self { min, max }
    }
}

impl fmt::Display for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.min, self.max)
    }
}

impl FromStr for ValueRange {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let syntax = || ConfigError::RangeSyntax(s.to_string());

        let (min, max) = s.split_once(',').ok_or_else(syntax)?;
        let min = min.trim().parse().map_err(|_| syntax())?;
        let max = max.trim().parse().map_err(|_| syntax())?;

        Ok(Self { min, max })
    }
}

/// Audio parsing configuration: spectrogram parameters plus augmentation.
#[derive(clap::Args, Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz (window sizing and augmented output rate)
    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    /// STFT window size in seconds
    #[arg(long, default_value_t = DEFAULT_WINDOW_SIZE)]
    pub window_size: f64,

    /// STFT window stride in seconds
    #[arg(long, default_value_t = DEFAULT_WINDOW_STRIDE)]
    pub window_stride: f64,

    /// Window function: hamming, hann, blackman or bartlett
    #[arg(long, default_value_t = WindowKind::Hamming)]
    pub window: WindowKind,

    /// Directory of background noise clips to inject
    #[arg(long)]
    pub noise_dir: Option<PathBuf>,

    /// Noise level range as "min,max"
    #[arg(long, default_value_t = DEFAULT_NOISE_LEVELS)]
    pub noise_levels: ValueRange,

    /// Probability of injecting noise into a sample
    #[arg(long, default_value_t = DEFAULT_NOISE_PROB)]
    pub noise_prob: f64,

    /// Standardize each spectrogram to zero mean and unit variance
    #[arg(long)]
    pub normalize: bool,

    /// Apply random tempo and gain perturbation
    #[arg(long)]
    pub augment: bool,

    /// Force every recording to this duration in seconds (-1 keeps native)
    #[arg(long, default_value_t = NO_FORCED_DURATION, allow_negative_numbers = true)]
    pub force_duration: f64,

    /// Tempo multiplier range as "min,max"
    #[arg(long, default_value_t = DEFAULT_TEMPO_RANGE)]
    pub tempo_range: ValueRange,

    /// Gain range in dB as "min,max"
    #[arg(long, default_value_t = DEFAULT_GAIN_RANGE, allow_hyphen_values = true)]
    pub gain_range: ValueRange,

    /// External program used for tempo/gain perturbation
    #[arg(long, default_value = DEFAULT_SOX_PROGRAM)]
    pub sox_program: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            window_size: DEFAULT_WINDOW_SIZE,
            window_stride: DEFAULT_WINDOW_STRIDE,
            window: WindowKind::Hamming,
            noise_dir: None,
            noise_levels: DEFAULT_NOISE_LEVELS,
            noise_prob: DEFAULT_NOISE_PROB,
            normalize: false,
            augment: false,
            force_duration: NO_FORCED_DURATION,
            tempo_range: DEFAULT_TEMPO_RANGE,
            gain_range: DEFAULT_GAIN_RANGE,
            sox_program: DEFAULT_SOX_PROGRAM.to_string(),
        }
    }
}

impl AudioConfig {
    /// Load and validate a JSON config. Missing keys take default values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;

        Ok(config)
    }

    /// FFT size and window length in samples.
    pub fn n_fft(&self) -> usize {
        (self.sample_rate as f64 * self.window_size) as usize
    }

    /// Hop length in samples.
    pub fn hop_length(&self) -> usize {
        (self.sample_rate as f64 * self.window_stride) as usize
    }

    /// Target frame count when a duration is forced.
    pub fn force_frames(&self) -> Option<usize> {
        let frames = (self.force_duration * self.sample_rate as f64) as i64;
        (frames > 0).then_some(frames as usize)
    }

    pub fn validate(&self) -> Result<()> {
        let (n_fft, hop_length) = (self.n_fft(), self.hop_length());
        if n_fft == 0 || hop_length == 0 {
            return Err(ConfigError::InvalidWindow { n_fft, hop_length }.into());
        }

        if !(0.0..=1.0).contains(&self.noise_prob) {
            return Err(ConfigError::InvalidProbability(self.noise_prob).into());
        }

        self.noise_levels.validate("noise level")?;
        self.tempo_range.validate("tempo")?;
        self.gain_range.validate("gain")?;

        Ok(())
    }
}

/// Data loader configuration.
#[derive(clap::Args, Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoaderConfig {
    /// Samples per batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Worker threads building batches (0 builds on the calling thread)
    #[arg(long, default_value_t = DEFAULT_NUM_WORKERS)]
    pub num_workers: usize,

    /// Shuffle sample order every epoch
    #[arg(long)]
    pub shuffle: bool,

    /// Seed for shuffling and augmentation
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Drop the last incomplete batch
    #[arg(long)]
    pub drop_last: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            num_workers: DEFAULT_NUM_WORKERS,
            shuffle: false,
            seed: 0,
            drop_last: false,
        }
    }
}

impl LoaderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize.into());
        }
        Ok(())
    }
}
