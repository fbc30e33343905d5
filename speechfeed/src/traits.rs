//! Core traits for pipeline components.

use crate::error::Result;
use std::path::Path;

/// Converts raw mono audio into model features.
pub trait AudioPreprocessor {
    /// Feature type produced from audio.
    type Features;

    /// Compute features for the given samples.
    fn preprocess(&self, audio: &[f32]) -> Result<Self::Features>;
}

/// External tempo/gain renderer.
///
/// Implementations write a mono 16-bit WAV at `sample_rate` to `output`,
/// stretched by `tempo` and amplified by `gain_db`. The caller owns `output`
/// and removes it afterwards.
pub trait Perturber: Send + Sync {
    fn perturb(
        &self,
        input: &Path,
        output: &Path,
        sample_rate: u32,
        tempo: f64,
        gain_db: f64,
    ) -> Result<()>;
}
