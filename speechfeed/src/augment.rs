//! Audio augmentation: external tempo/gain perturbation and noise injection.

use crate::audio::{load_waveform, read_audio_mono};
use crate::config::ValueRange;
use crate::error::{AudioError, AugmentError, ConfigError, Result};
use crate::traits::Perturber;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Runs `sox` to render a tempo/gain perturbed copy of a recording.
#[derive(Clone, Debug)]
pub struct SoxPerturber {
    pub program: String,
}

impl Default for SoxPerturber {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SOX_PROGRAM)
    }
}

impl SoxPerturber {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Command-line arguments for one invocation.
    pub fn args(
        input: &Path,
        output: &Path,
        sample_rate: u32,
        tempo: f64,
        gain_db: f64,
    ) -> Vec<String> {
        vec![
            input.to_string_lossy().into_owned(),
            "-r".to_string(),
            sample_rate.to_string(),
            "-c".to_string(),
            "1".to_string(),
            "-b".to_string(),
            "16".to_string(),
            output.to_string_lossy().into_owned(),
            "tempo".to_string(),
            format!("{tempo:.3}"),
            "gain".to_string(),
            format!("{gain_db:.3}"),
        ]
    }
}

impl Perturber for SoxPerturber {
    fn perturb(
        &self,
        input: &Path,
        output: &Path,
        sample_rate: u32,
        tempo: f64,
        gain_db: f64,
    ) -> Result<()> {
        let status = Command::new(&self.program)
            .args(Self::args(input, output, sample_rate, tempo, gain_db))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| AugmentError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(AugmentError::ExitStatus {
                program: self.program.clone(),
                status,
            }
            .into());
        }

        Ok(())
    }
}

/// Random tempo and gain perturbation through a [`Perturber`].
pub struct TempoGainAugmenter {
    perturber: Box<dyn Perturber>,
    sample_rate: u32,
    tempo_range: ValueRange,
    gain_range: ValueRange,
}

impl TempoGainAugmenter {
    pub fn new(
        perturber: Box<dyn Perturber>,
        sample_rate: u32,
        tempo_range: ValueRange,
        gain_range: ValueRange,
    ) -> Self {
        Self {
            perturber,
            sample_rate,
            tempo_range,
            gain_range,
        }
    }

    /// Draw tempo and gain, render a perturbed copy and load it.
    ///
    /// The rendered copy lives in a temporary file that is removed on every
    /// return path, including tool and decode failures.
    pub fn load<R: Rng + ?Sized>(
        &self,
        path: &Path,
        force_frames: Option<usize>,
        rng: &mut R,
    ) -> Result<Vec<f32>> {
        let tempo = uniform(rng, self.tempo_range);
        let gain_db = uniform(rng, self.gain_range);

        let augmented = tempfile::Builder::new()
            .prefix("speechfeed-")
            .suffix(".wav")
            .tempfile()
            .map_err(AugmentError::TempFile)?;

        tracing::debug!(
            path = ?path.display(),
            tempo,
            gain_db,
            "perturbing audio"
        );

        self.perturber
            .perturb(path, augmented.path(), self.sample_rate, tempo, gain_db)?;

        let rendered = std::fs::metadata(augmented.path()).is_ok_and(|m| m.len() > 0);
        if !rendered {
            return Err(AugmentError::MissingOutput(augmented.path().to_path_buf()).into());
        }

        load_waveform(augmented.path(), force_frames)
    }
}

fn uniform<R: Rng + ?Sized>(rng: &mut R, range: ValueRange) -> f64 {
    if range.min < range.max {
        rng.gen_range(range.min..range.max)
    } else {
        range.min
    }
}

/// Background noise injection from a directory of clips.
#[derive(Clone, Debug)]
pub struct NoiseInjector {
    paths: Vec<PathBuf>,
    levels: ValueRange,
}

impl NoiseInjector {
    /// Collect every `*.wav` under `dir`, recursively.
    pub fn from_dir(dir: impl AsRef<Path>, levels: ValueRange) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        collect_wav_files(dir, &mut paths)?;
        paths.sort();

        if paths.is_empty() {
            return Err(ConfigError::NoNoiseFiles(dir.to_path_buf()).into());
        }

        tracing::debug!(dir = ?dir.display(), clips = paths.len(), "noise clips found");

        Ok(Self { paths, levels })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Mix a random clip into `signal` at a random level and offset.
    pub fn inject<R: Rng + ?Sized>(&self, signal: &mut [f32], rng: &mut R) -> Result<()> {
        let noise_path = &self.paths[rng.gen_range(0..self.paths.len())];
        let level = uniform(rng, self.levels) as f32;
        let offset_fraction = rng.gen_range(0.0..1.0);

        self.inject_sample(signal, noise_path, level, offset_fraction)
    }

    /// Mix a specific clip at a given level and start fraction.
    pub fn inject_sample(
        &self,
        signal: &mut [f32],
        noise_path: &Path,
        level: f32,
        offset_fraction: f64,
    ) -> Result<()> {
        let noise = read_audio_mono(noise_path)?;
        if noise.is_empty() {
            return Err(AudioError::Empty(noise_path.to_path_buf()).into());
        }

        mix_noise(signal, &noise, offset_fraction, level);
        Ok(())
    }
}

/// Add `level * noise` to `signal`, wrapping the noise clip as needed.
///
/// Copying starts `offset_fraction` of the way into `noise`; when the clip is
/// exhausted before `signal` is covered it continues from the clip start.
pub fn mix_noise(signal: &mut [f32], noise: &[f32], offset_fraction: f64, level: f32) {
    if noise.is_empty() {
        return;
    }

    let offset = ((noise.len() as f64 * offset_fraction) as usize).min(noise.len() - 1);
    let wrapped = noise[offset..].iter().chain(noise.iter().cycle());

    for (sample, n) in signal.iter_mut().zip(wrapped) {
        *sample += level * n;
    }
}

fn collect_wav_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_wav_files(&path, out)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
        {
            out.push(path);
        }
    }
    Ok(())
}
