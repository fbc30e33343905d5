//! Audio file to spectrogram parser.

use crate::audio::load_waveform;
use crate::augment::{NoiseInjector, SoxPerturber, TempoGainAugmenter};
use crate::config::AudioConfig;
use crate::error::Result;
use crate::spectrogram::Spectrogram;
use crate::traits::{AudioPreprocessor, Perturber};
use ndarray::Array2;
use rand::Rng;
use std::path::Path;

/// Parses audio files into spectrograms with optional augmentation.
///
/// Order of operations: load (tempo/gain perturbed when `augment` is set,
/// tiled to `force_duration` when forced), inject noise with probability
/// `noise_prob`, then compute the feature matrix.
pub struct SpectrogramParser {
    spectrogram: Spectrogram,
    augmenter: Option<TempoGainAugmenter>,
    noise: Option<NoiseInjector>,
    noise_prob: f64,
    force_frames: Option<usize>,
}

impl SpectrogramParser {
    /// Create a parser with `sox` as the tempo/gain tool.
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let perturber = SoxPerturber::new(config.sox_program.clone());
        Self::with_perturber(config, Box::new(perturber))
    }

    /// Create a parser with a custom tempo/gain tool.
    pub fn with_perturber(config: &AudioConfig, perturber: Box<dyn Perturber>) -> Result<Self> {
        let spectrogram = Spectrogram::from_config(config)?;

        let augmenter = config.augment.then(|| {
            TempoGainAugmenter::new(
                perturber,
                config.sample_rate,
                config.tempo_range,
                config.gain_range,
            )
        });

        let noise = config
            .noise_dir
            .as_ref()
            .map(|dir| NoiseInjector::from_dir(dir, config.noise_levels))
            .transpose()?;

        Ok(Self {
            spectrogram,
            augmenter,
            noise,
            noise_prob: config.noise_prob,
            force_frames: config.force_frames(),
        })
    }

    pub fn spectrogram(&self) -> &Spectrogram {
        &self.spectrogram
    }

    /// Load, augment and transform one audio file.
    pub fn parse_audio<R: Rng + ?Sized>(&self, path: &Path, rng: &mut R) -> Result<Array2<f32>> {
        let mut audio = match &self.augmenter {
            Some(augmenter) => augmenter.load(path, self.force_frames, rng)?,
            None => load_waveform(path, self.force_frames)?,
        };

        if let Some(noise) = &self.noise
            && rng.gen_bool(self.noise_prob)
        {
            noise.inject(&mut audio, rng)?;
        }

        self.spectrogram.preprocess(&audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::write_wav_pcm16;
    use crate::config::ValueRange;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn tone(len: usize) -> Vec<f32> {
        (0..len).map(|i| (i as f32 * 0.07).sin() * 0.5).collect()
    }

    #[test]
    fn parses_without_augmentation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speech.wav");
        write_wav_pcm16(&path, &tone(1600), 16000).unwrap();

        let parser = SpectrogramParser::new(&AudioConfig::default()).unwrap();
        let spect = parser
            .parse_audio(&path, &mut StdRng::seed_from_u64(0))
            .unwrap();

        assert_eq!(spect.shape(), &[161, 11]);
    }

    #[test]
    fn forced_duration_fixes_frame_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speech.wav");
        write_wav_pcm16(&path, &tone(800), 16000).unwrap();

        let config = AudioConfig {
            force_duration: 0.5,
            ..Default::default()
        };
        let parser = SpectrogramParser::new(&config).unwrap();
        let spect = parser
            .parse_audio(&path, &mut StdRng::seed_from_u64(0))
            .unwrap();

        assert_eq!(spect.ncols(), parser.spectrogram().num_frames(8000));
    }

    #[test]
    fn zero_probability_never_injects_noise() {
        let dir = tempfile::tempdir().unwrap();
        let noise_dir = dir.path().join("noise");
        std::fs::create_dir(&noise_dir).unwrap();
        write_wav_pcm16(noise_dir.join("hum.wav"), &[0.9; 64], 16000).unwrap();
        let path = dir.path().join("speech.wav");
        write_wav_pcm16(&path, &tone(1600), 16000).unwrap();

        let clean = SpectrogramParser::new(&AudioConfig::default())
            .unwrap()
            .parse_audio(&path, &mut StdRng::seed_from_u64(0))
            .unwrap();

        let config = AudioConfig {
            noise_dir: Some(noise_dir),
            noise_levels: ValueRange::new(0.5, 0.5),
            noise_prob: 0.0,
            ..Default::default()
        };
        let noisy = SpectrogramParser::new(&config)
            .unwrap()
            .parse_audio(&path, &mut StdRng::seed_from_u64(0))
            .unwrap();

        assert_eq!(clean, noisy);
    }

    #[test]
    fn certain_probability_injects_noise() {
        let dir = tempfile::tempdir().unwrap();
        let noise_dir = dir.path().join("noise");
        std::fs::create_dir(&noise_dir).unwrap();
        write_wav_pcm16(noise_dir.join("hum.wav"), &tone(333), 16000).unwrap();
        let path = dir.path().join("speech.wav");
        write_wav_pcm16(&path, &[0.0; 1600], 16000).unwrap();

        let config = AudioConfig {
            noise_dir: Some(noise_dir),
            noise_levels: ValueRange::new(0.5, 0.5),
            noise_prob: 1.0,
            ..Default::default()
        };
        let spect = SpectrogramParser::new(&config)
            .unwrap()
            .parse_audio(&path, &mut StdRng::seed_from_u64(0))
            .unwrap();

        assert!(spect.iter().any(|&x| x > 0.0));
    }
}
