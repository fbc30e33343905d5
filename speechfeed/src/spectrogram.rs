//! Log-magnitude spectrogram: centered STFT -> |X| -> ln(1 + x) -> optional
//! per-sample standardization.

use crate::config::AudioConfig;
use crate::error::{ConfigError, Result};
use crate::traits::AudioPreprocessor;
use ndarray::Array2;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::Deserialize;
use std::convert::Infallible;
use std::f32::consts::PI;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// STFT window function.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(from = "String")]
pub enum WindowKind {
    #[default]
    Hamming,
    Hann,
    Blackman,
    Bartlett,
}

impl WindowKind {
    /// Resolve a window by name. Unknown names fall back to Hamming.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "hann" => Self::Hann,
            "blackman" => Self::Blackman,
            "bartlett" => Self::Bartlett,
            _ => Self::Hamming,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Hamming => "hamming",
            Self::Hann => "hann",
            Self::Blackman => "blackman",
            Self::Bartlett => "bartlett",
        }
    }

    /// Symmetric window of `length` points.
    pub fn coefficients(&self, length: usize) -> Vec<f32> {
        if length <= 1 {
            return vec![1.0; length];
        }

        let m = (length - 1) as f32;
        (0..length)
            .map(|i| {
                let n = i as f32;
                match self {
                    Self::Hamming => 0.54 - 0.46 * (2.0 * PI * n / m).cos(),
                    Self::Hann => 0.5 - 0.5 * (2.0 * PI * n / m).cos(),
                    Self::Blackman => {
                        0.42 - 0.5 * (2.0 * PI * n / m).cos() + 0.08 * (4.0 * PI * n / m).cos()
                    }
                    Self::Bartlett => 1.0 - (2.0 * n / m - 1.0).abs(),
                }
            })
            .collect()
    }
}

impl From<String> for WindowKind {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

impl FromStr for WindowKind {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Precomputed log-magnitude spectrogram transform.
///
/// Output is shaped `(freq_bins, frames)` with `freq_bins = n_fft / 2 + 1`.
#[derive(Clone)]
pub struct Spectrogram {
    pub n_fft: usize,
    pub hop_length: usize,
    pub normalize: bool,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl fmt::Debug for Spectrogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spectrogram")
            .field("n_fft", &self.n_fft)
            .field("hop_length", &self.hop_length)
            .field("normalize", &self.normalize)
            .finish_non_exhaustive()
    }
}

impl Spectrogram {
    /// Create a transform; the window length equals `n_fft`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidWindow`] if `n_fft` or `hop_length` is zero.
    pub fn new(
        n_fft: usize,
        hop_length: usize,
        window: WindowKind,
        normalize: bool,
    ) -> Result<Self> {
        if n_fft == 0 || hop_length == 0 {
            return Err(ConfigError::InvalidWindow { n_fft, hop_length }.into());
        }

        let fft = FftPlanner::<f32>::new().plan_fft_forward(n_fft);

        Ok(Self {
            n_fft,
            hop_length,
            normalize,
            window: window.coefficients(n_fft),
            fft,
        })
    }

    /// Build from audio configuration.
    pub fn from_config(config: &AudioConfig) -> Result<Self> {
        config.validate()?;
        Self::new(
            config.n_fft(),
            config.hop_length(),
            config.window,
            config.normalize,
        )
    }

    pub fn freq_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Number of frames produced for `len` input samples.
    pub fn num_frames(&self, len: usize) -> usize {
        let padded = len + 2 * (self.n_fft / 2);
        if padded < self.n_fft {
            return 0;
        }
        1 + (padded - self.n_fft) / self.hop_length
    }

    /// Compute the feature matrix for mono samples.
    pub fn compute(&self, audio: &[f32]) -> Array2<f32> {
        let padded = center_pad(audio, self.n_fft / 2);
        let num_frames = self.num_frames(audio.len());
        let freq_bins = self.freq_bins();

        let mut spect = Array2::<f32>::zeros((freq_bins, num_frames));
        let mut frame = vec![Complex::new(0.0, 0.0); self.n_fft];

        for frame_idx in 0..num_frames {
            let start = frame_idx * self.hop_length;

            for (i, slot) in frame.iter_mut().enumerate() {
                *slot = Complex::new(padded[start + i] * self.window[i], 0.0);
            }

            self.fft.process(&mut frame);

            for k in 0..freq_bins {
                spect[[k, frame_idx]] = frame[k].norm().ln_1p();
            }
        }

        if self.normalize {
            standardize(&mut spect);
        }

        spect
    }
}

impl AudioPreprocessor for Spectrogram {
    type Features = Array2<f32>;

    fn preprocess(&self, audio: &[f32]) -> Result<Self::Features> {
        Ok(self.compute(audio))
    }
}

/// Pad both ends by `pad` samples, reflecting around the edge samples.
///
/// Signals too short to reflect are zero padded instead.
fn center_pad(audio: &[f32], pad: usize) -> Vec<f32> {
    let len = audio.len();
    let mut padded = Vec::with_capacity(len + 2 * pad);

    if len > pad {
        padded.extend(audio[1..=pad].iter().rev());
        padded.extend_from_slice(audio);
        padded.extend(audio[len - 1 - pad..len - 1].iter().rev());
    } else {
        padded.resize(pad, 0.0);
        padded.extend_from_slice(audio);
        padded.resize(len + 2 * pad, 0.0);
    }

    padded
}

/// Subtract the mean and divide by the unbiased standard deviation.
fn standardize(spect: &mut Array2<f32>) {
    let n = spect.len();
    if n == 0 {
        return;
    }

    let mean = spect.iter().map(|&x| x as f64).sum::<f64>() / n as f64;
    let variance = if n > 1 {
        spect.iter().map(|&x| (x as f64 - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    } else {
        0.0
    };
    let std = variance.sqrt();

    if std > 0.0 && std.is_finite() {
        spect.mapv_inplace(|x| ((x as f64 - mean) / std) as f32);
    } else {
        tracing::warn!(std, "degenerate spectrogram, skipping variance scaling");
        spect.mapv_inplace(|x| (x as f64 - mean) as f32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize, freq: f32, sample_rate: f32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn window_shapes() {
        let hamming = WindowKind::Hamming.coefficients(5);
        assert!((hamming[0] - 0.08).abs() < 1e-6);
        assert!((hamming[2] - 1.0).abs() < 1e-6);
        assert!((hamming[4] - 0.08).abs() < 1e-6);

        let hann = WindowKind::Hann.coefficients(5);
        assert!(hann[0].abs() < 1e-6);
        assert!((hann[2] - 1.0).abs() < 1e-6);

        let bartlett = WindowKind::Bartlett.coefficients(5);
        assert_eq!(bartlett, vec![0.0, 0.5, 1.0, 0.5, 0.0]);

        let blackman = WindowKind::Blackman.coefficients(5);
        assert!(blackman[0].abs() < 1e-6);
        assert!((blackman[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unknown_window_name_is_hamming() {
        assert_eq!(WindowKind::from_name("kaiser"), WindowKind::Hamming);
        assert_eq!("Hann".parse::<WindowKind>().unwrap(), WindowKind::Hann);
        assert_eq!(WindowKind::Blackman.to_string(), "blackman");
    }

    #[test]
    fn reflect_pads_edges() {
        let padded = center_pad(&[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(padded, vec![3.0, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0, 2.0]);

        let short = center_pad(&[1.0], 2);
        assert_eq!(short, vec![0.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn output_shape() {
        let spectrogram = Spectrogram::new(320, 160, WindowKind::Hamming, false).unwrap();
        let audio = sine(16000, 440.0, 16000.0);

        let spect = spectrogram.compute(&audio);

        assert_eq!(spect.shape(), &[161, 101]);
        assert_eq!(spectrogram.num_frames(16000), 101);
    }

    #[test]
    fn peak_at_tone_frequency() {
        // 1 kHz tone, 320-point FFT at 16 kHz: 50 Hz bins, peak at bin 20
        let spectrogram = Spectrogram::new(320, 160, WindowKind::Hann, false).unwrap();
        let audio = sine(3200, 1000.0, 16000.0);

        let spect = spectrogram.compute(&audio);
        let column = spect.column(10);
        let peak = column
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();

        assert_eq!(peak, 20);
        assert!(spect.iter().all(|&x| x >= 0.0));
    }

    #[test]
    fn deterministic_for_fixed_input() {
        let spectrogram = Spectrogram::new(256, 128, WindowKind::Blackman, true).unwrap();
        let audio = sine(4000, 300.0, 8000.0);

        let first = spectrogram.compute(&audio);
        let second = spectrogram.compute(&audio);

        assert_eq!(first, second);
    }

    #[test]
    fn normalization_centers_and_scales() {
        let spectrogram = Spectrogram::new(320, 160, WindowKind::Hamming, true).unwrap();
        let audio: Vec<f32> = sine(8000, 440.0, 16000.0)
            .iter()
            .zip(sine(8000, 3000.0, 16000.0))
            .map(|(a, b)| a + 0.3 * b)
            .collect();

        let spect = spectrogram.compute(&audio);
        let n = spect.len() as f64;
        let mean = spect.iter().map(|&x| x as f64).sum::<f64>() / n;
        let var = spect.iter().map(|&x| (x as f64 - mean).powi(2)).sum::<f64>() / (n - 1.0);

        assert!(mean.abs() < 1e-4);
        assert!((var.sqrt() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn silent_input_stays_finite_when_normalized() {
        let spectrogram = Spectrogram::new(64, 32, WindowKind::Hamming, true).unwrap();

        let spect = spectrogram.compute(&[0.0; 256]);

        assert!(spect.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn zero_sizes_are_rejected() {
        assert!(matches!(
            Spectrogram::new(0, 160, WindowKind::Hamming, false),
            Err(crate::error::Error::Config(ConfigError::InvalidWindow {
                n_fft: 0,
                hop_length: 160
            }))
        ));
        assert!(matches!(
            Spectrogram::new(320, 0, WindowKind::Hann, false),
            Err(crate::error::Error::Config(ConfigError::InvalidWindow { hop_length: 0, .. }))
        ));
        assert!(WindowKind::Bartlett.coefficients(0).is_empty());
    }
}
