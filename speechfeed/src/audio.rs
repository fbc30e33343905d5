//! Waveform loading: WAV decode, mono downmix and fixed-length tiling.

use crate::error::{AudioError, Result};
use hound::{SampleFormat, WavReader, WavSpec};
use std::path::Path;

fn decode_error(path: &Path) -> impl FnOnce(hound::Error) -> AudioError + '_ {
    move |source| AudioError::Decode {
        path: path.to_path_buf(),
        source,
    }
}

/// Load audio from a WAV file.
///
/// Returns interleaved samples scaled to `[-1, 1)` and the WAV format header.
///
/// # Errors
///
/// Returns [`AudioError::Decode`] if the file cannot be read or decoded.
pub fn load_audio<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, WavSpec)> {
    let path = path.as_ref();
    let mut reader = WavReader::open(path).map_err(decode_error(path))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<hound::Result<_>>(),
        SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<hound::Result<_>>()
        }
    }
    .map_err(decode_error(path))?;

    Ok((samples, spec))
}

/// Load audio from a WAV file as mono samples at the file's native rate.
///
/// Multichannel audio is collapsed by averaging the channels of each frame.
/// No resampling is performed.
pub fn read_audio_mono(path: impl AsRef<Path>) -> Result<Vec<f32>> {
    let (audio, spec) = load_audio(path)?;

    let channels = spec.channels as usize;
    if channels <= 1 {
        return Ok(audio);
    }

    Ok(audio
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect())
}

/// Tile or truncate samples to exactly `target` frames.
///
/// Shorter input is repeated end to end until it covers `target`, then
/// truncated; longer input is truncated without tiling.
pub fn fit_to_frames(samples: Vec<f32>, target: usize, path: &Path) -> Result<Vec<f32>> {
    if samples.len() >= target {
        let mut samples = samples;
        samples.truncate(target);
        return Ok(samples);
    }

    if samples.is_empty() {
        return Err(AudioError::Empty(path.to_path_buf()).into());
    }

    Ok(samples.iter().copied().cycle().take(target).collect())
}

/// Load a mono waveform, optionally forced to a fixed frame count.
///
/// # Errors
///
/// Returns error if the file cannot be decoded or holds no samples.
pub fn load_waveform(path: impl AsRef<Path>, force_frames: Option<usize>) -> Result<Vec<f32>> {
    let path = path.as_ref();
    let samples = read_audio_mono(path)?;

    if samples.is_empty() {
        return Err(AudioError::Empty(path.to_path_buf()).into());
    }

    match force_frames {
        Some(target) => fit_to_frames(samples, target, path),
        None => Ok(samples),
    }
}

/// Duration in seconds read from the WAV header.
pub fn probe_duration(path: impl AsRef<Path>) -> Result<f64> {
    let path = path.as_ref();
    let reader = WavReader::open(path).map_err(decode_error(path))?;
    let spec = reader.spec();

    Ok(reader.duration() as f64 / spec.sample_rate as f64)
}

/// Write mono samples as a 16-bit PCM WAV file.
pub fn write_wav_pcm16(path: impl AsRef<Path>, samples: &[f32], sample_rate: u32) -> Result<()> {
    let path = path.as_ref();
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let write = || -> hound::Result<()> {
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in samples {
            let sample = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(sample)?;
        }
        writer.finalize()
    };

    write().map_err(decode_error(path))?;
    Ok(())
}
