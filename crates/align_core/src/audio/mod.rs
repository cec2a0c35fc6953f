//! PCM audio ingestion.
//!
//! The engine consumes mono 16-bit PCM produced by an external
//! converter (conventionally via ffmpeg); this module reads such data
//! from WAV files or raw sample slices into normalized `f64` samples.

use std::path::Path;

use thiserror::Error;

use crate::timing::TimeValue;

/// Errors raised while reading audio data.
#[derive(Error, Debug)]
pub enum AudioError {
    /// The WAV container could not be read or decoded.
    #[error("failed to read WAV data: {0}")]
    Wav(#[from] hound::Error),

    /// The stream is not mono 16-bit integer PCM.
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// The stream carries no samples.
    #[error("audio stream is empty")]
    Empty,
}

/// Result type for audio operations.
pub type AudioResult<T> = Result<T, AudioError>;

/// Audio data as normalized mono samples.
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Samples in `[-1, +1]`.
    pub samples: Vec<f64>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioData {
    /// Create audio data from already-normalized samples.
    pub fn new(samples: Vec<f64>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Create audio data from raw signed 16-bit samples.
    pub fn from_pcm16(samples: &[i16], sample_rate: u32) -> Self {
        let samples = samples.iter().map(|&s| f64::from(s) / 32768.0).collect();
        Self {
            samples,
            sample_rate,
        }
    }

    /// Read a mono 16-bit PCM WAV file.
    pub fn from_wav_file(path: &Path) -> AudioResult<Self> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        if spec.channels != 1 {
            return Err(AudioError::UnsupportedFormat(format!(
                "expected mono audio, got {} channels",
                spec.channels
            )));
        }
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(AudioError::UnsupportedFormat(format!(
                "expected 16-bit integer PCM, got {}-bit {:?}",
                spec.bits_per_sample, spec.sample_format
            )));
        }
        let samples = reader
            .samples::<i16>()
            .map(|s| s.map(|v| f64::from(v) / 32768.0))
            .collect::<Result<Vec<f64>, hound::Error>>()?;
        if samples.is_empty() {
            return Err(AudioError::Empty);
        }
        tracing::debug!(
            "Read {} samples at {} Hz from {}",
            samples.len(),
            spec.sample_rate,
            path.display()
        );
        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether there are no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Exact duration of the stream.
    pub fn duration(&self) -> TimeValue {
        if self.sample_rate == 0 {
            return TimeValue::ZERO;
        }
        TimeValue::new(
            rust_decimal::Decimal::from(self.samples.len() as u64)
                / rust_decimal::Decimal::from(self.sample_rate),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm16_normalizes_into_unit_range() {
        let audio = AudioData::from_pcm16(&[0, i16::MAX, i16::MIN], 16000);
        assert_eq!(audio.samples[0], 0.0);
        assert!((audio.samples[1] - 0.99997).abs() < 1e-4);
        assert_eq!(audio.samples[2], -1.0);
    }

    #[test]
    fn duration_is_exact() {
        let audio = AudioData::new(vec![0.0; 16000], 16000);
        assert_eq!(audio.duration(), "1.000".parse().unwrap());
        let audio = AudioData::new(vec![0.0; 8000], 16000);
        assert_eq!(audio.duration(), "0.500".parse().unwrap());
    }

    #[test]
    fn wav_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..1600 {
            let t = i as f64 / 16000.0;
            let v = (2.0 * std::f64::consts::PI * 440.0 * t).sin();
            writer.write_sample((v * 30000.0) as i16).unwrap();
        }
        writer.finalize().unwrap();

        let audio = AudioData::from_wav_file(&path).unwrap();
        assert_eq!(audio.sample_rate, 16000);
        assert_eq!(audio.len(), 1600);
        assert!(audio.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }
}
