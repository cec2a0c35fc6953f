//! Start detector: locates the audio head and tail.
//!
//! A portion of the transcript is synthesized and aligned against the
//! first (respectively last) part of the real wave; candidate begin
//! points come from the VAD speech intervals, and the candidate with
//! the cheapest partial DTW match wins. Tail detection reverses both
//! waves around the time axis, reducing it to head detection.

use std::fs;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::audio::{AudioData, AudioError};
use crate::config::RuntimeConfig;
use crate::dtw::accumulated_cost_matrix;
use crate::features::{AudioFeatures, FeatureError};
use crate::synth::{SpeechSynthesizer, SynthesisError};
use crate::text::TextFile;
use crate::timing::TimeValue;

/// Errors raised during head/tail detection.
#[derive(Error, Debug)]
pub enum SdError {
    /// Query synthesis failed.
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    /// The synthesized query could not be read back.
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// MFCC extraction of the query failed.
    #[error(transparent)]
    Feature(#[from] FeatureError),

    /// Scratch file handling failed.
    #[error("scratch file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for detection operations.
pub type SdResult<T> = Result<T, SdError>;

/// Detects the audio head and tail of a wave for a given text.
pub struct StartDetector<'a> {
    real: &'a mut AudioFeatures,
    text: &'a TextFile,
    synthesizer: &'a dyn SpeechSynthesizer,
    config: &'a RuntimeConfig,
}

impl<'a> StartDetector<'a> {
    /// Synthesize at least `QUERY_FACTOR` times the max head/tail
    /// length of query audio.
    const QUERY_FACTOR: u64 = 1;

    /// Search the first `AUDIO_FACTOR` times the max head/tail length
    /// of the real wave. Must be at least `1 + QUERY_FACTOR * 1.5`.
    const AUDIO_FACTOR: Decimal = Decimal::from_parts(25, 0, 0, false, 1);

    /// Default maximum head/tail length, in seconds.
    const MAX_LENGTH_SECS: u64 = 10;

    /// Create a detector for the given wave and text.
    pub fn new(
        real: &'a mut AudioFeatures,
        text: &'a TextFile,
        synthesizer: &'a dyn SpeechSynthesizer,
        config: &'a RuntimeConfig,
    ) -> Self {
        Self {
            real,
            text,
            synthesizer,
            config,
        }
    }

    /// Detect the interval of the wave containing the spoken text.
    ///
    /// Returns `(begin, end)` with respect to the full wave; `(0, 0)`
    /// when the detected lengths are inconsistent.
    pub fn detect_interval(
        &mut self,
        min_head: Option<TimeValue>,
        max_head: Option<TimeValue>,
        min_tail: Option<TimeValue>,
        max_tail: Option<TimeValue>,
    ) -> SdResult<(TimeValue, TimeValue)> {
        let head = self.detect_head(min_head, max_head)?;
        let tail = self.detect_tail(min_tail, max_tail)?;
        let begin = head;
        let end = self.real.audio_length() - tail;
        tracing::debug!("Detected head {} tail {}", head, tail);
        if !begin.is_negative() && end > begin {
            Ok((begin, end))
        } else {
            Ok((TimeValue::ZERO, TimeValue::ZERO))
        }
    }

    /// Detect the audio head, returning its duration.
    pub fn detect_head(
        &mut self,
        min_length: Option<TimeValue>,
        max_length: Option<TimeValue>,
    ) -> SdResult<TimeValue> {
        self.detect(min_length, max_length, false)
    }

    /// Detect the audio tail, returning its duration.
    pub fn detect_tail(
        &mut self,
        min_length: Option<TimeValue>,
        max_length: Option<TimeValue>,
    ) -> SdResult<TimeValue> {
        self.detect(min_length, max_length, true)
    }

    fn detect(
        &mut self,
        min_length: Option<TimeValue>,
        max_length: Option<TimeValue>,
        tail: bool,
    ) -> SdResult<TimeValue> {
        let min_length = min_length.unwrap_or(TimeValue::ZERO).max(TimeValue::ZERO);
        let max_length = max_length
            .unwrap_or_else(|| TimeValue::new(Decimal::from(Self::MAX_LENGTH_SECS)))
            .max(TimeValue::ZERO);
        let shift = self.config.mfcc.window_shift;
        let min_frames = min_length.to_frames(shift);
        let max_frames = max_length.to_frames(shift);
        tracing::debug!(
            "Detecting {} between {} and {} seconds",
            if tail { "tail" } else { "head" },
            min_length,
            max_length
        );

        // Synthesize the query: enough text from the proper side.
        let query_duration = max_length * Decimal::from(Self::QUERY_FACTOR);
        fs::create_dir_all(&self.config.paths.temp_root)?;
        let scratch = tempfile::Builder::new()
            .prefix("sd_query_")
            .suffix(".wav")
            .tempfile_in(&self.config.paths.temp_root)?;
        self.synthesizer
            .synthesize(self.text, scratch.path(), Some(query_duration), tail)?;
        let query_audio = AudioData::from_wav_file(scratch.path())?;
        let query_features = AudioFeatures::extract(&query_audio, self.config)?;
        let mut query = query_features.all_mfcc().to_vec();

        self.real.ensure_vad(&self.config.vad);
        if tail {
            self.real.reverse();
            query.reverse();
        }

        let best = self.best_candidate(&query, min_frames, max_frames, max_length);

        if tail {
            self.real.reverse();
        }
        Ok(best)
    }

    /// Score every candidate begin frame against the query and return
    /// the cheapest one, in seconds. Returns zero when no speech or no
    /// candidate is found.
    fn best_candidate(
        &self,
        query: &[Vec<f64>],
        min_frames: usize,
        max_frames: usize,
        max_length: TimeValue,
    ) -> TimeValue {
        let shift = self.config.mfcc.window_shift;
        let speech_intervals = self.real.intervals(true);
        if speech_intervals.is_empty() {
            tracing::debug!("No speech intervals, hence no start found");
            return TimeValue::ZERO;
        }

        let search_window = max_length * Self::AUDIO_FACTOR;
        let search_window_end = search_window.to_frames(shift).min(self.real.all_length());

        let mut candidates_begin = Vec::new();
        let mut search_end = 0;
        for (begin, end) in speech_intervals {
            if begin >= min_frames && begin <= max_frames {
                candidates_begin.push(begin);
            }
            search_end = end;
            if search_end >= search_window_end {
                break;
            }
        }

        let mut candidates: Vec<(f64, usize)> = Vec::new();
        for begin in candidates_begin {
            if begin >= search_end || query.is_empty() {
                continue;
            }
            let region = &self.real.all_mfcc()[begin..search_end];
            let acm = accumulated_cost_matrix(region, query);
            // Min over the last column: the whole query may match any
            // prefix of the region.
            let min_value = acm
                .iter()
                .map(|row| row[row.len() - 1])
                .fold(f64::INFINITY, f64::min);
            tracing::debug!(
                "Candidate begin {} ({}) cost {:.6}",
                begin,
                TimeValue::from_frames(begin, shift),
                min_value
            );
            candidates.push((min_value, begin));
        }

        let Some(&(_, best)) = candidates
            .iter()
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
        else {
            tracing::debug!("No candidates found");
            return TimeValue::ZERO;
        };
        TimeValue::from_frames(best, shift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{real_audio, text_file, ToneSynthesizer};

    fn tv(s: &str) -> TimeValue {
        s.parse().unwrap()
    }

    fn config_in(dir: &std::path::Path) -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.paths.temp_root = dir.join("tmp").to_string_lossy().into_owned();
        config
    }

    #[test]
    fn silent_audio_detects_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let text = text_file(&["some words here"]);
        // Pure silence: VAD finds no speech at all.
        let audio = AudioData::new(vec![0.0; 16000 * 4], 16000);
        let mut real = AudioFeatures::extract(&audio, &config).unwrap();
        let synthesizer = ToneSynthesizer::default();
        let mut sd = StartDetector::new(&mut real, &text, &synthesizer, &config);
        assert_eq!(sd.detect_head(None, None).unwrap(), TimeValue::ZERO);
    }

    #[test]
    fn head_is_found_near_the_leading_silence() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let text = text_file(&["first fragment words", "second fragment words"]);
        let audio = real_audio(&text, 1.0, 0.5);
        let mut real = AudioFeatures::extract(&audio, &config).unwrap();
        let synthesizer = ToneSynthesizer::default();
        let mut sd = StartDetector::new(&mut real, &text, &synthesizer, &config);
        let head = sd.detect_head(None, Some(tv("3.000"))).unwrap();
        // Speech starts at 1.0 s; allow a couple of frames of slack.
        let head = head.to_f64();
        assert!((0.8..=1.2).contains(&head), "head {head}");
    }

    #[test]
    fn detect_interval_brackets_the_speech() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let text = text_file(&["first fragment words", "second fragment words"]);
        let audio = real_audio(&text, 1.0, 1.0);
        let duration = audio.duration().to_f64();
        let mut real = AudioFeatures::extract(&audio, &config).unwrap();
        let synthesizer = ToneSynthesizer::default();
        let mut sd = StartDetector::new(&mut real, &text, &synthesizer, &config);
        let (begin, end) = sd
            .detect_interval(None, Some(tv("3.000")), None, Some(tv("3.000")))
            .unwrap();
        assert!(begin < end);
        assert!(begin.to_f64() <= 1.3);
        assert!(end.to_f64() >= duration - 1.3);
    }
}
