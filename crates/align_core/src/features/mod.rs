//! MFCC features of one audio wave, with head/middle/tail slicing and
//! optional nonspeech masking.

mod extractor;
pub mod vad;

use thiserror::Error;

use crate::audio::AudioData;
use crate::config::{RuntimeConfig, VadSettings};
use crate::timing::{TimeInterval, TimeValue};

pub use extractor::MfccExtractor;

/// Errors raised while computing audio features.
#[derive(Error, Debug)]
pub enum FeatureError {
    /// Window parameters yield zero-sample windows.
    #[error("invalid MFCC window parameters: length {window_length}, shift {window_shift}")]
    InvalidWindow {
        window_length: TimeValue,
        window_shift: TimeValue,
    },

    /// The stream is shorter than one analysis window.
    #[error("audio too short for MFCC extraction: {samples} samples, window {window_samples}")]
    NoFrames {
        samples: usize,
        window_samples: usize,
    },
}

/// Result type for feature operations.
pub type FeatureResult<T> = Result<T, FeatureError>;

/// The MFCC representation of one audio wave.
///
/// The wave is split in time into three contiguous regions: HEAD,
/// MIDDLE, and TAIL; only the middle is aligned. A VAD pass classifies
/// frames as speech/nonspeech, enabling the masked view used when
/// `mask_nonspeech` is requested.
#[derive(Debug, Clone)]
pub struct AudioFeatures {
    /// `mfcc[frame][coefficient]`, coefficient 0 = log-energy.
    mfcc: Vec<Vec<f64>>,
    window_shift: TimeValue,
    middle_begin: usize,
    middle_end: usize,
    speech_mask: Option<Vec<bool>>,
}

impl AudioFeatures {
    /// Wrap an already-computed MFCC matrix.
    pub fn new(mfcc: Vec<Vec<f64>>, window_shift: TimeValue) -> Self {
        let all = mfcc.len();
        Self {
            mfcc,
            window_shift,
            middle_begin: 0,
            middle_end: all,
            speech_mask: None,
        }
    }

    /// Extract features from audio using the given configuration.
    pub fn extract(audio: &AudioData, config: &RuntimeConfig) -> FeatureResult<Self> {
        let extractor = MfccExtractor::new(&config.mfcc, audio.sample_rate);
        let mfcc = extractor.extract(&audio.samples)?;
        tracing::debug!(
            "Extracted {} MFCC frames ({} coefficients each)",
            mfcc.len(),
            config.mfcc.size
        );
        Ok(Self::new(mfcc, config.mfcc.window_shift))
    }

    /// The frame hop used to extract these features.
    pub fn window_shift(&self) -> TimeValue {
        self.window_shift
    }

    /// Total number of frames.
    pub fn all_length(&self) -> usize {
        self.mfcc.len()
    }

    /// Number of frames in the head region.
    pub fn head_length(&self) -> usize {
        self.middle_begin
    }

    /// Number of frames in the middle region.
    pub fn middle_length(&self) -> usize {
        self.middle_end - self.middle_begin
    }

    /// Number of frames in the tail region.
    pub fn tail_length(&self) -> usize {
        self.all_length() - self.middle_end
    }

    /// First frame of the middle region.
    pub fn middle_begin(&self) -> usize {
        self.middle_begin
    }

    /// One-past-last frame of the middle region (equivalently, the
    /// first frame of the tail).
    pub fn middle_end(&self) -> usize {
        self.middle_end
    }

    /// Duration of the whole wave.
    pub fn audio_length(&self) -> TimeValue {
        TimeValue::from_frames(self.all_length(), self.window_shift)
    }

    /// All frames.
    pub fn all_mfcc(&self) -> &[Vec<f64>] {
        &self.mfcc
    }

    /// The frames of the middle region.
    pub fn middle_mfcc(&self) -> &[Vec<f64>] {
        &self.mfcc[self.middle_begin..self.middle_end]
    }

    /// Slice the wave into head/middle/tail regions, all in seconds.
    ///
    /// `middle` wins over `tail` when both are given; omitted values
    /// extend the middle to the respective extremity.
    pub fn set_head_middle_tail(
        &mut self,
        head: Option<TimeValue>,
        middle: Option<TimeValue>,
        tail: Option<TimeValue>,
    ) {
        let all = self.all_length();
        let head_frames = head
            .map(|t| t.to_frames(self.window_shift))
            .unwrap_or(0)
            .min(all);
        self.middle_begin = head_frames;
        self.middle_end = if let Some(middle) = middle {
            (head_frames + middle.to_frames(self.window_shift)).min(all)
        } else if let Some(tail) = tail {
            all.saturating_sub(tail.to_frames(self.window_shift))
        } else {
            all
        };
        self.middle_end = self.middle_end.max(self.middle_begin);
        tracing::debug!(
            "Regions set: head {} middle {} tail {} (frames)",
            self.head_length(),
            self.middle_length(),
            self.tail_length()
        );
    }

    /// Run VAD over the current middle region, storing the speech mask.
    pub fn run_vad(&mut self, settings: &VadSettings) {
        let energies: Vec<f64> = self.middle_mfcc().iter().map(|frame| frame[0]).collect();
        let middle_mask = vad::compute_speech_mask(&energies, settings, self.window_shift);
        let mut mask = vec![false; self.all_length()];
        mask[self.middle_begin..self.middle_end].copy_from_slice(&middle_mask);
        self.speech_mask = Some(mask);
    }

    /// Run VAD only if no mask has been computed yet.
    pub fn ensure_vad(&mut self, settings: &VadSettings) {
        if self.speech_mask.is_none() {
            self.run_vad(settings);
        }
    }

    /// Whether a VAD pass has been run.
    pub fn has_vad(&self) -> bool {
        self.speech_mask.is_some()
    }

    /// Speech/nonspeech intervals of the middle region, as half-open
    /// absolute frame pairs. Empty if VAD has not been run.
    pub fn intervals(&self, speech: bool) -> Vec<(usize, usize)> {
        let Some(mask) = &self.speech_mask else {
            return Vec::new();
        };
        vad::mask_intervals(mask, speech)
            .into_iter()
            .filter_map(|(begin, end)| {
                let begin = begin.max(self.middle_begin);
                let end = end.min(self.middle_end);
                (begin < end).then_some((begin, end))
            })
            .collect()
    }

    /// Speech/nonspeech intervals of the middle region, in seconds.
    pub fn time_intervals(&self, speech: bool) -> Vec<TimeInterval> {
        self.intervals(speech)
            .into_iter()
            .map(|(begin, end)| {
                TimeInterval::from_ordered(
                    TimeValue::from_frames(begin, self.window_shift),
                    TimeValue::from_frames(end, self.window_shift),
                )
            })
            .collect()
    }

    /// Indices (relative to the middle region) of the middle frames
    /// classified as speech.
    pub fn masked_middle_map(&self) -> Vec<usize> {
        let Some(mask) = &self.speech_mask else {
            return Vec::new();
        };
        mask[self.middle_begin..self.middle_end]
            .iter()
            .enumerate()
            .filter_map(|(i, &speech)| speech.then_some(i))
            .collect()
    }

    /// The middle frames classified as speech.
    pub fn masked_middle_mfcc(&self) -> Vec<Vec<f64>> {
        let middle = self.middle_mfcc();
        self.masked_middle_map()
            .into_iter()
            .map(|i| middle[i].clone())
            .collect()
    }

    /// Reverse the wave around its time axis (frames and mask); the
    /// middle region is remapped accordingly.
    pub fn reverse(&mut self) {
        let all = self.all_length();
        self.mfcc.reverse();
        if let Some(mask) = &mut self.speech_mask {
            mask.reverse();
        }
        let (begin, end) = (self.middle_begin, self.middle_end);
        self.middle_begin = all - end;
        self.middle_end = all - begin;
    }
}
