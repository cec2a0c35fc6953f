//! Boundary adjustment: turn raw DTW boundary frames into a sync map
//! fragment list and post-process it.
//!
//! Processing order is fixed: intervals to fragment list, zero-length
//! fix, long-nonspeech injection, the selected algorithm, smoothing.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::RuntimeConfig;
use crate::features::AudioFeatures;
use crate::syncmap::{FragmentListError, FragmentType, SyncMapFragment, SyncMapFragmentList};
use crate::text::{TextFragment, TextFile};
use crate::timing::{TimeInterval, TimeValue, TimingError};

/// Boundary adjustment algorithm with its parameter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustAlgorithm {
    /// No adjustment.
    #[default]
    Auto,
    /// Translate every interval by the given amount.
    Offset(TimeValue),
    /// Move transitions inside nonspeech intervals to the given
    /// percentage of the interval.
    Percent(i64),
    /// Move transitions inside nonspeech intervals to the given delay
    /// after the interval begin.
    AfterCurrent(TimeValue),
    /// Move transitions inside nonspeech intervals to the given delay
    /// before the interval end.
    BeforeNext(TimeValue),
    /// Enforce a maximum rate by stealing slack from the previous
    /// fragment.
    Rate(Decimal),
    /// Enforce a maximum rate, stealing from the next fragment too.
    RateAggressive(Decimal),
}

impl AdjustAlgorithm {
    /// Short name of the algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            AdjustAlgorithm::Auto => "auto",
            AdjustAlgorithm::Offset(_) => "offset",
            AdjustAlgorithm::Percent(_) => "percent",
            AdjustAlgorithm::AfterCurrent(_) => "aftercurrent",
            AdjustAlgorithm::BeforeNext(_) => "beforenext",
            AdjustAlgorithm::Rate(_) => "rate",
            AdjustAlgorithm::RateAggressive(_) => "rateaggressive",
        }
    }
}

impl std::fmt::Display for AdjustAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What to do with detected long nonspeech intervals.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NonspeechReplacement {
    /// Drop nonspeech fragments from the output.
    #[default]
    Remove,
    /// Keep them, carrying the given text.
    Replace(String),
}

impl NonspeechReplacement {
    fn lines(&self) -> Vec<String> {
        match self {
            NonspeechReplacement::Remove => Vec::new(),
            NonspeechReplacement::Replace(text) => vec![text.clone()],
        }
    }
}

/// Parameters of one adjustment pass.
#[derive(Debug, Clone, Default)]
pub struct AdjustParams {
    /// The algorithm to apply.
    pub algorithm: AdjustAlgorithm,
    /// Enforce a minimum fragment duration.
    pub no_zero: bool,
    /// Inject NONSPEECH fragments for nonspeech intervals at least
    /// this long.
    pub nonspeech_min: Option<TimeValue>,
    /// Replacement policy for injected NONSPEECH fragments.
    pub nonspeech_replacement: NonspeechReplacement,
}

/// Errors raised during boundary adjustment.
#[derive(Error, Debug)]
pub enum AdjustError {
    /// Fewer than four time values (three intervals) were provided.
    #[error("expected at least 4 time values, got {0}")]
    TooFewTimeValues(usize),

    /// Time value count does not match the text fragment count.
    #[error("{time_values} time values cannot cover {fragments} text fragments")]
    FragmentCountMismatch {
        time_values: usize,
        fragments: usize,
    },

    /// A fragment list operation failed.
    #[error(transparent)]
    List(#[from] FragmentListError),

    /// An interval operation failed.
    #[error(transparent)]
    Timing(#[from] TimingError),
}

/// Result type for adjustment operations.
pub type AdjustResult<T> = Result<T, AdjustError>;

/// Translates DTW boundary indices into an adjusted fragment list.
pub struct BoundaryAdjuster<'a> {
    config: &'a RuntimeConfig,
}

impl<'a> BoundaryAdjuster<'a> {
    /// Create an adjuster reading tunables from `config`.
    pub fn new(config: &'a RuntimeConfig) -> Self {
        Self { config }
    }

    /// Run the full adjustment pipeline.
    ///
    /// `boundary_indices` are real-wave frame indices as produced by
    /// the aligner; `allow_arbitrary_shift` permits the zero-length
    /// fix to use durations off the frame grid (leaf levels).
    pub fn adjust(
        &self,
        params: &AdjustParams,
        boundary_indices: &[usize],
        real: &AudioFeatures,
        text: &TextFile,
        allow_arbitrary_shift: bool,
    ) -> AdjustResult<SyncMapFragmentList> {
        let shift = self.config.mfcc.window_shift;
        let begin = TimeValue::from_frames(real.middle_begin(), shift);
        let end = TimeValue::from_frames(real.middle_end(), shift);
        let mut time_values = Vec::with_capacity(boundary_indices.len() + 2);
        time_values.push(begin);
        time_values.extend(
            boundary_indices
                .iter()
                .map(|&index| TimeValue::from_frames(index, shift)),
        );
        time_values.push(end);

        let mut list = self.intervals_to_fragment_list(text, &time_values)?;
        self.process_zero_length(&mut list, params, allow_arbitrary_shift)?;
        self.process_long_nonspeech(&mut list, params, real)?;

        tracing::debug!("Adjusting with algorithm '{}'", params.algorithm);
        match &params.algorithm {
            AdjustAlgorithm::Auto => {}
            AdjustAlgorithm::Offset(offset) => list.offset(*offset),
            AdjustAlgorithm::Percent(percent) => {
                let percent = Decimal::from(*percent);
                self.adjust_on_nonspeech(&mut list, real, |nsi| nsi.percent_value(percent));
            }
            AdjustAlgorithm::AfterCurrent(delay) => {
                let delay = (*delay).max(TimeValue::ZERO);
                self.adjust_on_nonspeech(&mut list, real, |nsi| {
                    (nsi.begin() + delay).min(nsi.end())
                });
            }
            AdjustAlgorithm::BeforeNext(delay) => {
                let delay = (*delay).max(TimeValue::ZERO);
                self.adjust_on_nonspeech(&mut list, real, |nsi| {
                    (nsi.end() - delay).max(nsi.begin())
                });
            }
            AdjustAlgorithm::Rate(max_rate) => self.apply_rate(&mut list, *max_rate, false),
            AdjustAlgorithm::RateAggressive(max_rate) => {
                self.apply_rate(&mut list, *max_rate, true)
            }
        }

        self.smooth(&mut list, real.audio_length(), &params.nonspeech_replacement);
        Ok(list)
    }

    /// Build a fragment list from at least four time values: the first
    /// interval is HEAD, the last is TAIL, and the ones in between are
    /// REGULAR fragments carrying the text in order.
    pub fn intervals_to_fragment_list(
        &self,
        text: &TextFile,
        time_values: &[TimeValue],
    ) -> AdjustResult<SyncMapFragmentList> {
        if time_values.len() < 4 {
            return Err(AdjustError::TooFewTimeValues(time_values.len()));
        }
        if text.len() != time_values.len() - 3 {
            return Err(AdjustError::FragmentCountMismatch {
                time_values: time_values.len(),
                fragments: text.len(),
            });
        }
        let begin = time_values[0];
        let end = time_values[time_values.len() - 1];
        let mut list = SyncMapFragmentList::new(begin, end)?;
        // HEAD and TAIL must carry (empty) text so that serializers
        // can render them when asked to.
        list.add(
            SyncMapFragment::new(
                TimeInterval::new(time_values[0], time_values[1])?,
                Some(TextFragment::new("HEAD", Vec::new())),
                FragmentType::Head,
            ),
            false,
        )?;
        for (i, fragment) in text.fragments().enumerate() {
            list.add(
                SyncMapFragment::new(
                    TimeInterval::new(time_values[i + 1], time_values[i + 2])?,
                    Some(fragment.clone()),
                    FragmentType::Regular,
                ),
                false,
            )?;
        }
        list.add(
            SyncMapFragment::new(
                TimeInterval::new(time_values[time_values.len() - 2], end)?,
                Some(TextFragment::new("TAIL", Vec::new())),
                FragmentType::Tail,
            ),
            false,
        )?;
        list.sort()?;
        Ok(list)
    }

    fn process_zero_length(
        &self,
        list: &mut SyncMapFragmentList,
        params: &AdjustParams,
        allow_arbitrary_shift: bool,
    ) -> AdjustResult<()> {
        if !params.no_zero {
            return Ok(());
        }
        let mut duration = self.config.boundary.no_zero_duration;
        if !allow_arbitrary_shift {
            // Snap up to the MFCC frame grid.
            duration = self.config.mfcc.window_shift.geq_multiple(duration);
        }
        tracing::debug!("Enforcing minimum fragment duration {}", duration);
        let max_index = list.len() - 1;
        list.fix_zero_length_fragments(duration, 1, max_index)?;
        if list.has_zero_length_fragments(1, max_index) {
            tracing::warn!("The fragment list still has fragments with zero length");
        }
        Ok(())
    }

    fn process_long_nonspeech(
        &self,
        list: &mut SyncMapFragmentList,
        params: &AdjustParams,
        real: &AudioFeatures,
    ) -> AdjustResult<()> {
        let Some(nonspeech_min) = params.nonspeech_min else {
            return Ok(());
        };
        let tolerance = self.config.boundary.nonspeech_tolerance;
        let long_intervals: Vec<TimeInterval> = real
            .time_intervals(false)
            .into_iter()
            .filter(|i| i.length() >= nonspeech_min)
            .collect();
        let max_index = list.len() - 1;
        let pairs: Vec<(TimeInterval, usize)> = list
            .fragments_ending_inside_nonspeech_intervals(&long_intervals, tolerance)
            .into_iter()
            .filter(|&(_, index)| index >= 1 && index < max_index)
            .collect();
        tracing::debug!("Injecting {} long nonspeech fragments", pairs.len());
        let lines = params.nonspeech_replacement.lines();
        list.inject_long_nonspeech_fragments(&pairs, &lines)?;
        Ok(())
    }

    /// Move each transition that falls inside a nonspeech interval to
    /// the point chosen by `new_time`.
    ///
    /// Candidate pairs are iterated once; when two consecutive
    /// boundaries fall into the same nonspeech interval, the pair
    /// finder drops that interval, so only unambiguous transitions
    /// move. The last boundary is never moved.
    fn adjust_on_nonspeech<F>(&self, list: &mut SyncMapFragmentList, real: &AudioFeatures, new_time: F)
    where
        F: Fn(&TimeInterval) -> TimeValue,
    {
        let nonspeech = real.time_intervals(false);
        let tolerance = self.config.boundary.nonspeech_tolerance;
        let pairs = list.fragments_ending_inside_nonspeech_intervals(&nonspeech, tolerance);
        for (nsi, index) in pairs {
            let value = new_time(&nsi);
            list.move_transition_point(index, value);
        }
    }

    fn apply_rate(&self, list: &mut SyncMapFragmentList, max_rate: Decimal, aggressive: bool) {
        let tolerance = Decimal::new(1, 3); // 0.001
        let regular_count = list.regular_fragments().count();
        if regular_count <= 1 {
            return;
        }
        let faster: Vec<usize> = list
            .regular_fragments()
            .filter(|(_, f)| f.rate().is_some_and(|r| r >= max_rate + tolerance))
            .map(|(i, _)| i)
            .collect();
        if faster.is_empty() {
            return;
        }
        tracing::warn!(
            "Some fragments have rate faster than the max rate: {:?}",
            faster
        );
        for index in faster {
            list.fix_fragment_rate(index, max_rate, aggressive);
        }
        let still_faster: Vec<usize> = list
            .regular_fragments()
            .filter(|(_, f)| f.rate().is_some_and(|r| r >= max_rate + tolerance))
            .map(|(i, _)| i)
            .collect();
        if !still_faster.is_empty() {
            tracing::warn!(
                "Some fragments still have rate faster than the max rate: {:?}",
                still_faster
            );
        }
    }

    /// Pin the list to the full audio extent and drop NONSPEECH
    /// fragments according to the replacement policy.
    fn smooth(
        &self,
        list: &mut SyncMapFragmentList,
        audio_length: TimeValue,
        replacement: &NonspeechReplacement,
    ) {
        list.widen(TimeValue::ZERO, audio_length);
        if let Some(first) = list.get_mut(0) {
            first.interval.set_begin(TimeValue::ZERO);
        }
        let last = list.len().saturating_sub(1);
        if let Some(fragment) = list.get_mut(last) {
            fragment.interval.set_end(audio_length);
        }
        match replacement {
            NonspeechReplacement::Remove => list.remove_nonspeech_fragments(false),
            NonspeechReplacement::Replace(_) => list.remove_nonspeech_fragments(true),
        }
    }
}
