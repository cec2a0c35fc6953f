//! An ordered list of sync map fragments with overlap invariants.
//!
//! Constraints: every fragment interval lies within the list bounds,
//! the list is kept sorted, and any two fragments may only touch at
//! endpoints (interior overlap is forbidden).

use rust_decimal::Decimal;
use thiserror::Error;

use crate::text::TextFragment;
use crate::timing::{RelativePosition, TimeInterval, TimeValue, TimingError};

use super::fragment::{FragmentType, SyncMapFragment};

/// Errors raised by fragment list operations.
#[derive(Error, Debug)]
pub enum FragmentListError {
    /// The list begin is negative.
    #[error("list begin is negative")]
    NegativeBegin,

    /// The list begin is after its end.
    #[error("list begin is after its end")]
    BeginAfterEnd,

    /// A fragment interval lies outside the list bounds.
    #[error("fragment interval {interval} outside list bounds [{begin}, {end}]")]
    OutOfBounds {
        interval: TimeInterval,
        begin: TimeValue,
        end: TimeValue,
    },

    /// A fragment overlaps another in a forbidden configuration.
    #[error("fragment overlaps an existing fragment in a forbidden way")]
    ForbiddenOverlap,

    /// Sorted insertion was requested on a list not guaranteed sorted.
    #[error("cannot insert in order into a list that is not guaranteed sorted")]
    NotSorted,

    /// A fragment index is out of range.
    #[error("invalid fragment index {0}")]
    InvalidIndex(usize),

    /// An interval operation failed.
    #[error(transparent)]
    Timing(#[from] TimingError),
}

/// Result type for fragment list operations.
pub type FragmentListResult<T> = Result<T, FragmentListError>;

/// A sorted list of sync map fragments within fixed time bounds.
#[derive(Debug, Clone)]
pub struct SyncMapFragmentList {
    begin: TimeValue,
    end: TimeValue,
    fragments: Vec<SyncMapFragment>,
    sorted: bool,
}

impl SyncMapFragmentList {
    /// Pair relative positions that keep a fragment list valid: only
    /// point-touch at endpoints and proper separation are allowed.
    pub const ALLOWED_POSITIONS: [RelativePosition; 15] = [
        RelativePosition::PpL,
        RelativePosition::PpC,
        RelativePosition::PpG,
        RelativePosition::PiLl,
        RelativePosition::PiLc,
        RelativePosition::PiCg,
        RelativePosition::PiGg,
        RelativePosition::IpL,
        RelativePosition::IpB,
        RelativePosition::IpE,
        RelativePosition::IpG,
        RelativePosition::IiLl,
        RelativePosition::IiLb,
        RelativePosition::IiEg,
        RelativePosition::IiGg,
    ];

    /// Create an empty list spanning `[begin, end]`.
    pub fn new(begin: TimeValue, end: TimeValue) -> FragmentListResult<Self> {
        if begin.is_negative() {
            return Err(FragmentListError::NegativeBegin);
        }
        if begin > end {
            return Err(FragmentListError::BeginAfterEnd);
        }
        Ok(Self {
            begin,
            end,
            fragments: Vec::new(),
            sorted: true,
        })
    }

    /// The list begin time.
    pub fn begin(&self) -> TimeValue {
        self.begin
    }

    /// The list end time.
    pub fn end(&self) -> TimeValue {
        self.end
    }

    /// Number of fragments.
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Whether the list holds no fragments.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Whether the list is known to be sorted. `false` after an
    /// unsorted `add` until the next successful `sort`.
    pub fn is_guaranteed_sorted(&self) -> bool {
        self.sorted
    }

    /// The fragments, in list order.
    pub fn fragments(&self) -> &[SyncMapFragment] {
        &self.fragments
    }

    /// Fragment at `index`.
    pub fn get(&self, index: usize) -> Option<&SyncMapFragment> {
        self.fragments.get(index)
    }

    /// Mutable fragment at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut SyncMapFragment> {
        self.fragments.get_mut(index)
    }

    /// Indices and fragments of type REGULAR.
    pub fn regular_fragments(&self) -> impl Iterator<Item = (usize, &SyncMapFragment)> {
        self.fragments
            .iter()
            .enumerate()
            .filter(|(_, f)| f.fragment_type == FragmentType::Regular)
    }

    /// Indices and fragments of type NONSPEECH.
    pub fn nonspeech_fragments(&self) -> impl Iterator<Item = (usize, &SyncMapFragment)> {
        self.fragments
            .iter()
            .enumerate()
            .filter(|(_, f)| f.fragment_type == FragmentType::Nonspeech)
    }

    /// Widen the list bounds to cover at least `[begin, end]`.
    pub fn widen(&mut self, begin: TimeValue, end: TimeValue) {
        self.begin = self.begin.min(begin);
        self.end = self.end.max(end);
    }

    fn check_bounds(&self, fragment: &SyncMapFragment) -> FragmentListResult<()> {
        if fragment.interval.begin() < self.begin || fragment.interval.end() > self.end {
            return Err(FragmentListError::OutOfBounds {
                interval: fragment.interval,
                begin: self.begin,
                end: self.end,
            });
        }
        Ok(())
    }

    fn is_allowed(position: RelativePosition) -> bool {
        Self::ALLOWED_POSITIONS.contains(&position)
    }

    /// Add a fragment.
    ///
    /// With `sort` set, the fragment is inserted at its sorted position
    /// and checked against every existing fragment; without it, the
    /// fragment is appended and the sorted flag is invalidated until
    /// [`SyncMapFragmentList::sort`] runs.
    pub fn add(&mut self, fragment: SyncMapFragment, sort: bool) -> FragmentListResult<()> {
        self.check_bounds(&fragment)?;
        if sort {
            if !self.sorted {
                return Err(FragmentListError::NotSorted);
            }
            for existing in &self.fragments {
                if !Self::is_allowed(existing.interval.relative_position_of(&fragment.interval)) {
                    return Err(FragmentListError::ForbiddenOverlap);
                }
            }
            let position = self.fragments.partition_point(|f| f <= &fragment);
            self.fragments.insert(position, fragment);
        } else {
            self.fragments.push(fragment);
            self.sorted = false;
        }
        Ok(())
    }

    /// Sort the fragments and re-verify the overlap invariant.
    pub fn sort(&mut self) -> FragmentListResult<()> {
        if self.sorted {
            return Ok(());
        }
        self.fragments.sort();
        for pair in self.fragments.windows(2) {
            if !Self::is_allowed(pair[0].interval.relative_position_of(&pair[1].interval)) {
                tracing::debug!(
                    "Found overlapping fragments {} and {}",
                    pair[0].interval,
                    pair[1].interval
                );
                return Err(FragmentListError::ForbiddenOverlap);
            }
        }
        self.sorted = true;
        Ok(())
    }

    /// Remove the fragments at the given indices, preserving order.
    pub fn remove(&mut self, indices: &[usize]) -> FragmentListResult<()> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.len()) {
            return Err(FragmentListError::InvalidIndex(bad));
        }
        let mut sorted_indices = indices.to_vec();
        sorted_indices.sort_unstable();
        sorted_indices.dedup();
        let mut index = 0usize;
        let mut to_remove = sorted_indices.iter().peekable();
        self.fragments.retain(|_| {
            let current = index;
            index += 1;
            if to_remove.peek().is_some_and(|&&i| i == current) {
                to_remove.next();
                false
            } else {
                true
            }
        });
        Ok(())
    }

    /// Remove NONSPEECH fragments.
    ///
    /// With `zero_length_only` set, only zero-length ones are removed
    /// and the surviving NONSPEECH fragments become REGULAR.
    pub fn remove_nonspeech_fragments(&mut self, zero_length_only: bool) {
        let indices: Vec<usize> = self
            .nonspeech_fragments()
            .filter(|(_, f)| !zero_length_only || f.has_zero_length())
            .map(|(i, _)| i)
            .collect();
        // Indices come from the list itself, so removal cannot fail.
        let _ = self.remove(&indices);
        if zero_length_only {
            for fragment in &mut self.fragments {
                if fragment.fragment_type == FragmentType::Nonspeech {
                    fragment.fragment_type = FragmentType::Regular;
                }
            }
        }
    }

    /// Translate every interval by `offset`, clipping into the list
    /// bounds.
    pub fn offset(&mut self, offset: TimeValue) {
        tracing::debug!("Applying offset {} to all fragments", offset);
        let bounds = TimeInterval::from_ordered(self.begin, self.end);
        for fragment in &mut self.fragments {
            fragment.interval.offset(offset, false, Some(&bounds));
        }
    }

    /// Whether some fragment in `[min_index, max_index)` has zero
    /// length.
    pub fn has_zero_length_fragments(&self, min_index: usize, max_index: usize) -> bool {
        self.fragments[min_index.min(self.len())..max_index.min(self.len())]
            .iter()
            .any(SyncMapFragment::has_zero_length)
    }

    /// Whether all consecutive fragments in `[min_index, max_index)`
    /// are adjacent (no gaps).
    pub fn has_adjacent_fragments_only(&self, min_index: usize, max_index: usize) -> bool {
        self.fragments[min_index.min(self.len())..max_index.min(self.len())]
            .windows(2)
            .all(|pair| pair[0].interval.is_adjacent_before(&pair[1].interval))
    }

    /// Move the boundary between fragments `index` and `index + 1` to
    /// `value`.
    ///
    /// Silently does nothing unless both fragments are adjacent
    /// non-zero intervals, `index + 1` is not the last fragment, and
    /// `value` does not pass the next fragment's end.
    pub fn move_transition_point(&mut self, index: usize, value: TimeValue) {
        if self.len() < 3 || index > self.len() - 3 {
            return;
        }
        let current = self.fragments[index].interval;
        let next = self.fragments[index + 1].interval;
        if value > next.end() || value < current.begin() {
            return;
        }
        if !current.is_non_zero_before_non_zero(&next) {
            return;
        }
        self.fragments[index].interval.set_end(value);
        self.fragments[index + 1].interval.set_begin(value);
    }

    /// Find `(nonspeech interval, fragment index)` pairs such that the
    /// tolerance-shadowed nonspeech interval contains the end of
    /// exactly one fragment, and no fragment entirely.
    ///
    /// A single deterministic two-cursor sweep over both sequences;
    /// the last fragment is never returned.
    pub fn fragments_ending_inside_nonspeech_intervals(
        &self,
        nonspeech_intervals: &[TimeInterval],
        tolerance: TimeValue,
    ) -> Vec<(TimeInterval, usize)> {
        let mut counters: Vec<(TimeInterval, Option<Vec<usize>>)> = nonspeech_intervals
            .iter()
            .map(|&n| (n, Some(Vec::new())))
            .collect();
        let mut nsi_index = 0;
        let mut frag_index = 0;
        while nsi_index < nonspeech_intervals.len() && frag_index + 1 < self.len() {
            let nsi = nonspeech_intervals[nsi_index];
            if nsi.end() > self.end {
                break;
            }
            let shadow = nsi.shadow(tolerance);
            let fragment = &self.fragments[frag_index];
            if fragment.is_head_or_tail() {
                frag_index += 1;
                continue;
            }
            if shadow.contains(fragment.end()) {
                if shadow.contains(fragment.begin()) {
                    // The shadow swallows the whole fragment: that
                    // makes the nonspeech interval ambiguous.
                    counters[nsi_index].1 = None;
                    nsi_index += 1;
                    frag_index += 1;
                } else {
                    if let Some(hits) = &mut counters[nsi_index].1 {
                        hits.push(frag_index);
                    }
                    frag_index += 1;
                }
            } else if shadow.begin() > fragment.end() {
                frag_index += 1;
            } else {
                nsi_index += 1;
            }
        }
        counters
            .into_iter()
            .filter_map(|(nsi, hits)| match hits.as_deref() {
                Some([single]) => Some((nsi, *single)),
                _ => None,
            })
            .collect()
    }

    /// Inject NONSPEECH fragments for the given pairs, which must be
    /// consistent (as produced by
    /// [`SyncMapFragmentList::fragments_ending_inside_nonspeech_intervals`]).
    ///
    /// `lines` is the text carried by the injected fragments; empty
    /// when the nonspeech text is to be removed by the smoothing pass.
    pub fn inject_long_nonspeech_fragments(
        &mut self,
        pairs: &[(TimeInterval, usize)],
        lines: &[String],
    ) -> FragmentListResult<()> {
        // First pass: make room for the nonspeech intervals.
        for &(nsi, index) in pairs {
            self.fragments[index].interval.set_end(nsi.begin());
            self.fragments[index + 1].interval.set_begin(nsi.end());
        }
        // Second pass: append the nonspeech fragments, then sort.
        for (i, &(nsi, _)) in pairs.iter().enumerate() {
            let identifier = format!("n{:06}", i + 1);
            let mut text = TextFragment::new(identifier, lines.to_vec());
            text.filtered_lines = lines.to_vec();
            self.add(
                SyncMapFragment::new(nsi, Some(text), FragmentType::Nonspeech),
                false,
            )?;
        }
        self.sort()
    }

    /// Enlarge zero-length fragments in `[min_index, max_index)` to
    /// `duration`, reclaiming time from the following fragments or
    /// pushing them towards the list end.
    ///
    /// Fragments that cannot be fixed are left in place with a
    /// warning. Adjacency with the fragments outside the window is
    /// restored if it held before the fix.
    pub fn fix_zero_length_fragments(
        &mut self,
        duration: TimeValue,
        min_index: usize,
        max_index: usize,
    ) -> FragmentListResult<()> {
        if max_index > self.len() {
            return Err(FragmentListError::InvalidIndex(max_index));
        }
        if self.is_empty() || min_index >= max_index {
            return Ok(());
        }
        if !self.has_adjacent_fragments_only(min_index, max_index) {
            tracing::warn!("There are non adjacent fragments: aborting zero-length fix");
            return Ok(());
        }

        let first_was_adjacent = min_index > 0
            && self.fragments[min_index - 1]
                .interval
                .is_adjacent_before(&self.fragments[min_index].interval);
        let last_was_adjacent = self.len() > 1
            && max_index < self.len()
            && self.fragments[max_index - 1]
                .interval
                .is_adjacent_before(&self.fragments[max_index].interval);

        enum Move {
            Enlarge(TimeValue),
            Shift,
        }

        let mut i = min_index;
        while i < max_index {
            if self.fragments[i].has_zero_length() {
                let mut moves: Vec<(usize, Move)> = vec![(i, Move::Enlarge(duration))];
                let mut slack = duration;
                let mut j = i + 1;
                while j < max_index && self.fragments[j].interval.length() < slack {
                    if self.fragments[j].has_zero_length() {
                        moves.push((j, Move::Enlarge(duration)));
                        slack += duration;
                    } else {
                        moves.push((j, Move::Shift));
                    }
                    j += 1;
                }
                let mut current_time = None;
                if j == max_index {
                    let pushed_end = self.fragments[j - 1].interval.end() + slack;
                    if pushed_end <= self.end {
                        current_time = Some(pushed_end);
                    }
                } else {
                    self.fragments[j].interval.shrink(slack, true)?;
                    current_time = Some(self.fragments[j].interval.begin());
                }
                if let Some(mut time) = current_time {
                    for (index, move_kind) in moves.iter().rev() {
                        let interval = &mut self.fragments[*index].interval;
                        interval.move_end_at(time)?;
                        if let Move::Enlarge(amount) = move_kind {
                            interval.enlarge(*amount, true)?;
                        }
                        time = interval.begin();
                    }
                } else {
                    tracing::warn!(
                        "Unable to fix zero-length fragment {} ({})",
                        i,
                        self.fragments[i].interval
                    );
                }
                i = j.saturating_sub(1);
            }
            i += 1;
        }

        if first_was_adjacent {
            let previous_end = self.fragments[min_index - 1].interval.end();
            if self.fragments[min_index].begin() != previous_end {
                self.fragments[min_index].interval.set_begin(previous_end);
            }
        }
        if last_was_adjacent {
            let previous_end = self.fragments[max_index - 1].interval.end();
            if self.fragments[max_index].begin() != previous_end {
                self.fragments[max_index].interval.set_begin(previous_end);
            }
        }
        Ok(())
    }

    /// Try to bring fragment `index` within `max_rate` by stealing
    /// slack from its previous neighbour, and (if `aggressive`) from
    /// its next neighbour as well.
    ///
    /// Returns whether the rate constraint is now satisfied.
    pub fn fix_fragment_rate(
        &mut self,
        index: usize,
        max_rate: Decimal,
        aggressive: bool,
    ) -> bool {
        if index > 0 && self.fix_pair(index, index - 1, max_rate) {
            return true;
        }
        if aggressive {
            return self.fix_pair(index, index + 1, max_rate);
        }
        false
    }

    fn fix_pair(&mut self, current_index: usize, donor_index: usize, max_rate: Decimal) -> bool {
        if current_index >= self.len() || donor_index >= self.len() {
            return false;
        }
        if current_index.abs_diff(donor_index) != 1 {
            return false;
        }
        let donor_is_previous = donor_index < current_index;
        let current = &self.fragments[current_index];
        let donor = &self.fragments[donor_index];
        if current.rate().is_some_and(|rate| rate <= max_rate) {
            return true;
        }
        if donor_is_previous {
            if !donor.interval.is_non_zero_before_non_zero(&current.interval) {
                return false;
            }
        } else if !current.interval.is_non_zero_before_non_zero(&donor.interval) {
            return false;
        }
        let current_lack = current.rate_lack(max_rate);
        let donor_slack = donor.rate_slack(max_rate);
        if donor_slack <= TimeValue::ZERO {
            return false;
        }
        let effective_slack = current_lack.min(donor_slack);
        if donor_is_previous {
            let target = self.fragments[donor_index].end() - effective_slack;
            self.move_transition_point(donor_index, target);
        } else {
            let target = self.fragments[current_index].end() + effective_slack;
            self.move_transition_point(current_index, target);
        }
        effective_slack == current_lack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tv(s: &str) -> TimeValue {
        s.parse().unwrap()
    }

    fn interval(b: &str, e: &str) -> TimeInterval {
        TimeInterval::new(tv(b), tv(e)).unwrap()
    }

    fn regular(b: &str, e: &str) -> SyncMapFragment {
        SyncMapFragment::new(interval(b, e), None, FragmentType::Regular)
    }

    fn regular_text(b: &str, e: &str, text: &str) -> SyncMapFragment {
        SyncMapFragment::new(
            interval(b, e),
            Some(TextFragment::new("f", vec![text.to_string()])),
            FragmentType::Regular,
        )
    }

    fn typed(b: &str, e: &str, fragment_type: FragmentType) -> SyncMapFragment {
        SyncMapFragment::new(interval(b, e), None, fragment_type)
    }

    fn list(b: &str, e: &str) -> SyncMapFragmentList {
        SyncMapFragmentList::new(tv(b), tv(e)).unwrap()
    }

    #[test]
    fn sorted_add_keeps_order() {
        let mut l = list("0.000", "10.000");
        l.add(regular("1.000", "1.000"), true).unwrap();
        l.add(regular("0.500", "0.500"), true).unwrap();
        l.add(regular("1.000", "1.000"), true).unwrap();
        let begins: Vec<TimeValue> = l.fragments().iter().map(|f| f.begin()).collect();
        assert_eq!(begins, vec![tv("0.500"), tv("1.000"), tv("1.000")]);
    }

    #[test]
    fn add_rejects_interior_overlap() {
        let mut l = list("0.000", "10.000");
        l.add(regular("1.500", "1.500"), true).unwrap();
        let err = l.add(regular("1.000", "2.000"), true).unwrap_err();
        assert!(matches!(err, FragmentListError::ForbiddenOverlap));
    }

    #[test]
    fn add_rejects_out_of_bounds() {
        let mut l = list("1.000", "2.000");
        let err = l.add(regular("0.000", "1.500"), true).unwrap_err();
        assert!(matches!(err, FragmentListError::OutOfBounds { .. }));
    }

    #[test]
    fn unsorted_add_requires_sort() {
        let mut l = list("0.000", "10.000");
        l.add(regular("2.000", "3.000"), false).unwrap();
        assert!(!l.is_guaranteed_sorted());
        let err = l.add(regular("0.000", "1.000"), true).unwrap_err();
        assert!(matches!(err, FragmentListError::NotSorted));
        l.sort().unwrap();
        assert!(l.is_guaranteed_sorted());
        l.add(regular("0.000", "1.000"), true).unwrap();
        assert_eq!(l.fragments()[0].begin(), tv("0.000"));
    }

    #[test]
    fn sort_detects_forbidden_overlap() {
        let mut l = list("0.000", "10.000");
        l.add(regular("0.000", "2.000"), false).unwrap();
        l.add(regular("1.000", "3.000"), false).unwrap();
        assert!(matches!(
            l.sort(),
            Err(FragmentListError::ForbiddenOverlap)
        ));
    }

    #[test]
    fn whitelist_holds_for_all_pairs_after_adds() {
        let mut l = list("0.000", "10.000");
        for (b, e) in [
            ("0.000", "1.000"),
            ("1.000", "2.000"),
            ("2.000", "2.000"),
            ("2.000", "3.000"),
            ("5.000", "6.000"),
        ] {
            l.add(regular(b, e), true).unwrap();
        }
        for i in 0..l.len() {
            for j in (i + 1)..l.len() {
                let position = l.fragments()[i]
                    .interval
                    .relative_position_of(&l.fragments()[j].interval);
                assert!(
                    SyncMapFragmentList::ALLOWED_POSITIONS.contains(&position),
                    "pair {i},{j} got {position:?}"
                );
            }
        }
    }

    #[test]
    fn offset_round_trips_and_clips() {
        let mut l = list("0.000", "10.000");
        l.add(regular("1.000", "2.000"), true).unwrap();
        l.add(regular("2.000", "3.000"), true).unwrap();
        l.offset(tv("0.500"));
        assert_eq!(l.fragments()[0].interval, interval("1.500", "2.500"));
        l.offset(tv("-0.500"));
        assert_eq!(l.fragments()[0].interval, interval("1.000", "2.000"));
        // Every endpoint stays within the list bounds after clipping.
        l.offset(tv("8.500"));
        for fragment in l.fragments() {
            assert!(fragment.begin() >= l.begin() && fragment.end() <= l.end());
        }
    }

    #[test]
    fn remove_preserves_order() {
        let mut l = list("0.000", "10.000");
        for (b, e) in [("0.000", "1.000"), ("1.000", "2.000"), ("2.000", "3.000")] {
            l.add(regular(b, e), true).unwrap();
        }
        l.remove(&[1]).unwrap();
        assert_eq!(l.len(), 2);
        assert_eq!(l.fragments()[1].begin(), tv("2.000"));
        assert!(matches!(
            l.remove(&[5]),
            Err(FragmentListError::InvalidIndex(5))
        ));
    }

    #[test]
    fn remove_nonspeech_variants() {
        let mut build = || {
            let mut l = list("0.000", "10.000");
            l.add(typed("0.000", "1.000", FragmentType::Regular), true)
                .unwrap();
            l.add(typed("1.000", "1.000", FragmentType::Nonspeech), true)
                .unwrap();
            l.add(typed("1.000", "2.000", FragmentType::Nonspeech), true)
                .unwrap();
            l
        };
        let mut all = build();
        all.remove_nonspeech_fragments(false);
        assert!(all.nonspeech_fragments().next().is_none());
        assert_eq!(all.len(), 1);

        let mut zero_only = build();
        zero_only.remove_nonspeech_fragments(true);
        assert_eq!(zero_only.len(), 2);
        assert!(zero_only.nonspeech_fragments().next().is_none());
        assert!(zero_only.fragments()[1].is_regular());
    }

    #[test]
    fn move_transition_point_moves_shared_boundary() {
        let mut l = list("0.000", "10.000");
        for (b, e) in [("0.000", "1.000"), ("1.000", "2.000"), ("2.000", "3.000")] {
            l.add(regular(b, e), true).unwrap();
        }
        l.move_transition_point(0, tv("1.500"));
        assert_eq!(l.fragments()[0].interval, interval("0.000", "1.500"));
        assert_eq!(l.fragments()[1].interval, interval("1.500", "2.000"));
        // Beyond the next fragment's end: no-op.
        l.move_transition_point(0, tv("2.500"));
        assert_eq!(l.fragments()[0].interval, interval("0.000", "1.500"));
        // Last transition is never moved.
        l.move_transition_point(1, tv("2.500"));
        assert_eq!(l.fragments()[2].interval, interval("2.000", "3.000"));
    }

    #[test]
    fn zero_length_fix_matches_expected_layout() {
        let mut l = list("0.000", "2.000");
        for (b, e) in [
            ("0.000", "1.000"),
            ("1.000", "1.000"),
            ("1.000", "1.000"),
            ("1.000", "2.000"),
        ] {
            l.add(regular(b, e), false).unwrap();
        }
        l.sort().unwrap();
        l.fix_zero_length_fragments(tv("0.001"), 0, 4).unwrap();
        let intervals: Vec<TimeInterval> = l.fragments().iter().map(|f| f.interval).collect();
        assert_eq!(
            intervals,
            vec![
                interval("0.000", "1.000"),
                interval("1.000", "1.001"),
                interval("1.001", "1.002"),
                interval("1.002", "2.000"),
            ]
        );
    }

    #[test]
    fn zero_length_fix_pushes_towards_list_end() {
        let mut l = list("0.000", "3.000");
        for (b, e) in [("0.000", "2.000"), ("2.000", "2.000")] {
            l.add(regular(b, e), true).unwrap();
        }
        l.fix_zero_length_fragments(tv("0.040"), 0, 2).unwrap();
        assert_eq!(l.fragments()[1].interval, interval("2.000", "2.040"));
    }

    #[test]
    fn zero_length_fix_respects_window_and_adjacency() {
        let mut l = list("0.000", "3.000");
        for (b, e) in [
            ("0.000", "1.000"),
            ("1.000", "1.000"),
            ("1.000", "2.000"),
            ("2.000", "3.000"),
        ] {
            l.add(regular(b, e), false).unwrap();
        }
        l.sort().unwrap();
        l.fix_zero_length_fragments(tv("0.100"), 1, 3).unwrap();
        // The window [1, 3) is fixed and the fragment outside it
        // stays adjacent to the last fixed one.
        assert_eq!(l.fragments()[1].interval, interval("1.000", "1.100"));
        assert_eq!(l.fragments()[2].interval, interval("1.100", "2.000"));
        assert_eq!(l.fragments()[3].interval, interval("2.000", "3.000"));
        assert!(l.has_adjacent_fragments_only(0, 4));
    }

    #[test]
    fn sweep_finds_single_fragment_endings() {
        let mut l = list("0.000", "10.000");
        for (b, e) in [
            ("0.000", "2.000"),
            ("2.000", "4.000"),
            ("4.000", "6.000"),
            ("6.000", "10.000"),
        ] {
            l.add(regular(b, e), true).unwrap();
        }
        let nonspeech = [interval("1.900", "2.500"), interval("5.900", "6.300")];
        let pairs = l.fragments_ending_inside_nonspeech_intervals(&nonspeech, tv("0.080"));
        assert_eq!(pairs, vec![(nonspeech[0], 0), (nonspeech[1], 2)]);
    }

    #[test]
    fn sweep_invalidates_swallowed_fragments() {
        let mut l = list("0.000", "10.000");
        for (b, e) in [
            ("0.000", "2.000"),
            ("2.000", "2.100"),
            ("2.100", "4.000"),
            ("4.000", "10.000"),
        ] {
            l.add(regular(b, e), true).unwrap();
        }
        // The shadow of this interval swallows fragment 1 entirely.
        let nonspeech = [interval("1.950", "2.300")];
        let pairs = l.fragments_ending_inside_nonspeech_intervals(&nonspeech, tv("0.080"));
        assert!(pairs.is_empty());
    }

    #[test]
    fn sweep_never_returns_the_last_fragment() {
        let mut l = list("0.000", "10.000");
        l.add(regular("0.000", "9.000"), true).unwrap();
        l.add(regular("9.000", "10.000"), true).unwrap();
        let nonspeech = [interval("8.900", "9.400")];
        let pairs = l.fragments_ending_inside_nonspeech_intervals(&nonspeech, tv("0.080"));
        assert_eq!(pairs, vec![(nonspeech[0], 0)]);
        let nonspeech_tail = [interval("9.900", "10.000")];
        let pairs = l.fragments_ending_inside_nonspeech_intervals(&nonspeech_tail, tv("0.080"));
        assert!(pairs.is_empty());
    }

    #[test]
    fn inject_splits_and_sorts() {
        let mut l = list("0.000", "10.000");
        for (b, e) in [("0.000", "2.000"), ("2.000", "4.000"), ("4.000", "10.000")] {
            l.add(regular(b, e), true).unwrap();
        }
        let nsi = interval("1.900", "2.500");
        l.inject_long_nonspeech_fragments(&[(nsi, 0)], &[]).unwrap();
        assert_eq!(l.len(), 4);
        assert_eq!(l.fragments()[0].interval, interval("0.000", "1.900"));
        assert_eq!(l.fragments()[1].interval, nsi);
        assert_eq!(l.fragments()[1].fragment_type, FragmentType::Nonspeech);
        assert_eq!(l.fragments()[2].interval, interval("2.500", "4.000"));
        assert!(l.is_guaranteed_sorted());
    }

    #[test]
    fn rate_fix_steals_from_previous_only_by_default() {
        // A is too fast (10 chars / 1 s at max 5); B is slow.
        let mut l = list("0.000", "3.000");
        l.add(regular_text("0.000", "1.000", "ten chars."), true)
            .unwrap();
        l.add(regular_text("1.000", "3.000", "x"), true).unwrap();
        // Sentinel so the transition between 0 and 1 may move.
        l.add(typed("3.000", "3.000", FragmentType::Tail), true)
            .unwrap();
        let fixed = l.fix_fragment_rate(1, Decimal::from(5u64), false);
        // Fragment 1 is not too fast, nothing to do.
        assert!(fixed);

        // Fixing fragment 0: steal = min(lack 1.0, donor slack 1.8),
        // so the transition moves to 2.000 and the rate drops to 5.
        let fixed = l.fix_fragment_rate(0, Decimal::from(5u64), true);
        assert!(fixed);
        assert_eq!(l.fragments()[0].interval, interval("0.000", "2.000"));
        assert_eq!(l.fragments()[1].interval, interval("2.000", "3.000"));
    }

    #[test]
    fn non_aggressive_fix_never_touches_the_next_fragment() {
        let mut l = list("0.000", "4.000");
        l.add(typed("0.000", "1.000", FragmentType::Head), true)
            .unwrap();
        l.add(regular_text("1.000", "2.000", "ten chars."), true)
            .unwrap();
        l.add(regular_text("2.000", "3.000", "x"), true).unwrap();
        l.add(typed("3.000", "4.000", FragmentType::Tail), true)
            .unwrap();
        let next_before = l.fragments()[2].interval;
        // The HEAD donor has no slack, and aggressive is off.
        let fixed = l.fix_fragment_rate(1, Decimal::from(5u64), false);
        assert!(!fixed);
        assert_eq!(l.fragments()[2].interval, next_before);
    }
}
