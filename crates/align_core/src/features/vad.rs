//! Voice activity detection on the log-energy coefficient.
//!
//! A frame is speech iff its log-energy exceeds
//! `mean + threshold * (max - mean)` over the examined region. Short
//! nonspeech runs are suppressed, then speech runs are padded.

use crate::config::VadSettings;
use crate::timing::TimeValue;

/// Classify frames as speech/nonspeech from their log-energies.
///
/// `window_shift` converts the time-valued settings into frame counts.
pub fn compute_speech_mask(
    energies: &[f64],
    settings: &VadSettings,
    window_shift: TimeValue,
) -> Vec<bool> {
    if energies.is_empty() {
        return Vec::new();
    }
    let mean = energies.iter().sum::<f64>() / energies.len() as f64;
    let max = energies.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let cutoff = mean + settings.log_energy_threshold * (max - mean);
    let mut mask: Vec<bool> = energies.iter().map(|&e| e > cutoff).collect();

    let min_nonspeech = settings.min_nonspeech_length.to_frames(window_shift);
    if min_nonspeech > 1 {
        suppress_short_runs(&mut mask, false, min_nonspeech);
    }

    let before = settings.extend_speech_before.to_frames(window_shift);
    let after = settings.extend_speech_after.to_frames(window_shift);
    if before > 0 || after > 0 {
        extend_speech_runs(&mut mask, before, after);
    }

    mask
}

/// Half-open `(begin, end)` runs of frames with the given class.
pub fn mask_intervals(mask: &[bool], speech: bool) -> Vec<(usize, usize)> {
    let mut intervals = Vec::new();
    let mut run_begin = None;
    for (i, &is_speech) in mask.iter().enumerate() {
        if is_speech == speech {
            run_begin.get_or_insert(i);
        } else if let Some(begin) = run_begin.take() {
            intervals.push((begin, i));
        }
    }
    if let Some(begin) = run_begin {
        intervals.push((begin, mask.len()));
    }
    intervals
}

/// Reclassify runs of `class` shorter than `min_length` frames.
fn suppress_short_runs(mask: &mut [bool], class: bool, min_length: usize) {
    for (begin, end) in mask_intervals(mask, class) {
        if end - begin < min_length {
            for slot in &mut mask[begin..end] {
                *slot = !class;
            }
        }
    }
}

/// Pad every speech run by the given frame counts, clipped to the mask.
fn extend_speech_runs(mask: &mut [bool], before: usize, after: usize) {
    for (begin, end) in mask_intervals(mask, true) {
        let padded_begin = begin.saturating_sub(before);
        let padded_end = (end + after).min(mask.len());
        for slot in &mut mask[padded_begin..padded_end] {
            *slot = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tv(s: &str) -> TimeValue {
        s.parse().unwrap()
    }

    fn settings() -> VadSettings {
        VadSettings::default()
    }

    /// Energies with a clear quiet / loud / quiet shape.
    fn energies(quiet: usize, loud: usize, tail: usize) -> Vec<f64> {
        let mut e = vec![-10.0; quiet];
        e.extend(vec![5.0; loud]);
        e.extend(vec![-10.0; tail]);
        e
    }

    #[test]
    fn loud_frames_are_speech() {
        let e = energies(20, 30, 20);
        let mask = compute_speech_mask(&e, &settings(), tv("0.040"));
        assert_eq!(mask_intervals(&mask, true), vec![(20, 50)]);
        assert_eq!(mask_intervals(&mask, false), vec![(0, 20), (50, 70)]);
    }

    #[test]
    fn short_nonspeech_runs_are_suppressed() {
        // 0.500 s at 0.040 s shift = 12 frames minimum
        let mut e = energies(20, 10, 0);
        e.extend(vec![-10.0; 5]); // 5-frame micro-pause
        e.extend(vec![5.0; 10]);
        let mask = compute_speech_mask(&e, &settings(), tv("0.040"));
        // The pause is shorter than 12 frames, so one speech run remains.
        assert_eq!(mask_intervals(&mask, true), vec![(20, 45)]);
    }

    #[test]
    fn speech_extension_pads_and_clips() {
        let e = energies(20, 10, 20);
        let mut s = settings();
        s.extend_speech_before = tv("0.080"); // 2 frames
        s.extend_speech_after = tv("0.120"); // 3 frames
        let mask = compute_speech_mask(&e, &s, tv("0.040"));
        assert_eq!(mask_intervals(&mask, true), vec![(18, 33)]);
    }

    #[test]
    fn empty_input_yields_empty_mask() {
        assert!(compute_speech_mask(&[], &settings(), tv("0.040")).is_empty());
    }
}
