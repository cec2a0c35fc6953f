//! Dynamic time warping between two MFCC matrices.
//!
//! Frame distance is the cosine distance over coefficients 1.., the
//! log-energy coefficient being discarded. Two variants exist: the
//! exact `O(n*m)` algorithm, and a Sakoe-Chiba band restricted to a
//! diagonal stripe of `delta` columns, `O(n*delta)`.

use serde::{Deserialize, Serialize};

use crate::config::RuntimeConfig;
use crate::features::AudioFeatures;
use crate::synth::Anchor;

/// DTW algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtwVariant {
    /// Classical full-matrix DTW.
    Exact,
    /// Sakoe-Chiba band heuristic.
    #[default]
    Stripe,
}

impl std::fmt::Display for DtwVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DtwVariant::Exact => write!(f, "exact"),
            DtwVariant::Stripe => write!(f, "stripe"),
        }
    }
}

/// Aligns a real wave against a synthesized wave.
///
/// Both waves are consumed through their middle regions (masked down
/// to speech frames when `mask_nonspeech` is on); the returned indices
/// are always re-expressed with respect to the full real wave.
pub struct DtwAligner<'a> {
    real: &'a AudioFeatures,
    synth: &'a AudioFeatures,
    config: &'a RuntimeConfig,
}

impl<'a> DtwAligner<'a> {
    /// Create an aligner over the two waves.
    pub fn new(
        real: &'a AudioFeatures,
        synth: &'a AudioFeatures,
        config: &'a RuntimeConfig,
    ) -> Self {
        Self {
            real,
            synth,
            config,
        }
    }

    fn masking(&self) -> bool {
        self.config.mfcc.mask_nonspeech
    }

    /// Band width in frames.
    fn delta(&self) -> usize {
        let margin = self.config.dtw.margin;
        let shift = self.config.mfcc.window_shift;
        (margin * rust_decimal::Decimal::from(2u64)).to_frames(shift)
    }

    /// Compute the min-cost warping path between the two middle
    /// regions, as `(real_frame, synth_frame)` pairs with respect to
    /// the full waves.
    ///
    /// Returns `None` if either side is empty (possibly after
    /// masking).
    pub fn compute_path(&self) -> Option<Vec<(usize, usize)>> {
        let (real_mfcc, synth_mfcc, real_map, synth_map) = self.select_inputs();
        let n = real_mfcc.len();
        let m = synth_mfcc.len();
        if n == 0 || m == 0 {
            tracing::debug!("Empty MFCC on one side (n {n}, m {m}), no path");
            return None;
        }
        let delta = self.delta();
        let raw_path = if self.config.dtw.algorithm == DtwVariant::Exact || delta >= m {
            tracing::debug!("Computing path with EXACT algorithm (n {n}, m {m})");
            let acm = accumulated_cost_matrix(&real_mfcc, &synth_mfcc);
            exact_best_path(&acm)
        } else {
            tracing::debug!("Computing path with STRIPE algorithm (n {n}, m {m}, delta {delta})");
            stripe_best_path(&real_mfcc, &synth_mfcc, delta)
        };

        let head = self.real.middle_begin();
        let path = raw_path
            .into_iter()
            .map(|(ri, si)| {
                let real_index = match &real_map {
                    Some(map) => map[ri] + head,
                    None => ri + head,
                };
                let synth_index = match &synth_map {
                    Some(map) => map[si] + self.synth.middle_begin(),
                    None => si + self.synth.middle_begin(),
                };
                (real_index, synth_index)
            })
            .collect();
        Some(path)
    }

    /// Project synthesized-fragment anchors onto real-wave frame
    /// indices.
    ///
    /// For `k` anchors the result has `k + 1` monotonic non-decreasing
    /// entries: the real middle begin, the projected transition for
    /// each anchor after the first, and the real tail begin. When no
    /// path can be computed, equi-spaced boundaries are generated.
    pub fn compute_boundaries(&self, anchors: &[Anchor]) -> Vec<usize> {
        let begin = self.real.middle_begin();
        let end = self.real.middle_end();
        let Some(path) = self.compute_path() else {
            tracing::debug!("No path available, generating equi-spaced boundaries");
            let n = anchors.len().max(1);
            let step = (end - begin) as f64 / n as f64;
            let mut boundaries: Vec<usize> = (0..anchors.len())
                .map(|i| begin + (i as f64 * step) as usize)
                .collect();
            boundaries.push(end);
            return boundaries;
        };

        let anchor_positions = self.anchor_frame_positions(anchors);
        let synth_indices: Vec<usize> = path.iter().map(|&(_, si)| si).collect();
        let mut boundaries = Vec::with_capacity(anchors.len() + 1);
        for (i, &position) in anchor_positions.iter().enumerate() {
            if i == 0 {
                // The first fragment always starts where the middle does.
                boundaries.push(begin);
                continue;
            }
            // Right-sided search puts the split at the very beginning
            // of the next fragment.
            let step = synth_indices
                .partition_point(|&si| (si as f64) <= position)
                .min(synth_indices.len() - 1);
            boundaries.push(path[step].0);
        }
        boundaries.push(end);
        tracing::debug!(
            "Computed {} boundary indices for {} anchors",
            boundaries.len(),
            anchors.len()
        );
        boundaries
    }

    /// Convert anchor begin times to (possibly fractional) synthetic
    /// frame positions.
    fn anchor_frame_positions(&self, anchors: &[Anchor]) -> Vec<f64> {
        let shift = self.config.mfcc.window_shift;
        let sample_rate = self.config.audio.sample_rate;
        let samples_per_shift =
            shift.as_decimal() * rust_decimal::Decimal::from(sample_rate);
        let integral = samples_per_shift.fract() == rust_decimal::Decimal::ZERO;
        if !integral {
            tracing::warn!(
                "The number of samples in each window shift is not an integer, time drift might occur."
            );
        }
        anchors
            .iter()
            .map(|anchor| {
                if integral {
                    anchor.begin.to_frames(shift) as f64
                } else {
                    let rate = f64::from(sample_rate);
                    (anchor.begin.to_f64() * rate / shift.to_f64()).floor() / rate
                }
            })
            .collect()
    }

    /// Pick middle or masked-middle matrices, along with the maps
    /// needed to translate indices back.
    #[allow(clippy::type_complexity)]
    fn select_inputs(&self) -> (Vec<Vec<f64>>, Vec<Vec<f64>>, Option<Vec<usize>>, Option<Vec<usize>>) {
        if self.masking() {
            (
                self.real.masked_middle_mfcc(),
                self.synth.masked_middle_mfcc(),
                Some(self.real.masked_middle_map()),
                Some(self.synth.masked_middle_map()),
            )
        } else {
            (
                self.real.middle_mfcc().to_vec(),
                self.synth.middle_mfcc().to_vec(),
                None,
                None,
            )
        }
    }
}

/// Cosine distance between two frames, discarding coefficient 0.
fn frame_distance(a: &[f64], b: &[f64]) -> f64 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (&x, &y) in a[1..].iter().zip(b[1..].iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom > 0.0 {
        1.0 - dot / denom
    } else {
        1.0
    }
}

/// Full accumulated cost matrix between two frame sequences.
///
/// `acm[i][j] = c[i][j] + min(acm[i-1][j], acm[i][j-1], acm[i-1][j-1])`
pub(crate) fn accumulated_cost_matrix(m1: &[Vec<f64>], m2: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = m1.len();
    let m = m2.len();
    let mut acm = vec![vec![0.0; m]; n];
    acm[0][0] = frame_distance(&m1[0], &m2[0]);
    for j in 1..m {
        acm[0][j] = acm[0][j - 1] + frame_distance(&m1[0], &m2[j]);
    }
    for i in 1..n {
        acm[i][0] = acm[i - 1][0] + frame_distance(&m1[i], &m2[0]);
        for j in 1..m {
            let cost = frame_distance(&m1[i], &m2[j]);
            acm[i][j] = cost + acm[i - 1][j].min(acm[i][j - 1]).min(acm[i - 1][j - 1]);
        }
    }
    acm
}

/// Trace the min-cost path back through a full accumulated cost
/// matrix.
fn exact_best_path(acm: &[Vec<f64>]) -> Vec<(usize, usize)> {
    let n = acm.len();
    let m = acm[0].len();
    let mut i = n - 1;
    let mut j = m - 1;
    let mut path = vec![(i, j)];
    while i > 0 || j > 0 {
        if i == 0 {
            j -= 1;
        } else if j == 0 {
            i -= 1;
        } else {
            let up = acm[i - 1][j];
            let left = acm[i][j - 1];
            let diag = acm[i - 1][j - 1];
            // On exact ties prefer the diagonal, so aligned inputs
            // yield the pure diagonal path.
            if diag <= left && diag <= up {
                i -= 1;
                j -= 1;
            } else if left <= up {
                j -= 1;
            } else {
                i -= 1;
            }
        }
        path.push((i, j));
    }
    path.reverse();
    path
}

/// Min-cost path restricted to a Sakoe-Chiba stripe of `delta`
/// columns. `delta` must be smaller than `m2.len()`.
fn stripe_best_path(m1: &[Vec<f64>], m2: &[Vec<f64>], delta: usize) -> Vec<(usize, usize)> {
    let n = m1.len();
    let m = m2.len();
    debug_assert!(delta < m);

    // Banded cost matrix: row i covers columns
    // [centers[i], centers[i] + delta).
    let mut cost = vec![vec![0.0; delta]; n];
    let mut centers = vec![0usize; n];
    for i in 0..n {
        let center = (m * i) / n;
        let mut range_start = center.saturating_sub(delta / 2);
        if range_start + delta > m {
            range_start = m - delta;
        }
        centers[i] = range_start;
        for j in 0..delta {
            cost[i][j] = frame_distance(&m1[i], &m2[range_start + j]);
        }
    }

    // Accumulate in place, remapping the previous row through the
    // per-row center offset.
    for j in 1..delta {
        cost[0][j] += cost[0][j - 1];
    }
    for i in 1..n {
        let offset = centers[i] - centers[i - 1];
        let current_row = cost[i].clone();
        for j in 0..delta {
            let up = if j + offset < delta {
                cost[i - 1][j + offset]
            } else {
                f64::INFINITY
            };
            let left = if j > 0 { cost[i][j - 1] } else { f64::INFINITY };
            let diag = if j + offset >= 1 && j + offset - 1 < delta {
                cost[i - 1][j + offset - 1]
            } else {
                f64::INFINITY
            };
            cost[i][j] = current_row[j] + up.min(left).min(diag);
        }
    }
    let acm = cost;

    // Trace back with absolute column indices.
    let mut i = n - 1;
    let mut j = delta - 1 + centers[i];
    let mut path = vec![(i, j)];
    while i > 0 || j > 0 {
        if i == 0 {
            j -= 1;
        } else if j == 0 {
            i -= 1;
        } else {
            let offset = centers[i] - centers[i - 1];
            let r_j = j - centers[i];
            let up = if r_j + offset < delta {
                acm[i - 1][r_j + offset]
            } else {
                f64::INFINITY
            };
            let left = if r_j > 0 { acm[i][r_j - 1] } else { f64::INFINITY };
            let diag = if r_j > 0 && r_j + offset >= 1 && r_j + offset - 1 < delta {
                acm[i - 1][r_j + offset - 1]
            } else {
                f64::INFINITY
            };
            if up.is_infinite() && left.is_infinite() && diag.is_infinite() {
                break;
            }
            if diag <= left && diag <= up {
                i -= 1;
                j -= 1;
            } else if left <= up {
                j -= 1;
            } else {
                i -= 1;
            }
        }
        path.push((i, j));
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::features::AudioFeatures;
    use crate::timing::TimeValue;

    fn tv(s: &str) -> TimeValue {
        s.parse().unwrap()
    }

    /// A frame whose direction in MFCC space depends on `phase`.
    fn unit_frame(phase: f64) -> Vec<f64> {
        vec![0.0, phase.cos(), phase.sin(), 1.0]
    }

    fn constant_frames(count: usize) -> Vec<Vec<f64>> {
        (0..count).map(|_| unit_frame(0.3)).collect()
    }

    fn varying_frames(count: usize) -> Vec<Vec<f64>> {
        (0..count).map(|i| unit_frame(i as f64 * 0.37)).collect()
    }

    fn config_with(algorithm: DtwVariant, margin: &str) -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.dtw.algorithm = algorithm;
        config.dtw.margin = margin.parse().unwrap();
        config
    }

    fn anchors_at(times: &[&str]) -> Vec<Anchor> {
        times
            .iter()
            .enumerate()
            .map(|(i, t)| Anchor {
                begin: t.parse().unwrap(),
                end: t.parse().unwrap(),
                text: format!("fragment {i}"),
            })
            .collect()
    }

    #[test]
    fn identical_inputs_follow_the_diagonal_with_zero_cost() {
        let frames = varying_frames(50);
        let acm = accumulated_cost_matrix(&frames, &frames);
        assert!(acm[49][49].abs() < 1e-9);
        let path = exact_best_path(&acm);
        assert_eq!(path.len(), 50);
        for (step, &(i, j)) in path.iter().enumerate() {
            assert_eq!((i, j), (step, step));
        }
    }

    #[test]
    fn stripe_with_wide_band_matches_exact() {
        // 100 identical frames; with the band both wider and narrower
        // than the matrix the path must be the same pure diagonal.
        let frames = constant_frames(100);
        let features = AudioFeatures::new(frames, tv("0.040"));

        let exact_config = config_with(DtwVariant::Stripe, "4.000"); // delta 200 >= m
        let wide = DtwAligner::new(&features, &features, &exact_config)
            .compute_path()
            .unwrap();

        let narrow_config = config_with(DtwVariant::Stripe, "0.400"); // delta 20
        let narrow = DtwAligner::new(&features, &features, &narrow_config)
            .compute_path()
            .unwrap();

        assert_eq!(wide, narrow);
        assert_eq!(wide.len(), 100);
        for (step, &(i, j)) in wide.iter().enumerate() {
            assert_eq!((i, j), (step, step));
        }
    }

    #[test]
    fn empty_side_yields_no_path() {
        let empty = AudioFeatures::new(Vec::new(), tv("0.040"));
        let full = AudioFeatures::new(varying_frames(10), tv("0.040"));
        let config = RuntimeConfig::default();
        assert!(DtwAligner::new(&empty, &full, &config).compute_path().is_none());
        assert!(DtwAligner::new(&full, &empty, &config).compute_path().is_none());
    }

    #[test]
    fn boundaries_count_and_monotonicity() {
        let real = AudioFeatures::new(varying_frames(100), tv("0.040"));
        let synth = AudioFeatures::new(varying_frames(100), tv("0.040"));
        let config = RuntimeConfig::default();
        let aligner = DtwAligner::new(&real, &synth, &config);
        let anchors = anchors_at(&["0.000", "1.000", "2.000"]);
        let boundaries = aligner.compute_boundaries(&anchors);
        assert_eq!(boundaries.len(), anchors.len() + 1);
        assert!(boundaries.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(boundaries[0], 0);
        assert_eq!(*boundaries.last().unwrap(), 100);
    }

    #[test]
    fn equal_waves_put_boundaries_at_anchor_frames() {
        let real = AudioFeatures::new(varying_frames(100), tv("0.040"));
        let synth = AudioFeatures::new(varying_frames(100), tv("0.040"));
        let config = RuntimeConfig::default();
        let aligner = DtwAligner::new(&real, &synth, &config);
        let boundaries = aligner.compute_boundaries(&anchors_at(&["0.000", "2.000"]));
        // The 2.000 s anchor is frame 50; the right-sided search puts
        // the split at the first step past it.
        assert_eq!(boundaries, vec![0, 51, 100]);
    }

    #[test]
    fn fallback_boundaries_are_equispaced() {
        let real = AudioFeatures::new(varying_frames(100), tv("0.040"));
        let synth = AudioFeatures::new(Vec::new(), tv("0.040"));
        let config = RuntimeConfig::default();
        let aligner = DtwAligner::new(&real, &synth, &config);
        let boundaries = aligner.compute_boundaries(&anchors_at(&["0.000", "1.000"]));
        assert_eq!(boundaries, vec![0, 50, 100]);
    }

    #[test]
    fn masking_translates_back_to_absolute_frames() {
        let mut frames = varying_frames(60);
        // Coefficient 0 is log-energy: quiet head, loud middle.
        for (i, frame) in frames.iter_mut().enumerate() {
            frame[0] = if i < 20 { -10.0 } else { 5.0 };
        }
        let mut real = AudioFeatures::new(frames, tv("0.040"));
        real.run_vad(&crate::config::VadSettings::default());
        let mut synth_frames = varying_frames(40);
        for (i, frame) in synth_frames.iter_mut().enumerate() {
            frame[0] = if i < 5 { -10.0 } else { 5.0 };
        }
        let mut synth = AudioFeatures::new(synth_frames, tv("0.040"));
        synth.run_vad(&crate::config::VadSettings::default());
        let mut config = RuntimeConfig::default();
        config.mfcc.mask_nonspeech = true;
        let aligner = DtwAligner::new(&real, &synth, &config);
        let path = aligner.compute_path().unwrap();
        // All real indices must point into the speech region.
        assert!(path.iter().all(|&(ri, _)| (20..60).contains(&ri)));
    }
}
