//! MFCC extraction.
//!
//! Classical pipeline: pre-emphasis, Hamming-windowed framing, FFT
//! power spectrum, triangular mel filterbank, log, DCT-II. Row 0 of
//! the output carries the frame log-energy instead of the DCT c0, so
//! that downstream consumers (VAD, DTW) can treat it uniformly.

use std::f64::consts::PI;

use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rustfft::{num_complex::Complex, FftPlanner};

use crate::config::MfccSettings;
use crate::timing::TimeValue;

use super::{FeatureError, FeatureResult};

const ENERGY_FLOOR: f64 = 1e-10;

/// MFCC extractor with a cached FFT plan.
pub struct MfccExtractor {
    settings: MfccSettings,
    sample_rate: u32,
    /// Cached FFT planner.
    planner: Mutex<FftPlanner<f64>>,
}

impl MfccExtractor {
    /// Create an extractor for the given settings and sample rate.
    pub fn new(settings: &MfccSettings, sample_rate: u32) -> Self {
        Self {
            settings: settings.clone(),
            sample_rate,
            planner: Mutex::new(FftPlanner::new()),
        }
    }

    /// Number of samples spanned by a time value at this sample rate.
    fn samples_for(&self, duration: TimeValue) -> usize {
        (duration.as_decimal() * rust_decimal::Decimal::from(self.sample_rate))
            .floor()
            .to_usize()
            .unwrap_or(0)
    }

    /// Compute the MFCC matrix for the given samples.
    ///
    /// Returns `mfcc[frame][coefficient]` with `settings.size`
    /// coefficients per frame, coefficient 0 being the log-energy.
    pub fn extract(&self, samples: &[f64]) -> FeatureResult<Vec<Vec<f64>>> {
        let window_samples = self.samples_for(self.settings.window_length);
        let shift_samples = self.samples_for(self.settings.window_shift);
        if window_samples == 0 || shift_samples == 0 {
            return Err(FeatureError::InvalidWindow {
                window_length: self.settings.window_length,
                window_shift: self.settings.window_shift,
            });
        }
        let shift_exact = self.settings.window_shift.as_decimal()
            * rust_decimal::Decimal::from(self.sample_rate);
        if shift_exact != rust_decimal::Decimal::from(shift_samples as u64) {
            tracing::warn!(
                "The number of samples in each window shift is not an integer, time drift might occur."
            );
        }
        if samples.len() < window_samples {
            return Err(FeatureError::NoFrames {
                samples: samples.len(),
                window_samples,
            });
        }
        let num_frames = (samples.len() - window_samples) / shift_samples + 1;

        let emphasized = pre_emphasis(samples, self.settings.emphasis_factor);
        let window = hamming_window(window_samples);
        let filterbank = self.mel_filterbank();
        let n_bins = self.settings.fft_order / 2 + 1;

        let fft = {
            let mut planner = self.planner.lock();
            planner.plan_fft_forward(self.settings.fft_order)
        };

        let mut mfcc = Vec::with_capacity(num_frames);
        let mut buffer: Vec<Complex<f64>> = vec![Complex::new(0.0, 0.0); self.settings.fft_order];
        for frame_index in 0..num_frames {
            let start = frame_index * shift_samples;
            let frame = &emphasized[start..start + window_samples];

            // Windowed frame, truncated or zero-padded to the FFT order.
            let copied = window_samples.min(self.settings.fft_order);
            for (slot, (&s, &w)) in buffer
                .iter_mut()
                .zip(frame.iter().zip(window.iter()))
                .take(copied)
            {
                *slot = Complex::new(s * w, 0.0);
            }
            for slot in buffer.iter_mut().skip(copied) {
                *slot = Complex::new(0.0, 0.0);
            }
            fft.process(&mut buffer);

            let power: Vec<f64> = buffer[..n_bins].iter().map(|c| c.norm_sqr()).collect();
            let log_energy = power.iter().sum::<f64>().max(ENERGY_FLOOR).ln();

            let log_mel: Vec<f64> = filterbank
                .iter()
                .map(|filter| {
                    filter
                        .iter()
                        .zip(power.iter())
                        .map(|(&f, &p)| f * p)
                        .sum::<f64>()
                        .max(ENERGY_FLOOR)
                        .ln()
                })
                .collect();

            let mut coeffs = dct_ii(&log_mel, self.settings.size);
            coeffs[0] = log_energy;
            mfcc.push(coeffs);
        }

        Ok(mfcc)
    }

    /// Create the mel filterbank matrix, shape
    /// `(filters, fft_order / 2 + 1)`; each row is a triangular filter.
    fn mel_filterbank(&self) -> Vec<Vec<f64>> {
        let n_bins = self.settings.fft_order / 2 + 1;
        let n_filters = self.settings.filters;

        let mel_min = hz_to_mel(self.settings.lower_frequency);
        let mel_max = hz_to_mel(self.settings.upper_frequency);

        // filters + 2 points to create `filters` triangular filters
        let hz_points: Vec<f64> = (0..=n_filters + 1)
            .map(|i| {
                let mel = mel_min + (mel_max - mel_min) * i as f64 / (n_filters + 1) as f64;
                mel_to_hz(mel)
            })
            .collect();
        let bin_points: Vec<f64> = hz_points
            .iter()
            .map(|&hz| hz * self.settings.fft_order as f64 / f64::from(self.sample_rate))
            .collect();

        let mut filterbank = vec![vec![0.0; n_bins]; n_filters];
        for i in 0..n_filters {
            let start = bin_points[i];
            let center = bin_points[i + 1];
            let end = bin_points[i + 2];
            for (j, slot) in filterbank[i].iter_mut().enumerate() {
                let bin = j as f64;
                if bin >= start && bin < center && center > start {
                    *slot = (bin - start) / (center - start);
                } else if bin >= center && bin <= end && end > center {
                    *slot = (end - bin) / (end - center);
                }
            }
        }
        filterbank
    }
}

/// Convert frequency in Hz to the mel scale.
fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

/// Convert mel scale to frequency in Hz.
fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10.0f64.powf(mel / 2595.0) - 1.0)
}

/// First-order pre-emphasis over the whole stream.
fn pre_emphasis(samples: &[f64], factor: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(samples.len());
    let mut previous = 0.0;
    for &s in samples {
        out.push(s - factor * previous);
        previous = s;
    }
    out
}

/// Create a Hamming window of the given size.
fn hamming_window(size: usize) -> Vec<f64> {
    if size == 1 {
        return vec![1.0];
    }
    (0..size)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (size - 1) as f64).cos())
        .collect()
}

/// DCT-II with ortho normalization, keeping the first `size`
/// coefficients.
fn dct_ii(values: &[f64], size: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![0.0; size];
    for (k, slot) in out.iter_mut().enumerate() {
        let mut sum = 0.0;
        for (i, &v) in values.iter().enumerate() {
            sum += v * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n as f64)).cos();
        }
        *slot = sum;
    }
    if !out.is_empty() {
        out[0] *= (1.0 / n as f64).sqrt();
        for k in out.iter_mut().skip(1) {
            *k *= (2.0 / n as f64).sqrt();
        }
    }
    out
}
