//! Shared helpers for unit tests: a deterministic tone synthesizer
//! standing in for a real TTS driver, and builders for matching "real"
//! recordings.

use std::f64::consts::PI;
use std::path::Path;

use crate::audio::AudioData;
use crate::synth::{Anchor, SpeechSynthesizer, SynthesisError, SynthesisResult, SynthesizedWave};
use crate::text::{TextFile, TextFragment};
use crate::timing::TimeValue;

const SAMPLE_RATE: u32 = 16000;

/// Seconds of audio emitted per character of text.
const SECONDS_PER_CHAR: f64 = 0.06;

/// Minimum duration of one synthesized fragment.
const MIN_FRAGMENT_SECS: f64 = 0.40;

/// A TTS stand-in that renders each fragment as a sine tone whose
/// frequency is derived from the fragment text, so that distinct
/// fragments are spectrally distinct and re-synthesizing the same
/// fragment reproduces the same audio.
#[derive(Default)]
pub struct ToneSynthesizer;

/// Duration of the tone for one fragment, in seconds.
fn fragment_secs(fragment: &TextFragment) -> f64 {
    (fragment.chars() as f64 * SECONDS_PER_CHAR).max(MIN_FRAGMENT_SECS)
}

/// A stable per-fragment frequency in the speech band.
fn fragment_freq(fragment: &TextFragment) -> f64 {
    let h: u32 = fragment
        .text()
        .bytes()
        .fold(17u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
    250.0 + f64::from(h % 37) * 80.0
}

/// Sine tone samples with a short fade to avoid clicks.
pub fn tone(freq: f64, secs: f64, sample_rate: u32) -> Vec<f64> {
    let len = (secs * f64::from(sample_rate)) as usize;
    let fade = (len / 50).max(1);
    (0..len)
        .map(|i| {
            let t = i as f64 / f64::from(sample_rate);
            let envelope = if i < fade {
                i as f64 / fade as f64
            } else if i + fade > len {
                (len - i) as f64 / fade as f64
            } else {
                1.0
            };
            0.8 * envelope * (2.0 * PI * freq * t).sin()
        })
        .collect()
}

/// Silent samples.
pub fn silence(secs: f64, sample_rate: u32) -> Vec<f64> {
    vec![0.0; (secs * f64::from(sample_rate)) as usize]
}

fn write_wav(path: &Path, samples: &[f64], sample_rate: u32) -> Result<(), SynthesisError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| SynthesisError::Failed(e.to_string()))?;
    for &s in samples {
        writer
            .write_sample((s.clamp(-1.0, 1.0) * 30000.0) as i16)
            .map_err(|e| SynthesisError::Failed(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| SynthesisError::Failed(e.to_string()))?;
    Ok(())
}

impl SpeechSynthesizer for ToneSynthesizer {
    fn synthesize(
        &self,
        text: &TextFile,
        output_path: &Path,
        quit_after: Option<TimeValue>,
        backwards: bool,
    ) -> SynthesisResult<SynthesizedWave> {
        let mut fragments: Vec<&TextFragment> = text.fragments().collect();
        if backwards {
            fragments.reverse();
        }
        let mut samples = Vec::new();
        let mut anchors = Vec::new();
        let mut chars = 0usize;
        let mut elapsed = 0.0f64;
        for fragment in fragments {
            let secs = fragment_secs(fragment);
            let begin = elapsed;
            samples.extend(tone(fragment_freq(fragment), secs, SAMPLE_RATE));
            elapsed += secs;
            chars += fragment.chars();
            anchors.push(Anchor {
                begin: TimeValue::from_secs_f64(begin).unwrap_or(TimeValue::ZERO),
                end: TimeValue::from_secs_f64(elapsed).unwrap_or(TimeValue::ZERO),
                text: fragment.text(),
            });
            if let Some(quit_after) = quit_after {
                if elapsed >= quit_after.to_f64() {
                    break;
                }
            }
        }
        if samples.is_empty() {
            return Err(SynthesisError::EmptyOutput);
        }
        write_wav(output_path, &samples, SAMPLE_RATE)?;
        Ok(SynthesizedWave {
            anchors,
            total_time: TimeValue::from_secs_f64(elapsed).unwrap_or(TimeValue::ZERO),
            chars,
        })
    }
}

/// A single-level text file from plain strings.
pub fn text_file(fragments: &[&str]) -> TextFile {
    TextFile::new(
        fragments
            .iter()
            .enumerate()
            .map(|(i, t)| TextFragment::new(format!("f{:06}", i + 1), vec![t.to_string()]))
            .collect(),
    )
}

/// A "real" recording of the given text: head silence, the same tones
/// the synthesizer would produce, tail silence.
pub fn real_audio(text: &TextFile, head_secs: f64, tail_secs: f64) -> AudioData {
    let mut samples = silence(head_secs, SAMPLE_RATE);
    for fragment in text.fragments() {
        samples.extend(tone(
            fragment_freq(fragment),
            fragment_secs(fragment),
            SAMPLE_RATE,
        ));
    }
    samples.extend(silence(tail_secs, SAMPLE_RATE));
    AudioData::new(samples, SAMPLE_RATE)
}
