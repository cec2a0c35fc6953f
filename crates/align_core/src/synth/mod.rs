//! The text-to-speech collaborator contract.
//!
//! Concrete TTS drivers live outside the engine; the executor and the
//! start detector only rely on this trait. The synthesized wave is
//! written to the given path as mono 16-bit PCM WAV at the configured
//! sample rate, and the returned anchors are treated as ground truth.

use std::io;
use std::path::Path;

use thiserror::Error;

use crate::text::TextFile;
use crate::timing::TimeValue;

/// Errors raised by a speech synthesizer.
#[derive(Error, Debug)]
pub enum SynthesisError {
    /// The synthesis output could not be written.
    #[error("failed to write synthesis output: {0}")]
    Io(#[from] io::Error),

    /// The synthesizer produced no audio for a non-empty text.
    #[error("synthesizer produced no audio")]
    EmptyOutput,

    /// Driver-specific failure.
    #[error("synthesis failed: {0}")]
    Failed(String),
}

/// Result type for synthesis operations.
pub type SynthesisResult<T> = Result<T, SynthesisError>;

/// The time span of one synthesized fragment in the synthetic wave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// Begin time of the fragment in the synthetic wave.
    pub begin: TimeValue,
    /// End time of the fragment in the synthetic wave.
    pub end: TimeValue,
    /// The synthesized text.
    pub text: String,
}

/// Outcome of one synthesis call.
#[derive(Debug, Clone)]
pub struct SynthesizedWave {
    /// One anchor per synthesized fragment, in order.
    pub anchors: Vec<Anchor>,
    /// Total duration of the synthetic wave.
    pub total_time: TimeValue,
    /// Total number of characters synthesized.
    pub chars: usize,
}

/// A text-to-speech driver.
///
/// When `backwards` is set, fragments are synthesized in reverse
/// order, so that the tail of the transcript comes first in the
/// emitted wave; the start detector reverses the resulting feature
/// frames itself. `quit_after` permits partial synthesis once at least
/// that much audio exists.
pub trait SpeechSynthesizer {
    /// Synthesize the top-level fragments of `text` into a WAV file at
    /// `output_path`.
    fn synthesize(
        &self,
        text: &TextFile,
        output_path: &Path,
        quit_after: Option<TimeValue>,
        backwards: bool,
    ) -> SynthesisResult<SynthesizedWave>;
}
