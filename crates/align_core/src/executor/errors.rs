//! Error types for task execution.

use std::io;

use thiserror::Error;

use crate::adjust::AdjustError;
use crate::audio::AudioError;
use crate::config::ConfigError;
use crate::features::FeatureError;
use crate::sd::SdError;
use crate::synth::SynthesisError;

/// Top-level error surfaced by the task executor.
#[derive(Error, Debug)]
pub enum TaskError {
    /// The task inputs are missing or out of the configured caps.
    #[error("invalid input: {0}")]
    Input(String),

    /// The runtime configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Audio could not be read.
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// MFCC extraction failed.
    #[error(transparent)]
    Feature(#[from] FeatureError),

    /// The TTS collaborator failed.
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    /// Head/tail detection failed.
    #[error(transparent)]
    Detection(#[from] SdError),

    /// Boundary adjustment failed.
    #[error(transparent)]
    Adjust(#[from] AdjustError),

    /// A post-run safety check found an inconsistent sync map.
    #[error("safety check failed: {0}")]
    InvariantViolation(String),

    /// Scratch file handling failed.
    #[error("scratch file error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for task execution.
pub type TaskResult<T> = Result<T, TaskError>;
