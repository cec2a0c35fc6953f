//! An alignment task: one audio file, one text file, the knobs
//! controlling their alignment, and the resulting sync map.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::adjust::{AdjustAlgorithm, AdjustParams, NonspeechReplacement};
use crate::syncmap::SyncMapTree;
use crate::text::TextFile;
use crate::timing::TimeValue;

/// Per-task configuration read by the executor and the adjuster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskConfiguration {
    /// Boundary adjustment algorithm.
    #[serde(default)]
    pub adjust_algorithm: AdjustAlgorithm,

    /// Enforce a minimum fragment duration.
    #[serde(default)]
    pub no_zero: bool,

    /// Inject NONSPEECH fragments for pauses at least this long.
    #[serde(default)]
    pub nonspeech_min: Option<TimeValue>,

    /// Replacement policy for injected NONSPEECH fragments.
    #[serde(default)]
    pub nonspeech_replacement: NonspeechReplacement,

    /// Explicit audio head length, in seconds.
    #[serde(default)]
    pub head_length: Option<TimeValue>,

    /// Explicit length of the audio portion to process, in seconds.
    #[serde(default)]
    pub process_length: Option<TimeValue>,

    /// Explicit audio tail length, in seconds.
    #[serde(default)]
    pub tail_length: Option<TimeValue>,

    /// Minimum head length for detection.
    #[serde(default)]
    pub head_min: Option<TimeValue>,

    /// Maximum head length for detection.
    #[serde(default)]
    pub head_max: Option<TimeValue>,

    /// Minimum tail length for detection.
    #[serde(default)]
    pub tail_min: Option<TimeValue>,

    /// Maximum tail length for detection.
    #[serde(default)]
    pub tail_max: Option<TimeValue>,
}

impl TaskConfiguration {
    /// The boundary adjustment parameters of this task.
    pub fn adjust_params(&self) -> AdjustParams {
        AdjustParams {
            algorithm: self.adjust_algorithm.clone(),
            no_zero: self.no_zero,
            nonspeech_min: self.nonspeech_min,
            nonspeech_replacement: self.nonspeech_replacement.clone(),
        }
    }

    /// Whether head/process/tail are given explicitly.
    pub fn has_explicit_regions(&self) -> bool {
        self.head_length.is_some() || self.process_length.is_some() || self.tail_length.is_some()
    }

    /// Whether head detection is requested.
    pub fn wants_head_detection(&self) -> bool {
        self.head_min.is_some() || self.head_max.is_some()
    }

    /// Whether tail detection is requested.
    pub fn wants_tail_detection(&self) -> bool {
        self.tail_min.is_some() || self.tail_max.is_some()
    }
}

/// One alignment task.
#[derive(Debug, Clone)]
pub struct Task {
    /// The task configuration.
    pub configuration: TaskConfiguration,
    /// Path to the real audio (mono 16-bit PCM WAV).
    pub audio_path: PathBuf,
    /// The segmented transcript.
    pub text_file: TextFile,
    /// The computed sync map; set by a successful execution.
    pub sync_map: Option<SyncMapTree>,
}

impl Task {
    /// Create a task with no sync map yet.
    pub fn new(
        audio_path: impl Into<PathBuf>,
        text_file: TextFile,
        configuration: TaskConfiguration,
    ) -> Self {
        Self {
            configuration,
            audio_path: audio_path.into(),
            text_file,
            sync_map: None,
        }
    }

    /// Builder-style default adjustment algorithm override.
    pub fn with_algorithm(mut self, algorithm: AdjustAlgorithm) -> Self {
        self.configuration.adjust_algorithm = algorithm;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjust_params_mirror_configuration() {
        let mut configuration = TaskConfiguration::default();
        configuration.no_zero = true;
        configuration.nonspeech_min = Some("0.500".parse().unwrap());
        let params = configuration.adjust_params();
        assert!(params.no_zero);
        assert_eq!(params.nonspeech_min, configuration.nonspeech_min);
        assert_eq!(params.algorithm, AdjustAlgorithm::Auto);
    }

    #[test]
    fn region_predicates() {
        let mut configuration = TaskConfiguration::default();
        assert!(!configuration.has_explicit_regions());
        assert!(!configuration.wants_head_detection());
        configuration.head_max = Some("5.000".parse().unwrap());
        assert!(configuration.wants_head_detection());
        configuration.head_length = Some("1.000".parse().unwrap());
        assert!(configuration.has_explicit_regions());
    }
}
