//! Task execution: composes extraction, detection, alignment, and
//! adjustment into single-level and multi-level runs.

mod errors;

use std::fs;

use crate::adjust::{AdjustAlgorithm, BoundaryAdjuster};
use crate::audio::AudioData;
use crate::config::RuntimeConfig;
use crate::dtw::DtwAligner;
use crate::features::AudioFeatures;
use crate::sd::StartDetector;
use crate::synth::SpeechSynthesizer;
use crate::syncmap::{NodeId, SyncMapTree};
use crate::task::Task;
use crate::text::TextFile;
use crate::timing::TimeValue;

pub use errors::{TaskError, TaskResult};

/// Number of granularity levels of a multilevel run
/// (paragraph, sentence, word).
const LEVELS: usize = 3;

/// Executes alignment tasks against a TTS collaborator.
pub struct TaskExecutor<'a> {
    config: RuntimeConfig,
    synthesizer: &'a dyn SpeechSynthesizer,
}

impl<'a> TaskExecutor<'a> {
    /// Create an executor; the configuration is validated eagerly.
    pub fn new(
        config: RuntimeConfig,
        synthesizer: &'a dyn SpeechSynthesizer,
    ) -> TaskResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            synthesizer,
        })
    }

    /// Execute the task, storing the sync map inside it on success.
    ///
    /// Any failure leaves `task.sync_map` unset.
    pub fn execute(&self, task: &mut Task) -> TaskResult<()> {
        self.validate_input(task)?;
        tracing::info!(
            "Executing {} task with {} fragments",
            if task.text_file.is_multilevel() {
                "multi level"
            } else {
                "single level"
            },
            task.text_file.len()
        );
        let tree = if task.text_file.is_multilevel() {
            self.execute_multi_level(task)?
        } else {
            self.execute_single_level(task)?
        };
        if self.config.safety_checks {
            if !tree.leaves_are_consistent() {
                return Err(TaskError::InvariantViolation(
                    "the computed sync map contains inconsistent fragments".to_string(),
                ));
            }
            tracing::debug!("Sanity check on computed sync map passed");
        }
        task.sync_map = Some(tree);
        Ok(())
    }

    fn validate_input(&self, task: &Task) -> TaskResult<()> {
        if !task.audio_path.exists() {
            return Err(TaskError::Input(format!(
                "audio file not found: {}",
                task.audio_path.display()
            )));
        }
        if task.text_file.is_empty() {
            return Err(TaskError::Input(
                "the text file has no fragments".to_string(),
            ));
        }
        if task.text_file.chars() == 0 {
            return Err(TaskError::Input("the text file has empty text".to_string()));
        }
        let max_fragments = self.config.limits.max_fragments;
        if max_fragments > 0 && task.text_file.len() > max_fragments {
            return Err(TaskError::Input(format!(
                "the text file has {} fragments, more than the maximum allowed ({})",
                task.text_file.len(),
                max_fragments
            )));
        }
        Ok(())
    }

    fn load_audio(&self, task: &Task) -> TaskResult<AudioData> {
        let audio = AudioData::from_wav_file(&task.audio_path)?;
        let cap = self.config.limits.max_audio_length;
        if cap > TimeValue::ZERO && audio.duration() > cap {
            return Err(TaskError::Input(format!(
                "the audio file has length {}, more than the maximum allowed ({})",
                audio.duration(),
                cap
            )));
        }
        Ok(audio)
    }

    fn extract_features(
        &self,
        audio: &AudioData,
        config: &RuntimeConfig,
    ) -> TaskResult<AudioFeatures> {
        let mut features = AudioFeatures::extract(audio, config)?;
        if config.mfcc.mask_nonspeech {
            features.run_vad(&config.vad);
        }
        Ok(features)
    }

    fn execute_single_level(&self, task: &Task) -> TaskResult<SyncMapTree> {
        let audio = self.load_audio(task)?;
        let mut real = self.extract_features(&audio, &self.config)?;
        drop(audio);

        let (head, process, tail) = self.compute_head_process_tail(&self.config, &mut real, task)?;
        real.set_head_middle_tail(head, process, tail);

        let mut tree = SyncMapTree::new();
        let root = tree.root();
        self.execute_inner(
            &self.config,
            &mut real,
            &task.text_file,
            &mut tree,
            root,
            task,
            false,
            true,
        )?;
        Ok(tree)
    }

    fn execute_multi_level(&self, task: &Task) -> TaskResult<SyncMapTree> {
        let level_configs: Vec<RuntimeConfig> =
            (1..=LEVELS).map(|level| self.config.for_level(level)).collect();
        let audio = self.load_audio(task)?;

        // Extract per-level MFCCs, reusing the previous level when the
        // window parameters did not change.
        let mut level_features: Vec<AudioFeatures> = Vec::with_capacity(LEVELS);
        for (i, config) in level_configs.iter().enumerate() {
            let reusable = i > 0
                && config.mfcc.window_length == level_configs[i - 1].mfcc.window_length
                && config.mfcc.window_shift == level_configs[i - 1].mfcc.window_shift;
            let features = if reusable {
                tracing::debug!("Keeping MFCC real wave from previous level");
                let mut features = level_features[i - 1].clone();
                if config.mfcc.mask_nonspeech {
                    features.run_vad(&config.vad);
                }
                features
            } else {
                self.extract_features(&audio, config)?
            };
            level_features.push(features);
        }
        drop(audio);

        // Head and tail are computed at level 1 only.
        let (head, process, tail) =
            self.compute_head_process_tail(&level_configs[0], &mut level_features[0], task)?;
        level_features[0].set_head_middle_tail(head, process, tail);

        let mut tree = SyncMapTree::new();
        let mut text_files: Vec<TextFile> = vec![task.text_file.clone()];
        let mut sync_roots: Vec<NodeId> = vec![tree.root()];
        for level in 1..=LEVELS {
            if text_files.is_empty() {
                break;
            }
            tracing::debug!("Computing alignment at level {level}");
            let config = &level_configs[level - 1];
            let features = &mut level_features[level - 1];
            let force_auto = level == LEVELS;
            let leaf_level = level == LEVELS;
            let mut next_text_files = Vec::new();
            let mut next_sync_roots = Vec::new();
            for (text_file, root) in text_files.iter().zip(sync_roots.iter().copied()) {
                let parent_zero = tree
                    .value(root)
                    .map(|f| f.has_zero_length())
                    .unwrap_or(false);
                if level > 1 && (text_file.len() == 1 || parent_zero) {
                    self.append_trivial_tree(config, text_file, &mut tree, root)?;
                } else {
                    if level > 1 {
                        if let Some(parent) = tree.value(root) {
                            let begin = parent.begin();
                            let middle = parent.end() - begin;
                            features.set_head_middle_tail(Some(begin), Some(middle), None);
                        }
                    }
                    self.execute_inner(
                        config, features, text_file, &mut tree, root, task, force_auto,
                        leaf_level,
                    )?;
                }
                // Pair each text node having children with the tree
                // child carrying the same fragment, for the next level.
                for (index, sub_file) in text_file.sub_files() {
                    let identifier = text_file.nodes()[index].fragment.identifier.as_str();
                    let child = tree.children(root).iter().copied().find(|&id| {
                        tree.value(id)
                            .is_some_and(|f| f.identifier() == Some(identifier))
                    });
                    if let Some(child) = child {
                        next_text_files.push(sub_file);
                        next_sync_roots.push(child);
                    }
                }
            }
            text_files = next_text_files;
            sync_roots = next_sync_roots;
        }
        Ok(tree)
    }

    /// Align one text (sub)file against the middle region of `real`
    /// and append the resulting fragments under `parent`.
    #[allow(clippy::too_many_arguments)]
    fn execute_inner(
        &self,
        config: &RuntimeConfig,
        real: &mut AudioFeatures,
        text: &TextFile,
        tree: &mut SyncMapTree,
        parent: NodeId,
        task: &Task,
        force_auto: bool,
        leaf_level: bool,
    ) -> TaskResult<()> {
        // Synthesize the text into a scratch WAV, removed on return.
        fs::create_dir_all(&config.paths.temp_root)?;
        let scratch = tempfile::Builder::new()
            .prefix("synth_")
            .suffix(".wav")
            .tempfile_in(&config.paths.temp_root)?;
        let wave = self
            .synthesizer
            .synthesize(text, scratch.path(), None, false)?;
        let synth_audio = AudioData::from_wav_file(scratch.path())?;
        drop(scratch);
        let mut synth = AudioFeatures::extract(&synth_audio, config)?;
        if config.mfcc.mask_nonspeech {
            synth.run_vad(&config.vad);
        }

        let mut params = task.configuration.adjust_params();
        if force_auto {
            tracing::debug!("Forcing adjustment algorithm 'auto'");
            params.algorithm = AdjustAlgorithm::Auto;
        }
        let needs_vad = params.nonspeech_min.is_some()
            || matches!(
                params.algorithm,
                AdjustAlgorithm::Percent(_)
                    | AdjustAlgorithm::AfterCurrent(_)
                    | AdjustAlgorithm::BeforeNext(_)
            );
        if needs_vad {
            real.ensure_vad(&config.vad);
        }

        let aligner = DtwAligner::new(real, &synth, config);
        let boundary_indices = aligner.compute_boundaries(&wave.anchors);

        let adjuster = BoundaryAdjuster::new(config);
        let list = adjuster.adjust(&params, &boundary_indices, real, text, leaf_level)?;
        tree.add_list(parent, &list);
        Ok(())
    }

    /// Determine `(head, process, tail)` lengths: explicit values win,
    /// then SD within the configured windows, then no trimming at all.
    fn compute_head_process_tail(
        &self,
        config: &RuntimeConfig,
        real: &mut AudioFeatures,
        task: &Task,
    ) -> TaskResult<(Option<TimeValue>, Option<TimeValue>, Option<TimeValue>)> {
        let c = &task.configuration;
        if c.has_explicit_regions() {
            tracing::debug!("Using explicit head/process/tail");
            return Ok((c.head_length, c.process_length, c.tail_length));
        }
        let mut head = TimeValue::ZERO;
        let mut tail = TimeValue::ZERO;
        if c.wants_head_detection() || c.wants_tail_detection() {
            let mut detector =
                StartDetector::new(real, &task.text_file, self.synthesizer, config);
            if c.wants_head_detection() {
                head = detector.detect_head(c.head_min, c.head_max)?;
                tracing::debug!("Detected head: {head}");
            }
            if c.wants_tail_detection() {
                tail = detector.detect_tail(c.tail_min, c.tail_max)?;
                tracing::debug!("Detected tail: {tail}");
            }
        }
        Ok((Some(head), None, Some(tail)))
    }

    /// Append the trivial `[HEAD, k x REGULAR, TAIL]` expansion of a
    /// node whose interval cannot be subdivided (single child or zero
    /// duration).
    fn append_trivial_tree(
        &self,
        config: &RuntimeConfig,
        text: &TextFile,
        tree: &mut SyncMapTree,
        root: NodeId,
    ) -> TaskResult<()> {
        let Some(parent) = tree.value(root) else {
            return Err(TaskError::InvariantViolation(
                "trivial tree requested for a node without a fragment".to_string(),
            ));
        };
        let begin = parent.begin();
        let end = parent.end();
        let time_values: Vec<TimeValue> = if text.len() == 1 {
            vec![begin, begin, end, end]
        } else {
            // The parent has zero duration here.
            vec![begin; 3 + text.len()]
        };
        let adjuster = BoundaryAdjuster::new(config);
        let list = adjuster.intervals_to_fragment_list(text, &time_values)?;
        tree.add_list(root, &list);
        Ok(())
    }
}
