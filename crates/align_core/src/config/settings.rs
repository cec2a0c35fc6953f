//! Runtime configuration with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML
//! tables. Every field has a default, so a partial (or missing) config
//! file always yields a usable configuration.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::dtw::DtwVariant;
use crate::timing::TimeValue;

fn tv(s: &str) -> TimeValue {
    // Only called with literal well-formed decimals.
    s.parse().unwrap_or(TimeValue::ZERO)
}

/// Root configuration structure containing all sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Run post-alignment invariant checks.
    #[serde(default = "default_true")]
    pub safety_checks: bool,

    /// Path-related settings.
    #[serde(default)]
    pub paths: PathSettings,

    /// PCM input settings.
    #[serde(default)]
    pub audio: AudioSettings,

    /// MFCC extraction settings.
    #[serde(default)]
    pub mfcc: MfccSettings,

    /// Voice activity detection settings.
    #[serde(default)]
    pub vad: VadSettings,

    /// DTW aligner settings.
    #[serde(default)]
    pub dtw: DtwSettings,

    /// Boundary adjustment settings.
    #[serde(default)]
    pub boundary: BoundarySettings,

    /// Input size caps.
    #[serde(default)]
    pub limits: LimitSettings,

    /// Per-level overrides for multilevel runs.
    #[serde(default)]
    pub granularity: GranularitySettings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            safety_checks: true,
            paths: PathSettings::default(),
            audio: AudioSettings::default(),
            mfcc: MfccSettings::default(),
            vad: VadSettings::default(),
            dtw: DtwSettings::default(),
            boundary: BoundarySettings::default(),
            limits: LimitSettings::default(),
            granularity: GranularitySettings::default(),
        }
    }
}

impl RuntimeConfig {
    /// A copy of this configuration with the MFCC window parameters of
    /// the given granularity level (1 = coarsest, 3 = finest) applied.
    pub fn for_level(&self, level: usize) -> RuntimeConfig {
        let mut config = self.clone();
        let overrides = match level {
            1 => &self.granularity.level1,
            2 => &self.granularity.level2,
            _ => &self.granularity.level3,
        };
        config.mfcc.window_length = overrides.window_length;
        config.mfcc.window_shift = overrides.window_shift;
        config.mfcc.mask_nonspeech = overrides.mask_nonspeech;
        config
    }

    /// Check parameter ranges, returning the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audio.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".into()));
        }
        if self.mfcc.filters == 0 || self.mfcc.size == 0 || self.mfcc.fft_order == 0 {
            return Err(ConfigError::Invalid(
                "mfcc filters, size, and fft_order must be positive".into(),
            ));
        }
        if self.mfcc.size > self.mfcc.filters {
            return Err(ConfigError::Invalid(
                "mfcc size cannot exceed the number of mel filters".into(),
            ));
        }
        if self.mfcc.window_length <= TimeValue::ZERO
            || self.mfcc.window_shift <= TimeValue::ZERO
        {
            return Err(ConfigError::Invalid(
                "mfcc window length and shift must be positive".into(),
            ));
        }
        if self.mfcc.lower_frequency < 0.0
            || self.mfcc.upper_frequency <= self.mfcc.lower_frequency
        {
            return Err(ConfigError::Invalid(
                "mel band must satisfy 0 <= lower < upper".into(),
            ));
        }
        if self.mfcc.upper_frequency > f64::from(self.audio.sample_rate) / 2.0 {
            return Err(ConfigError::Invalid(
                "mel band upper frequency exceeds the Nyquist frequency".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.vad.log_energy_threshold) {
            return Err(ConfigError::Invalid(
                "vad log_energy_threshold must be in [0, 1]".into(),
            ));
        }
        if self.dtw.margin <= TimeValue::ZERO {
            return Err(ConfigError::Invalid("dtw margin must be positive".into()));
        }
        Ok(())
    }
}

/// Path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Root folder for temporary synthesis output.
    #[serde(default = "default_temp_root")]
    pub temp_root: String,
}

fn default_temp_root() -> String {
    ".temp".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            temp_root: default_temp_root(),
        }
    }
}

/// PCM input configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Sample rate of the PCM streams, in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_sample_rate() -> u32 {
    16000
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
        }
    }
}

/// MFCC extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MfccSettings {
    /// Number of triangular mel filters.
    #[serde(default = "default_filters")]
    pub filters: usize,

    /// Number of cepstral coefficients retained (including the
    /// log-energy coefficient in row 0).
    #[serde(default = "default_size")]
    pub size: usize,

    /// FFT size.
    #[serde(default = "default_fft_order")]
    pub fft_order: usize,

    /// Lower edge of the mel filter band, in Hz.
    #[serde(default = "default_lower_frequency")]
    pub lower_frequency: f64,

    /// Upper edge of the mel filter band, in Hz.
    #[serde(default = "default_upper_frequency")]
    pub upper_frequency: f64,

    /// Pre-emphasis factor.
    #[serde(default = "default_emphasis_factor")]
    pub emphasis_factor: f64,

    /// Analysis window length, in seconds.
    #[serde(default = "default_window_length")]
    pub window_length: TimeValue,

    /// Frame hop, in seconds.
    #[serde(default = "default_window_shift")]
    pub window_shift: TimeValue,

    /// Drop nonspeech frames before DTW.
    #[serde(default)]
    pub mask_nonspeech: bool,
}

fn default_filters() -> usize {
    40
}

fn default_size() -> usize {
    13
}

fn default_fft_order() -> usize {
    512
}

fn default_lower_frequency() -> f64 {
    133.3333
}

fn default_upper_frequency() -> f64 {
    6855.4976
}

fn default_emphasis_factor() -> f64 {
    0.97
}

fn default_window_length() -> TimeValue {
    tv("0.100")
}

fn default_window_shift() -> TimeValue {
    tv("0.040")
}

impl Default for MfccSettings {
    fn default() -> Self {
        Self {
            filters: default_filters(),
            size: default_size(),
            fft_order: default_fft_order(),
            lower_frequency: default_lower_frequency(),
            upper_frequency: default_upper_frequency(),
            emphasis_factor: default_emphasis_factor(),
            window_length: default_window_length(),
            window_shift: default_window_shift(),
            mask_nonspeech: false,
        }
    }
}

/// Voice activity detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadSettings {
    /// Fraction of the log-energy dynamic range above which a frame is
    /// classified as speech.
    #[serde(default = "default_log_energy_threshold")]
    pub log_energy_threshold: f64,

    /// Nonspeech runs shorter than this are reclassified as speech.
    #[serde(default = "default_min_nonspeech_length")]
    pub min_nonspeech_length: TimeValue,

    /// Pad each speech interval backwards by this much.
    #[serde(default)]
    pub extend_speech_before: TimeValue,

    /// Pad each speech interval forwards by this much.
    #[serde(default)]
    pub extend_speech_after: TimeValue,
}

fn default_log_energy_threshold() -> f64 {
    0.699
}

fn default_min_nonspeech_length() -> TimeValue {
    tv("0.500")
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            log_energy_threshold: default_log_energy_threshold(),
            min_nonspeech_length: default_min_nonspeech_length(),
            extend_speech_before: TimeValue::ZERO,
            extend_speech_after: TimeValue::ZERO,
        }
    }
}

/// DTW aligner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DtwSettings {
    /// Exact or banded algorithm.
    #[serde(default)]
    pub algorithm: DtwVariant,

    /// Band half-width, in seconds.
    #[serde(default = "default_margin")]
    pub margin: TimeValue,
}

fn default_margin() -> TimeValue {
    tv("60.000")
}

impl Default for DtwSettings {
    fn default() -> Self {
        Self {
            algorithm: DtwVariant::default(),
            margin: default_margin(),
        }
    }
}

/// Boundary adjustment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundarySettings {
    /// Minimum enforced fragment length, in seconds.
    #[serde(default = "default_no_zero_duration")]
    pub no_zero_duration: TimeValue,

    /// Endpoint tolerance for nonspeech injection, in seconds.
    #[serde(default = "default_nonspeech_tolerance")]
    pub nonspeech_tolerance: TimeValue,
}

fn default_no_zero_duration() -> TimeValue {
    tv("0.040")
}

fn default_nonspeech_tolerance() -> TimeValue {
    tv("0.080")
}

impl Default for BoundarySettings {
    fn default() -> Self {
        Self {
            no_zero_duration: default_no_zero_duration(),
            nonspeech_tolerance: default_nonspeech_tolerance(),
        }
    }
}

/// Input size caps; zero disables a cap.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LimitSettings {
    /// Maximum audio length, in seconds.
    #[serde(default)]
    pub max_audio_length: TimeValue,

    /// Maximum number of text fragments.
    #[serde(default)]
    pub max_fragments: usize,
}

/// MFCC window parameters of one granularity level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelSettings {
    /// Analysis window length, in seconds.
    pub window_length: TimeValue,
    /// Frame hop, in seconds.
    pub window_shift: TimeValue,
    /// Drop nonspeech frames before DTW at this level.
    #[serde(default)]
    pub mask_nonspeech: bool,
}

/// Per-level overrides for multilevel runs
/// (level 1 = paragraph, 2 = sentence, 3 = word).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GranularitySettings {
    /// Level 1 window parameters.
    #[serde(default = "default_level1")]
    pub level1: LevelSettings,

    /// Level 2 window parameters.
    #[serde(default = "default_level2")]
    pub level2: LevelSettings,

    /// Level 3 window parameters.
    #[serde(default = "default_level3")]
    pub level3: LevelSettings,
}

fn default_level1() -> LevelSettings {
    LevelSettings {
        window_length: tv("0.100"),
        window_shift: tv("0.040"),
        mask_nonspeech: false,
    }
}

fn default_level2() -> LevelSettings {
    LevelSettings {
        window_length: tv("0.050"),
        window_shift: tv("0.020"),
        mask_nonspeech: false,
    }
}

fn default_level3() -> LevelSettings {
    LevelSettings {
        window_length: tv("0.020"),
        window_shift: tv("0.005"),
        mask_nonspeech: false,
    }
}

impl Default for GranularitySettings {
    fn default() -> Self {
        Self {
            level1: default_level1(),
            level2: default_level2(),
            level3: default_level3(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = RuntimeConfig::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[mfcc]"));
        assert!(toml.contains("[vad]"));
        assert!(toml.contains("sample_rate"));
    }

    #[test]
    fn config_round_trip() {
        let config = RuntimeConfig::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: RuntimeConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.audio.sample_rate, config.audio.sample_rate);
        assert_eq!(parsed.mfcc.window_shift, config.mfcc.window_shift);
        assert_eq!(parsed.dtw.algorithm, config.dtw.algorithm);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let minimal = "[audio]\nsample_rate = 22050";
        let parsed: RuntimeConfig = toml::from_str(minimal).unwrap();
        assert_eq!(parsed.audio.sample_rate, 22050);
        assert_eq!(parsed.mfcc.filters, 40);
        assert_eq!(parsed.mfcc.window_shift, tv("0.040"));
        assert!(parsed.safety_checks);
    }

    #[test]
    fn for_level_applies_window_overrides() {
        let config = RuntimeConfig::default();
        let l2 = config.for_level(2);
        assert_eq!(l2.mfcc.window_length, tv("0.050"));
        assert_eq!(l2.mfcc.window_shift, tv("0.020"));
        let l3 = config.for_level(3);
        assert_eq!(l3.mfcc.window_shift, tv("0.005"));
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut config = RuntimeConfig::default();
        config.vad.log_energy_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = RuntimeConfig::default();
        config.mfcc.upper_frequency = 9000.0;
        assert!(config.validate().is_err(), "above Nyquist for 16 kHz");

        assert!(RuntimeConfig::default().validate().is_ok());
    }
}
