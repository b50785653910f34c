use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::constants::{alignment, playback, speech};
use crate::text_assembler::CaseMode;
use crate::voice_samples::CapturePolicy;

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub composition: CompositionConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub alignment: AlignmentConfig,
    #[serde(default)]
    pub speech: SpeechProvider,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct CompositionConfig {
    #[serde(default)]
    pub case_mode: CaseMode,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlaybackConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

fn default_tick_interval() -> u64 {
    playback::TICK_INTERVAL_MS
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        PlaybackConfig {
            tick_interval_ms: default_tick_interval(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct RecordingConfig {
    #[serde(default)]
    pub capture_policy: CapturePolicy,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AlignmentConfig {
    #[serde(default = "default_clamp_warn_threshold")]
    pub clamp_warn_threshold_secs: f64,
}

fn default_clamp_warn_threshold() -> f64 {
    alignment::CLAMP_WARN_THRESHOLD_SECS
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        AlignmentConfig {
            clamp_warn_threshold_secs: default_clamp_warn_threshold(),
        }
    }
}

/// Speech provider selection, tagged by `provider` in YAML
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum SpeechProvider {
    /// Platform speech synthesis; reports no character timing
    Browser(BrowserVoice),
    /// Hosted neural voice returning audio plus character alignment
    CloudNeural(NeuralVoice),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Browser,
    CloudNeural,
}

impl SpeechProvider {
    pub fn kind(&self) -> ProviderKind {
        match self {
            SpeechProvider::Browser(_) => ProviderKind::Browser,
            SpeechProvider::CloudNeural(_) => ProviderKind::CloudNeural,
        }
    }

    /// Speaking rate used to estimate timing when the voice reports none
    pub fn estimated_chars_per_second(&self) -> Option<f32> {
        match self {
            SpeechProvider::Browser(voice) => Some(voice.chars_per_second * voice.rate),
            SpeechProvider::CloudNeural(_) => None,
        }
    }
}

impl Default for SpeechProvider {
    fn default() -> Self {
        SpeechProvider::Browser(BrowserVoice::default())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BrowserVoice {
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default = "default_rate")]
    pub rate: f32,
    #[serde(default = "default_chars_per_second")]
    pub chars_per_second: f32,
}

fn default_rate() -> f32 {
    1.0
}

fn default_chars_per_second() -> f32 {
    speech::BROWSER_CHARS_PER_SECOND
}

impl Default for BrowserVoice {
    fn default() -> Self {
        BrowserVoice {
            voice: None,
            rate: default_rate(),
            chars_per_second: default_chars_per_second(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NeuralVoice {
    pub voice_id: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_stability")]
    pub stability: f32,
    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f32,
}

fn default_model_id() -> String {
    speech::DEFAULT_NEURAL_MODEL.to_string()
}

fn default_stability() -> f32 {
    0.5
}

fn default_similarity_boost() -> f32 {
    0.75
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".voice-composer"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("settings.yaml"))
    }

    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            info!(path = %config_path.display(), "created default config");
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config =
            serde_yaml::from_str(&contents).context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.playback.tick_interval_ms == 0 {
            bail!("tick_interval_ms must be greater than 0");
        }
        if self.playback.tick_interval_ms > playback::MAX_TICK_INTERVAL_MS {
            bail!(
                "tick_interval_ms must be <= {}",
                playback::MAX_TICK_INTERVAL_MS
            );
        }

        let threshold = self.alignment.clamp_warn_threshold_secs;
        if !threshold.is_finite() || threshold < 0.0 {
            bail!("clamp_warn_threshold_secs must be a non-negative number");
        }

        match &self.speech {
            SpeechProvider::Browser(voice) => {
                if !(voice.rate > 0.0 && voice.rate <= 10.0) {
                    bail!("browser voice rate must be in (0, 10]");
                }
                if !(voice.chars_per_second > 0.0) {
                    bail!("chars_per_second must be greater than 0");
                }
            }
            SpeechProvider::CloudNeural(voice) => {
                if voice.voice_id.is_empty() {
                    bail!("voice_id cannot be empty");
                }
                if voice.model_id.is_empty() {
                    bail!("model_id cannot be empty");
                }
                if !(0.0..=1.0).contains(&voice.stability) {
                    bail!("stability must be between 0.0 and 1.0");
                }
                if !(0.0..=1.0).contains(&voice.similarity_boost) {
                    bail!("similarity_boost must be between 0.0 and 1.0");
                }
            }
        }

        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let yaml = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs::write(path, yaml).context("Failed to write config file")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.playback.tick_interval_ms, 50);
        assert_eq!(config.speech.kind(), ProviderKind::Browser);
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.yaml");

        let mut config = Config::default();
        config.composition.case_mode = CaseMode::SentenceCase;
        config.recording.capture_policy = CapturePolicy::RejectWhileHeld;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
speech:
  provider: cloud_neural
  voice_id: rachel
composition:
  case_mode: sentence_case
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.composition.case_mode, CaseMode::SentenceCase);
        assert_eq!(config.playback.tick_interval_ms, 50);
        match &config.speech {
            SpeechProvider::CloudNeural(voice) => {
                assert_eq!(voice.voice_id, "rachel");
                assert_eq!(voice.model_id, speech::DEFAULT_NEURAL_MODEL);
            }
            other => panic!("expected cloud voice, got {:?}", other),
        }
        assert!(config.validate().is_ok());
        assert_eq!(config.speech.estimated_chars_per_second(), None);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.playback.tick_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.speech = SpeechProvider::CloudNeural(NeuralVoice {
            voice_id: String::new(),
            model_id: default_model_id(),
            stability: 0.5,
            similarity_boost: 0.5,
        });
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.alignment.clamp_warn_threshold_secs = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_browser_rate_scales_estimate() {
        let provider = SpeechProvider::Browser(BrowserVoice {
            voice: None,
            rate: 2.0,
            chars_per_second: 10.0,
        });
        assert_eq!(provider.estimated_chars_per_second(), Some(20.0));
    }
}
