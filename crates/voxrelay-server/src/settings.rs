//! Server settings loading
//!
//! Priority (highest to lowest):
//! 1. Environment variables (`VOXRELAY_` prefix, `__` between sections,
//!    e.g. `VOXRELAY_SPEECH_TOKEN__KEY`)
//! 2. The config file passed on the command line, or `./voxrelay.toml` if present
//! 3. Built-in defaults

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use voxrelay_core::{HistoryConfig, ModelConfig, SegmenterConfig, ServerConfig, SpeechTokenConfig};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid settings: {0}")]
    Invalid(#[from] voxrelay_core::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub segmenter: SegmenterConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub speech_token: SpeechTokenConfig,

    #[serde(default)]
    pub history: HistoryConfig,
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.segmenter.validate()?;
        if self.server.max_utterance_chars == 0 {
            return Err(voxrelay_core::Error::Config(
                "server.max_utterance_chars must be at least 1".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

pub fn load_settings(path: Option<&str>) -> Result<Settings, SettingsError> {
    let file = match path {
        Some(path) => File::with_name(path).required(true),
        None => File::with_name("voxrelay").required(false),
    };

    let settings: Settings = Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix("VOXRELAY")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    settings.validate()?;
    Ok(settings)
}
