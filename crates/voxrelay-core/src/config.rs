//! Configuration types for the voxrelay pipeline

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Sentence segmentation settings (origin side)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Candidates shorter than this many characters keep accumulating
    #[serde(default = "default_min_fragment_chars")]
    pub min_fragment_chars: usize,

    /// Symbols accepted as a sentence or clause break
    #[serde(default = "default_terminators")]
    pub terminators: Vec<char>,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_fragment_chars: default_min_fragment_chars(),
            terminators: default_terminators(),
        }
    }
}

impl SegmenterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_fragment_chars == 0 {
            return Err(Error::Config(
                "min_fragment_chars must be at least 1".to_string(),
            ));
        }
        if self.terminators.is_empty() {
            return Err(Error::Config("terminators must not be empty".to_string()));
        }
        Ok(())
    }
}

fn default_min_fragment_chars() -> usize {
    12
}

fn default_terminators() -> Vec<char> {
    vec![
        '，', '。', ',', '.', ':', '：', '?', '？', '!', '！', ';', '；',
    ]
}

/// Speech queue settings (consumer side)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechQueueConfig {
    /// Upper bound for a single synthesis call
    #[serde(default = "default_synthesis_timeout_ms")]
    pub synthesis_timeout_ms: u64,

    /// Delay between checks while the sink is being recreated
    #[serde(default = "default_sink_poll_interval_ms")]
    pub sink_poll_interval_ms: u64,
}

impl Default for SpeechQueueConfig {
    fn default() -> Self {
        Self {
            synthesis_timeout_ms: default_synthesis_timeout_ms(),
            sink_poll_interval_ms: default_sink_poll_interval_ms(),
        }
    }
}

impl SpeechQueueConfig {
    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_millis(self.synthesis_timeout_ms)
    }

    pub fn sink_poll_interval(&self) -> Duration {
        Duration::from_millis(self.sink_poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.synthesis_timeout_ms == 0 {
            return Err(Error::Config(
                "synthesis_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_synthesis_timeout_ms() -> u64 {
    10_000
}

fn default_sink_poll_interval_ms() -> u64 {
    10
}

/// Conversation controller settings (consumer side)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Utterances are truncated to this many characters before dispatch
    #[serde(default = "default_max_utterance_chars")]
    pub max_utterance_chars: usize,

    #[serde(default)]
    pub speech: SpeechQueueConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_utterance_chars: default_max_utterance_chars(),
            speech: SpeechQueueConfig::default(),
        }
    }
}

fn default_max_utterance_chars() -> usize {
    4096
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_cors_enabled")]
    pub cors_enabled: bool,

    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Incoming utterances are truncated to this many characters
    #[serde(default = "default_max_utterance_chars")]
    pub max_utterance_chars: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: default_cors_enabled(),
            cors_origins: default_cors_origins(),
            max_utterance_chars: default_max_utterance_chars(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4321
}

fn default_cors_enabled() -> bool {
    true
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

/// Chat model endpoint (OpenAI-compatible streaming API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_base_url")]
    pub base_url: String,

    #[serde(default = "default_model_name")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_model_base_url(),
            model: default_model_name(),
            api_key: None,
            temperature: default_temperature(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_model_base_url() -> String {
    "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string()
}

fn default_model_name() -> String {
    "qwen-max".to_string()
}

fn default_temperature() -> f32 {
    0.9
}

fn default_system_prompt() -> String {
    "You are a friendly personal assistant.".to_string()
}

/// Speech-service token issuance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechTokenConfig {
    #[serde(default)]
    pub key: Option<String>,

    #[serde(default)]
    pub region: Option<String>,

    /// `{region}` is replaced with the configured region
    #[serde(default = "default_token_endpoint")]
    pub endpoint_template: String,
}

impl Default for SpeechTokenConfig {
    fn default() -> Self {
        Self {
            key: None,
            region: None,
            endpoint_template: default_token_endpoint(),
        }
    }
}

impl SpeechTokenConfig {
    /// Key and region, if both are configured and non-empty
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let key = self.key.as_deref().filter(|k| !k.is_empty())?;
        let region = self.region.as_deref().filter(|r| !r.is_empty())?;
        Some((key, region))
    }

    /// Like [`credentials`](Self::credentials), but missing values are a
    /// configuration error
    pub fn require_credentials(&self) -> Result<(&str, &str)> {
        self.credentials().ok_or_else(|| {
            Error::Config(
                "Speech key or region is not configured (speech_token.key / speech_token.region)"
                    .to_string(),
            )
        })
    }

    pub fn endpoint_for(&self, region: &str) -> String {
        self.endpoint_template.replace("{region}", region)
    }
}

fn default_token_endpoint() -> String {
    "https://{region}.api.cognitive.microsoft.com/sts/v1.0/issueToken".to_string()
}

/// Interaction log location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_path")]
    pub path: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
        }
    }
}

fn default_history_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("voxrelay")
        .join("history-info.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let segmenter = SegmenterConfig::default();
        assert_eq!(segmenter.min_fragment_chars, 12);
        assert!(segmenter.terminators.contains(&'。'));
        assert!(segmenter.terminators.contains(&';'));
        assert_eq!(ServerConfig::default().port, 4321);
        assert_eq!(
            SpeechQueueConfig::default().synthesis_timeout(),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let config: SegmenterConfig =
            serde_json::from_str(r#"{ "min_fragment_chars": 5 }"#).unwrap();
        assert_eq!(config.min_fragment_chars, 5);
        assert_eq!(config.terminators.len(), 12);
    }

    #[test]
    fn test_token_credentials_require_both_fields() {
        let mut config = SpeechTokenConfig {
            key: Some("secret".into()),
            ..Default::default()
        };
        assert!(config.credentials().is_none());

        assert!(matches!(config.require_credentials(), Err(Error::Config(_))));

        config.region = Some("eastasia".into());
        assert_eq!(config.credentials(), Some(("secret", "eastasia")));
        assert_eq!(config.require_credentials().unwrap(), ("secret", "eastasia"));
        assert_eq!(
            config.endpoint_for("eastasia"),
            "https://eastasia.api.cognitive.microsoft.com/sts/v1.0/issueToken"
        );
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let segmenter = SegmenterConfig {
            min_fragment_chars: 0,
            ..Default::default()
        };
        assert!(segmenter.validate().is_err());
        assert!(SegmenterConfig::default().validate().is_ok());

        let speech = SpeechQueueConfig {
            synthesis_timeout_ms: 0,
            ..Default::default()
        };
        assert!(speech.validate().is_err());
    }
}
