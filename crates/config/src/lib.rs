//! Configuration loading, validation, and management for threadbot.
//!
//! Loads configuration from `~/.threadbot/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.threadbot/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Completion provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Speech-to-text settings
    #[serde(default)]
    pub transcription: TranscriptionConfig,

    /// Slack connection settings
    #[serde(default)]
    pub slack: SlackConfig,

    /// Live-edit delivery settings
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Agent behaviour
    #[serde(default)]
    pub agent: AgentConfig,

    /// Database settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Built-in tool endpoints and keys
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Whether `/set-openai-key` may replace the key at runtime
    #[serde(default)]
    pub allow_set_key: bool,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            temperature: None,
            max_tokens: None,
            allow_set_key: false,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("allow_set_key", &self.allow_set_key)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Falls back to the provider key when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Falls back to the provider URL when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default = "default_audio_model")]
    pub model: String,
}

fn default_audio_model() -> String {
    "whisper-1".into()
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: None,
            model: default_audio_model(),
        }
    }
}

impl std::fmt::Debug for TranscriptionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptionConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Bot token (xoxb-...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,

    /// App-level token (xapp-...) for Socket Mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_token: Option<String>,

    #[serde(default = "default_slack_api_url")]
    pub api_url: String,

    /// Display name used for posted messages
    #[serde(default = "default_username")]
    pub username: String,
}

fn default_slack_api_url() -> String {
    "https://slack.com/api".into()
}
fn default_username() -> String {
    "AI Assistant".into()
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            app_token: None,
            api_url: default_slack_api_url(),
            username: default_username(),
        }
    }
}

impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("bot_token", &redact(&self.bot_token))
            .field("app_token", &redact(&self.app_token))
            .field("api_url", &self.api_url)
            .field("username", &self.username)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Largest message body in UTF-8 bytes before a new message is started
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Minimum time between in-place edits
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Text of the message created before the first fragment arrives
    #[serde(default = "default_placeholder")]
    pub placeholder_text: String,
}

fn default_max_payload_bytes() -> usize {
    3000
}
fn default_flush_interval_ms() -> u64 {
    1000
}
fn default_placeholder() -> String {
    "(Thinking...)".into()
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
            flush_interval_ms: default_flush_interval_ms(),
            placeholder_text: default_placeholder(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Upper bound on model → tools → model rounds per turn
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
}

fn default_system_prompt() -> String {
    "You are a helpful assistant.".into()
}
fn default_max_tool_rounds() -> u32 {
    25
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_true")]
    pub cache_enabled: bool,
}

fn default_db_path() -> String {
    "db.sqlite".into()
}
fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cache_enabled: true,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_text_api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube_api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_search_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_search_cx: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bing_subscription_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bing_endpoint: Option<String>,
}

impl std::fmt::Debug for ToolsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsConfig")
            .field("browser_text_api_url", &self.browser_text_api_url)
            .field("github_api_url", &self.github_api_url)
            .field("pdf_api_url", &self.pdf_api_url)
            .field("youtube_api_url", &self.youtube_api_url)
            .field("google_search_key", &redact(&self.google_search_key))
            .field("google_search_cx", &self.google_search_cx)
            .field("bing_subscription_key", &redact(&self.bing_subscription_key))
            .field("bing_endpoint", &self.bing_endpoint)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.threadbot/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides. Environment always wins over the file.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let set = |slot: &mut Option<String>, key: &str| {
            if let Some(v) = var(key).filter(|v| !v.is_empty()) {
                *slot = Some(v);
            }
        };

        set(&mut self.provider.api_key, "OPENAI_API_KEY");
        if let Some(v) = var("OPENAI_MODEL") {
            self.provider.model = v;
        }
        if let Some(v) = var("OPENAI_BASE_URL") {
            self.provider.api_url = v;
        }
        if let Some(v) = var("ALLOW_SET_OPENAI_KEY") {
            self.provider.allow_set_key = v == "true";
        }

        set(&mut self.transcription.api_key, "WHISPER_API_KEY");
        set(&mut self.transcription.api_url, "WHISPER_BASE_URL");
        if let Some(v) = var("OPENAI_AUDIO_MODEL") {
            self.transcription.model = v;
        }

        set(&mut self.slack.bot_token, "SLACK_BOT_TOKEN");
        set(&mut self.slack.app_token, "SLACK_APP_TOKEN");

        if let Some(v) = var("DB_PATH") {
            self.storage.db_path = v;
        }

        set(&mut self.tools.browser_text_api_url, "BROWSER_TEXT_API_URL");
        set(&mut self.tools.github_api_url, "GITHUB_API_URL");
        set(&mut self.tools.pdf_api_url, "PDF_API_URL");
        set(&mut self.tools.youtube_api_url, "YOUTUBE_API_URL");
        set(&mut self.tools.google_search_key, "GOOGLE_SEARCH_KEY");
        set(&mut self.tools.google_search_cx, "GOOGLE_SEARCH_CX");
        set(&mut self.tools.bing_subscription_key, "BING_SEARCH_V7_SUBSCRIPTION_KEY");
        set(&mut self.tools.bing_endpoint, "BING_SEARCH_V7_ENDPOINT");
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".threadbot")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delivery.max_payload_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "delivery.max_payload_bytes must be > 0".into(),
            ));
        }

        if self.agent.max_tool_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_rounds must be > 0".into(),
            ));
        }

        if let Some(t) = self.provider.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        Ok(())
    }

    /// Transcription key, falling back to the completion key.
    pub fn transcription_api_key(&self) -> Option<&str> {
        self.transcription
            .api_key
            .as_deref()
            .or(self.provider.api_key.as_deref())
    }

    /// Transcription base URL, falling back to the completion URL.
    pub fn transcription_api_url(&self) -> &str {
        self.transcription
            .api_url
            .as_deref()
            .unwrap_or(&self.provider.api_url)
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.delivery.max_payload_bytes, 3000);
        assert_eq!(config.delivery.flush_interval_ms, 1000);
        assert_eq!(config.agent.system_prompt, "You are a helpful assistant.");
        assert_eq!(config.storage.db_path, "db.sqlite");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.provider.model, config.provider.model);
        assert_eq!(parsed.slack.username, "AI Assistant");
    }

    #[test]
    fn zero_payload_rejected() {
        let mut config = AppConfig::default();
        config.delivery.max_payload_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.provider.api_url, "https://api.openai.com/v1");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[delivery]\nflush_interval_ms = 250\n\n[agent]\nmax_tool_rounds = 4").unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.delivery.flush_interval_ms, 250);
        assert_eq!(config.delivery.max_payload_bytes, 3000);
        assert_eq!(config.agent.max_tool_rounds, 4);
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "gpt-4o-mini"),
            ("SLACK_BOT_TOKEN", "xoxb-1"),
            ("ALLOW_SET_OPENAI_KEY", "true"),
            ("DB_PATH", "/var/lib/threadbot.sqlite"),
            ("GOOGLE_SEARCH_KEY", ""),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.provider.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.provider.model, "gpt-4o-mini");
        assert_eq!(config.slack.bot_token.as_deref(), Some("xoxb-1"));
        assert!(config.provider.allow_set_key);
        assert_eq!(config.storage.db_path, "/var/lib/threadbot.sqlite");
        // Empty values do not count as configured
        assert!(config.tools.google_search_key.is_none());
    }

    #[test]
    fn transcription_falls_back_to_provider() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-main".into());
        assert_eq!(config.transcription_api_key(), Some("sk-main"));
        assert_eq!(config.transcription_api_url(), "https://api.openai.com/v1");

        config.transcription.api_url = Some("http://localhost:9000/v1".into());
        assert_eq!(config.transcription_api_url(), "http://localhost:9000/v1");
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-secret".into());
        config.slack.bot_token = Some("xoxb-secret".into());
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(!dbg.contains("xoxb-secret"));
        assert!(dbg.contains("[REDACTED]"));
    }
}
