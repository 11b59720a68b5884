//! Configuration loading, validation, and management for Shihui.
//!
//! Loads configuration from `~/.shihui/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.shihui/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model id used when a request names none (or an unknown one)
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Completion models, keyed by model id
    #[serde(default = "default_models")]
    pub models: BTreeMap<String, ModelConfig>,

    /// Orchestration settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Tool settings (API keys, rate limits, disabled tools)
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Memory collaborator settings
    #[serde(default)]
    pub memory: MemoryConfig,
}

fn default_model() -> String {
    "deepseek".into()
}

fn default_models() -> BTreeMap<String, ModelConfig> {
    let mut models = BTreeMap::new();
    models.insert(
        "deepseek".to_string(),
        ModelConfig {
            name: "DeepSeek".into(),
            model: "deepseek-chat".into(),
            api_base: "https://api.deepseek.com/v1".into(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            enabled: true,
        },
    );
    models
}

fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    16384
}
fn default_true() -> bool {
    true
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

/// One OpenAI-compatible completion endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Display name
    pub name: String,

    /// Model name sent to the endpoint
    pub model: String,

    pub api_base: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("api_key", &redact(&self.api_key))
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Persona template for the final reply
    #[serde(default = "default_persona")]
    pub persona: String,

    /// Recent messages given to the model
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    #[serde(default = "default_planner_temperature")]
    pub planner_temperature: f32,

    #[serde(default = "default_planner_max_tokens")]
    pub planner_max_tokens: u32,

    /// Delay between streamed plan lines, in milliseconds
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
}

fn default_persona() -> String {
    "friendly_food_expert".into()
}
fn default_history_window() -> usize {
    10
}
fn default_planner_temperature() -> f32 {
    0.3
}
fn default_planner_max_tokens() -> u32 {
    1000
}
fn default_pacing_ms() -> u64 {
    300
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            persona: default_persona(),
            history_window: default_history_window(),
            planner_temperature: default_planner_temperature(),
            planner_max_tokens: default_planner_max_tokens(),
            pacing_ms: default_pacing_ms(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Tools registered but disabled at startup
    #[serde(default)]
    pub disabled: Vec<String>,

    /// Per-tool calls-per-minute overrides
    #[serde(default)]
    pub rate_limits: BTreeMap<String, u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amap_api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bing_api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openweather_api_key: Option<String>,

    /// City used by the weather tool when none is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_city: Option<String>,
}

impl std::fmt::Debug for ToolsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsConfig")
            .field("disabled", &self.disabled)
            .field("rate_limits", &self.rate_limits)
            .field("amap_api_key", &redact(&self.amap_api_key))
            .field("bing_api_key", &redact(&self.bing_api_key))
            .field("openweather_api_key", &redact(&self.openweather_api_key))
            .field("default_city", &self.default_city)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "in_memory", "openmemory" or "none"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    #[serde(default = "default_memory_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Records kept per user in the local store
    #[serde(default = "default_max_memories")]
    pub max_memories: usize,
}

fn default_memory_backend() -> String {
    "in_memory".into()
}
fn default_memory_url() -> String {
    "https://api.openmemory.ai".into()
}
fn default_max_memories() -> usize {
    100
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            base_url: default_memory_url(),
            api_key: None,
            max_memories: default_max_memories(),
        }
    }
}

impl std::fmt::Debug for MemoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConfig")
            .field("backend", &self.backend)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("max_memories", &self.max_memories)
            .finish()
    }
}

const MEMORY_BACKENDS: &[&str] = &["in_memory", "openmemory", "none"];

impl AppConfig {
    /// Load configuration from the default path (~/.shihui/config.toml).
    ///
    /// Environment variables fill in secrets the file leaves out:
    /// - `DEEPSEEK_API_KEY` for the `deepseek` model
    /// - `AMAP_API_KEY`, `BING_API_KEY`, `OPENWEATHER_API_KEY` for tools
    /// - `OPENMEMORY_API_KEY` for the memory service
    ///
    /// `SHIHUI_MODEL` overrides the default model id.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
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

    /// Apply overrides from an environment lookup. Values already set in the
    /// file win over the environment, except `SHIHUI_MODEL`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup("SHIHUI_MODEL") {
            self.default_model = model;
        }
        if let Some(deepseek) = self.models.get_mut("deepseek") {
            if deepseek.api_key.is_none() {
                deepseek.api_key = lookup("DEEPSEEK_API_KEY");
            }
        }
        if self.tools.amap_api_key.is_none() {
            self.tools.amap_api_key = lookup("AMAP_API_KEY");
        }
        if self.tools.bing_api_key.is_none() {
            self.tools.bing_api_key = lookup("BING_API_KEY");
        }
        if self.tools.openweather_api_key.is_none() {
            self.tools.openweather_api_key = lookup("OPENWEATHER_API_KEY");
        }
        if self.memory.api_key.is_none() {
            self.memory.api_key = lookup("OPENMEMORY_API_KEY");
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".shihui")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.models.contains_key(&self.default_model) {
            return Err(ConfigError::ValidationError(format!(
                "default_model '{}' is not defined under [models]",
                self.default_model
            )));
        }

        for (id, model) in &self.models {
            if !(0.0..=2.0).contains(&model.temperature) {
                return Err(ConfigError::ValidationError(format!(
                    "models.{id}.temperature must be between 0.0 and 2.0"
                )));
            }
            if model.max_tokens == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "models.{id}.max_tokens must be > 0"
                )));
            }
        }

        if !(0.0..=2.0).contains(&self.agent.planner_temperature) {
            return Err(ConfigError::ValidationError(
                "agent.planner_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.history_window == 0 {
            return Err(ConfigError::ValidationError(
                "agent.history_window must be > 0".into(),
            ));
        }

        if !MEMORY_BACKENDS.contains(&self.memory.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "memory.backend must be one of {MEMORY_BACKENDS:?}, got '{}'",
                self.memory.backend
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            models: default_models(),
            agent: AgentSettings::default(),
            tools: ToolsConfig::default(),
            memory: MemoryConfig::default(),
        }
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

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_model, "deepseek");
        assert_eq!(config.agent.history_window, 10);
        assert_eq!(config.agent.pacing_ms, 300);
        assert!((config.agent.planner_temperature - 0.3).abs() < f32::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let toml_str = AppConfig::default_toml();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_model, "deepseek");
        assert_eq!(parsed.models["deepseek"].model, "deepseek-chat");
    }

    #[test]
    fn unknown_default_model_rejected() {
        let config = AppConfig {
            default_model: "nope".into(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_memory_backend_rejected() {
        let mut config = AppConfig::default();
        config.memory.backend = "redis".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_model, "deepseek");
    }

    #[test]
    fn load_from_file_with_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_model = "qwen"

[models.qwen]
name = "Qwen"
model = "qwen-max"
api_base = "https://dashscope.aliyuncs.com/compatible-mode/v1"
temperature = 0.5

[tools]
disabled = ["bing_search"]

[tools.rate_limits]
image_search = 20
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.default_model, "qwen");
        assert_eq!(config.models["qwen"].max_tokens, 16384);
        assert_eq!(config.tools.disabled, vec!["bing_search"]);
        assert_eq!(config.tools.rate_limits["image_search"], 20);
        assert_eq!(config.agent.persona, "friendly_food_expert");
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_model = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_fills_missing_secrets_only() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("DEEPSEEK_API_KEY", "sk-env"),
            ("AMAP_API_KEY", "amap-env"),
            ("OPENMEMORY_API_KEY", "om-env"),
        ]);
        let mut config = AppConfig::default();
        config.tools.amap_api_key = Some("amap-file".into());
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.models["deepseek"].api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.tools.amap_api_key.as_deref(), Some("amap-file"));
        assert_eq!(config.memory.api_key.as_deref(), Some("om-env"));
        assert!(config.tools.bing_api_key.is_none());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = AppConfig::default();
        config.apply_env(|k| (k == "DEEPSEEK_API_KEY").then(|| "sk-secret".to_string()));
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
