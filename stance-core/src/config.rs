//! Configuration management for Stance.
//!
//! Configuration is loaded in order of precedence:
//! 1. Defaults
//! 2. Config file (~/.stance/config.toml)
//! 3. Environment variables
//! 4. CLI flags (handled at CLI layer)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Gemini CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Path to the gemini binary (default: "gemini")
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Model used to summarize each chunk
    #[serde(default = "default_analyzer_model")]
    pub analyzer_model: String,

    /// Model used to merge chunk summaries (falls back to the analyzer model)
    #[serde(default)]
    pub summarizer_model: Option<String>,

    /// Model used to write replies
    #[serde(default = "default_generator_model")]
    pub generator_model: String,

    /// System prompt prepended to every call (optional)
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Per-call timeout in seconds (0 = no timeout)
    #[serde(default = "default_gemini_timeout")]
    pub timeout_secs: u64,
}

fn default_binary() -> String {
    "gemini".to_string()
}

fn default_analyzer_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_generator_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_gemini_timeout() -> u64 {
    300
}

impl GeminiConfig {
    /// The model used for the reduction call
    pub fn summarizer_model(&self) -> &str {
        self.summarizer_model
            .as_deref()
            .unwrap_or(&self.analyzer_model)
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            analyzer_model: default_analyzer_model(),
            summarizer_model: None,
            generator_model: default_generator_model(),
            system_prompt: None,
            timeout_secs: default_gemini_timeout(),
        }
    }
}

/// Forum gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForumConfig {
    /// Base URL of the JSON forum gateway
    #[serde(default = "default_forum_url")]
    pub base_url: String,

    /// HTTP timeout in seconds
    #[serde(default = "default_forum_timeout")]
    pub timeout_secs: u64,

    /// How many posts per page get their nested replies fetched
    #[serde(default = "default_max_comment_posts")]
    pub max_comment_posts: usize,
}

fn default_forum_url() -> String {
    "http://127.0.0.1:8787".to_string()
}

fn default_forum_timeout() -> u64 {
    30
}

fn default_max_comment_posts() -> usize {
    50
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            base_url: default_forum_url(),
            timeout_secs: default_forum_timeout(),
            max_comment_posts: default_max_comment_posts(),
        }
    }
}

/// Chunked analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Pages summarized together in one analyzer call
    #[serde(default = "default_pages_per_chunk")]
    pub pages_per_chunk: u32,

    /// Discussion text cap (in characters) for one analyzer prompt
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Discussion text cap (in characters) for the reply prompt
    #[serde(default = "default_max_reply_context_chars")]
    pub max_reply_context_chars: usize,
}

fn default_pages_per_chunk() -> u32 {
    4
}

fn default_max_chunk_chars() -> usize {
    20_000
}

fn default_max_reply_context_chars() -> usize {
    15_000
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            pages_per_chunk: default_pages_per_chunk(),
            max_chunk_chars: default_max_chunk_chars(),
            max_reply_context_chars: default_max_reply_context_chars(),
        }
    }
}

/// Analysis cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
}

fn default_cache_enabled() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// A persona the reply generator can write as
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplyMode {
    pub name: String,
    pub role: String,
    pub task: String,
}

impl ReplyMode {
    fn new(name: &str, role: &str, task: &str) -> Self {
        Self {
            name: name.to_string(),
            role: role.to_string(),
            task: task.to_string(),
        }
    }
}

/// Reply generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyConfig {
    /// Rules appended to every reply prompt
    #[serde(default = "default_reply_rules")]
    pub rules: Vec<String>,

    #[serde(default = "default_reply_modes")]
    pub modes: Vec<ReplyMode>,
}

fn default_reply_rules() -> Vec<String> {
    vec![
        "Write like a regular forum member, not like an assistant.".to_string(),
        "Keep it under 120 words.".to_string(),
        "Do not mention that the discussion was analyzed.".to_string(),
    ]
}

fn default_reply_modes() -> Vec<ReplyMode> {
    vec![
        ReplyMode::new(
            "supporter",
            "You are a long-time member of this forum who tends to side with the majority.",
            "Back the position most participants hold and add one concrete argument of your own.",
        ),
        ReplyMode::new(
            "skeptic",
            "You are a sharp but polite contrarian.",
            "Challenge the dominant position and point out what the discussion has overlooked.",
        ),
        ReplyMode::new(
            "mediator",
            "You are a calm regular who dislikes flame wars.",
            "Acknowledge each side fairly and propose a point everyone could agree on.",
        ),
    ]
}

impl ReplyConfig {
    /// Look up a configured mode by name (case-insensitive)
    pub fn mode(&self, name: &str) -> Option<&ReplyMode> {
        self.modes.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            rules: default_reply_rules(),
            modes: default_reply_modes(),
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gemini: GeminiConfig,

    #[serde(default)]
    pub forum: ForumConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub reply: ReplyConfig,
}

impl Config {
    /// Returns the default Stance configuration directory (~/.stance)
    pub fn stance_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".stance"))
    }

    /// Returns the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        Self::stance_dir().map(|d| d.join("config.toml"))
    }

    /// Returns the default analysis cache path
    pub fn default_cache_path() -> Option<PathBuf> {
        Self::stance_dir().map(|d| d.join("cache.db"))
    }

    /// Returns the default prompts directory
    pub fn prompts_dir() -> Option<PathBuf> {
        Self::stance_dir().map(|d| d.join("prompts"))
    }

    /// Load configuration from the default path with environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::default_config_path() {
            Some(path) if path.exists() => Self::load_from_file(&path)?,
            _ => Config::default(),
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var("STANCE_ANALYZER_MODEL") {
            self.gemini.analyzer_model = model;
        }

        if let Ok(model) = std::env::var("STANCE_SUMMARIZER_MODEL") {
            self.gemini.summarizer_model = Some(model);
        }

        if let Ok(model) = std::env::var("STANCE_GENERATOR_MODEL") {
            self.gemini.generator_model = model;
        }

        if let Ok(binary) = std::env::var("STANCE_GEMINI_BINARY") {
            self.gemini.binary = binary;
        }

        if let Ok(url) = std::env::var("STANCE_FORUM_URL") {
            self.forum.base_url = url;
        }

        if let Ok(pages) = std::env::var("STANCE_PAGES_PER_CHUNK") {
            if let Ok(pages) = pages.parse() {
                self.analysis.pages_per_chunk = pages;
            }
        }

        if let Ok(level) = std::env::var("STANCE_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.analysis.pages_per_chunk == 0 {
            return Err(ConfigError::ValidationError(
                "analysis.pages_per_chunk must be at least 1".to_string(),
            ));
        }
        if self.forum.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "forum.base_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(path) = Self::default_config_path() {
            self.save_to_file(&path)
        } else {
            Err(ConfigError::ValidationError(
                "Could not determine config path".to_string(),
            ))
        }
    }

    /// Save configuration to a specific file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Ensure the Stance directory and subdirectories exist
    pub fn ensure_dirs() -> std::io::Result<()> {
        if let Some(stance_dir) = Self::stance_dir() {
            std::fs::create_dir_all(&stance_dir)?;
            std::fs::create_dir_all(stance_dir.join("prompts"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gemini.binary, "gemini");
        assert_eq!(config.gemini.analyzer_model, "gemini-2.5-flash");
        assert_eq!(config.gemini.summarizer_model(), "gemini-2.5-flash");
        assert_eq!(config.analysis.pages_per_chunk, 4);
        assert_eq!(config.forum.max_comment_posts, 50);
        assert!(config.cache.enabled);
        assert_eq!(config.reply.modes.len(), 3);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.analysis.pages_per_chunk, parsed.analysis.pages_per_chunk);
        assert_eq!(config.reply.modes, parsed.reply.modes);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[analysis]
pages_per_chunk = 2

[gemini]
summarizer_model = "gemini-2.5-pro"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.analysis.pages_per_chunk, 2);
        assert_eq!(config.gemini.summarizer_model(), "gemini-2.5-pro");
        // Defaults still applied
        assert_eq!(config.analysis.max_chunk_chars, 20_000);
        assert_eq!(config.gemini.analyzer_model, "gemini-2.5-flash");
    }

    #[test]
    fn test_zero_pages_per_chunk_rejected() {
        let mut config = Config::default();
        config.analysis.pages_per_chunk = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_reply_mode_lookup() {
        let config = ReplyConfig::default();
        assert!(config.mode("Skeptic").is_some());
        assert!(config.mode("troll").is_none());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.forum.base_url = "http://forum.local:9000".to_string();
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.forum.base_url, "http://forum.local:9000");
    }
}
