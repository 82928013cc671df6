//! Runtime configuration.
//!
//! Loaded from an optional TOML file, then overridden from `STEPWISE_*`
//! environment variables. Every field has a default so an empty file is a
//! valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    /// Out-of-range value
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepwiseConfig {
    /// Reasoning service connection
    pub reasoning: ReasoningConfig,

    /// Judge call sampling
    pub judge: SamplingConfig,

    /// Tutor call sampling
    pub tutor: SamplingConfig,

    /// Safety filter rules
    pub safety: SafetyConfig,

    /// Storage location
    pub storage: StorageConfig,
}

impl Default for StepwiseConfig {
    fn default() -> Self {
        Self {
            reasoning: ReasoningConfig::default(),
            judge: default_judge(),
            tutor: default_tutor(),
            safety: SafetyConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Reasoning service (OpenAI-compatible chat completions endpoint).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    /// Base URL, e.g. a local Ollama server
    pub base_url: String,

    /// Model name
    pub model: String,

    /// Bearer token; Ollama ignores it
    pub api_key: String,

    /// HTTP client timeout
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: "qwen2.5-coder:3b".to_string(),
            api_key: "ollama".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Sampling and time bounds for one kind of reasoning call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Sampling temperature, 0.0..=1.0
    pub temperature: f32,

    /// Output token cap
    pub max_tokens: u32,

    /// Wall-clock bound on the call
    pub timeout_secs: u64,
}

impl SamplingConfig {
    /// Timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Judge: deterministic, a handful of tokens.
pub fn default_judge() -> SamplingConfig {
    SamplingConfig {
        temperature: 0.0,
        max_tokens: 5,
        timeout_secs: 20,
    }
}

/// Tutor: a little randomness, bounded length.
pub fn default_tutor() -> SamplingConfig {
    SamplingConfig {
        temperature: 0.2,
        max_tokens: 250,
        timeout_secs: 45,
    }
}

/// What a leak marker signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeakKind {
    /// Opens a type or procedure definition
    Definition,
    /// Import / include directive
    Import,
    /// Fenced code block delimiter
    Fence,
}

/// A token whose presence means the text contains code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakMarker {
    /// Literal, case-sensitive token
    pub token: String,

    /// Marker kind
    pub kind: LeakKind,
}

impl LeakMarker {
    /// Create a marker.
    pub fn new(token: impl Into<String>, kind: LeakKind) -> Self {
        Self {
            token: token.into(),
            kind,
        }
    }
}

/// Safety filter rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Any of these anywhere in tutor output discards the output
    pub leak_markers: Vec<LeakMarker>,

    /// Whole-line labels stripped from tutor output
    pub header_labels: Vec<String>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            leak_markers: vec![
                LeakMarker::new("class ", LeakKind::Definition),
                LeakMarker::new("def ", LeakKind::Definition),
                LeakMarker::new("fn ", LeakKind::Definition),
                LeakMarker::new("import ", LeakKind::Import),
                LeakMarker::new("#include", LeakKind::Import),
                LeakMarker::new("```", LeakKind::Fence),
            ],
            header_labels: [
                "instructions",
                "goal logic",
                "guiding question",
                "concept",
                "role",
                "persona",
                "current goal",
                "user message",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Storage location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".stepwise"),
        }
    }
}

impl StepwiseConfig {
    /// Load from a TOML file (or defaults when `path` is `None`), apply
    /// environment overrides, and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `STEPWISE_*` overrides from a variable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("STEPWISE_BASE_URL") {
            self.reasoning.base_url = url;
        }
        if let Some(model) = lookup("STEPWISE_MODEL") {
            self.reasoning.model = model;
        }
        if let Some(key) = lookup("STEPWISE_API_KEY") {
            self.reasoning.api_key = key;
        }
        if let Some(path) = lookup("STEPWISE_STORAGE") {
            self.storage.path = PathBuf::from(path);
        }
    }

    /// Reject out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reasoning.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "reasoning.request_timeout_secs",
                reason: "must be positive".to_string(),
            });
        }
        validate_sampling("judge", &self.judge)?;
        validate_sampling("tutor", &self.tutor)?;
        if self.safety.leak_markers.iter().any(|m| m.token.is_empty()) {
            return Err(ConfigError::Invalid {
                field: "safety.leak_markers",
                reason: "empty token would match everything".to_string(),
            });
        }
        Ok(())
    }
}

fn validate_sampling(field: &'static str, sampling: &SamplingConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&sampling.temperature) {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("temperature {} outside 0.0..=1.0", sampling.temperature),
        });
    }
    if sampling.max_tokens == 0 {
        return Err(ConfigError::Invalid {
            field,
            reason: "max_tokens must be at least 1".to_string(),
        });
    }
    if sampling.timeout_secs == 0 {
        return Err(ConfigError::Invalid {
            field,
            reason: "timeout_secs must be positive".to_string(),
        });
    }
    Ok(())
}
