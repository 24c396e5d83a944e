//! Configuration loading and validation for Sidekick.
//!
//! Loads configuration from `~/.sidekick/config.toml` with environment
//! variable overrides. The resulting [`AssistantConfig`] is immutable and
//! passed explicitly at agent construction — there is no ambient global
//! state threaded through constructors.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which self-critique protocol an agent runs after answering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionMode {
    /// No second pass
    #[default]
    Off,
    /// Inline good/bad classification inside the agent
    Inline,
    /// The finished/suggest/revise service protocol
    Service,
}

/// Backend endpoint settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key (overridable via `SIDEKICK_API_KEY`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model used for free-form answers
    #[serde(default = "default_model")]
    pub model: String,

    /// Model used for tool selection (defaults to `model`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_model: Option<String>,

    /// Fixed request deadline in seconds; an elapsed deadline surfaces as an
    /// error thought, not a hang
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            tools_model: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl BackendConfig {
    /// The model used for the tool-selection step.
    pub fn tools_model(&self) -> &str {
        self.tools_model.as_deref().unwrap_or(&self.model)
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("tools_model", &self.tools_model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// The immutable assistant configuration passed at agent construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Preferred answer language, appended to generated system prompts
    #[serde(default = "default_language")]
    pub language: String,

    /// Whether screenshots may be sent as image parts
    #[serde(default)]
    pub use_multimodal: bool,

    /// Which self-critique protocol runs after an answer
    #[serde(default)]
    pub reflection: ReflectionMode,

    /// Maximum revision passes for the service reflection protocol
    #[serde(default = "default_max_revisions")]
    pub max_revisions: usize,

    /// Whether an unknown command falls back to plain chat instead of an
    /// "Unexpected tool call" error
    #[serde(default = "default_true")]
    pub enable_chitchat: bool,

    /// Backend endpoint settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Directory for persisted conversations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversations_dir: Option<PathBuf>,
}

fn default_language() -> String {
    "English".into()
}
fn default_max_revisions() -> usize {
    2
}
fn default_true() -> bool {
    true
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            use_multimodal: false,
            reflection: ReflectionMode::default(),
            max_revisions: default_max_revisions(),
            enable_chitchat: true,
            backend: BackendConfig::default(),
            conversations_dir: None,
        }
    }
}

impl AssistantConfig {
    /// Default config file path: `~/.sidekick/config.toml`.
    pub fn default_path() -> PathBuf {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".sidekick").join("config.toml")
    }

    /// Load from a TOML file, falling back to defaults when the file does
    /// not exist, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
            debug!(path = %path.display(), "Loaded configuration");
            parsed
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `SIDEKICK_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("SIDEKICK_API_KEY")
            && !key.is_empty()
        {
            self.backend.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("SIDEKICK_BASE_URL")
            && !url.is_empty()
        {
            self.backend.base_url = url;
        }
        if let Ok(model) = std::env::var("SIDEKICK_MODEL")
            && !model.is_empty()
        {
            self.backend.model = model;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.base_url.is_empty() {
            return Err(ConfigError::Invalid("backend.base_url is empty".into()));
        }
        if self.backend.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "backend.timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_are_valid() {
        let config = AssistantConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.reflection, ReflectionMode::Off);
        assert!(config.enable_chitchat);
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let config =
            AssistantConfig::load(Path::new("/nonexistent/sidekick/config.toml")).unwrap();
        assert_eq!(config.language, "English");
    }

    #[test]
    fn load_from_toml() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            r#"
language = "Chinese"
use_multimodal = true
reflection = "inline"

[backend]
base_url = "http://localhost:11434/v1"
model = "llama3"
timeout_secs = 30
"#,
        )
        .unwrap();

        let config = AssistantConfig::load(&path).unwrap();
        assert_eq!(config.language, "Chinese");
        assert!(config.use_multimodal);
        assert_eq!(config.reflection, ReflectionMode::Inline);
        assert_eq!(config.backend.model, "llama3");
        assert_eq!(config.backend.timeout_secs, 30);
    }

    #[test]
    fn zero_timeout_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[backend]\ntimeout_secs = 0\n").unwrap();
        assert!(AssistantConfig::load(&path).is_err());
    }

    #[test]
    fn tools_model_falls_back_to_model() {
        let backend = BackendConfig::default();
        assert_eq!(backend.tools_model(), backend.model);

        let backend = BackendConfig {
            tools_model: Some("gpt-4o".into()),
            ..Default::default()
        };
        assert_eq!(backend.tools_model(), "gpt-4o");
    }

    #[test]
    fn debug_redacts_api_key() {
        let backend = BackendConfig {
            api_key: Some("sk-secret".into()),
            ..Default::default()
        };
        let rendered = format!("{backend:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("REDACTED"));
    }
}
