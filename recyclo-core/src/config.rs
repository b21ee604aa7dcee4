//! Application configuration loaded from TOML with environment overrides.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aggregate::DEFAULT_SECONDARY_COUNT;
use crate::classifier::LoadPolicy;
use crate::ports::ModelAssets;
use crate::synonyms::{DEFAULT_FALLBACK_LIMIT, SynonymMap, SynonymRule};

/// Overrides the data store endpoint.
pub const ENV_STORE_URL: &str = "RECYCLO_STORE_URL";
/// Overrides the data store API key.
pub const ENV_STORE_KEY: &str = "RECYCLO_STORE_KEY";
/// Overrides the model location.
pub const ENV_MODEL_URI: &str = "RECYCLO_MODEL_URI";
/// Overrides the metadata location.
pub const ENV_METADATA_URI: &str = "RECYCLO_METADATA_URI";

#[derive(thiserror::Error, Debug)]
/// Errors raised while reading configuration.
pub enum ConfigError {
    /// File could not be read.
    #[error("Cannot read {path}: {source}")]
    Io {
        /// File that failed.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// File is not valid TOML for this schema.
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// Values are out of range.
    #[error("Invalid configuration value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Model asset locations and load policy.
pub struct ModelConfig {
    /// Model weights path or URI.
    pub model_uri: String,
    /// Label metadata path or URI.
    pub metadata_uri: String,
    /// Attempts per load sequence.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub retry_delay_ms: u64,
    /// Deadline per attempt.
    pub timeout_ms: u64,
    /// Wait before the background load starts.
    pub startup_delay_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let policy = LoadPolicy::default();
        Self {
            model_uri: "./model/model.onnx".to_owned(),
            metadata_uri: "./model/metadata.json".to_owned(),
            max_attempts: policy.max_attempts,
            retry_delay_ms: duration_ms(policy.retry_delay),
            timeout_ms: duration_ms(policy.timeout),
            startup_delay_ms: duration_ms(policy.startup_delay),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Remote data store endpoint.
pub struct StoreConfig {
    /// Project base URL.
    pub url: String,
    /// Anonymous API key.
    pub api_key: String,
    /// Deadline per query.
    pub lookup_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            lookup_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Result view shaping.
pub struct ResultsConfig {
    /// Runner-up predictions to show.
    pub secondary_count: usize,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            secondary_count: DEFAULT_SECONDARY_COUNT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Fallback matching policy.
pub struct MatchingConfig {
    /// Cap for labels without their own limit.
    pub default_limit: usize,
    /// Replaces the built-in synonym rules when present.
    pub synonyms: Option<HashMap<String, SynonymRule>>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_FALLBACK_LIMIT,
            synonyms: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Top-level configuration.
pub struct AppConfig {
    /// Classifier settings.
    pub model: ModelConfig,
    /// Data store settings.
    pub store: StoreConfig,
    /// Result view settings.
    pub results: ResultsConfig,
    /// Fallback matching settings.
    pub matching: MatchingConfig,
}

impl AppConfig {
    /// Parse configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file is unreadable and
    /// [`ConfigError::Parse`] when it is malformed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply overrides from the process environment.
    #[must_use]
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    #[must_use]
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(url) = non_empty(ENV_STORE_URL) {
            self.store.url = url;
        }
        if let Some(key) = non_empty(ENV_STORE_KEY) {
            self.store.api_key = key;
        }
        if let Some(uri) = non_empty(ENV_MODEL_URI) {
            self.model.model_uri = uri;
        }
        if let Some(uri) = non_empty(ENV_METADATA_URI) {
            self.model.metadata_uri = uri;
        }
        self
    }

    /// Check values that would make the pipeline unusable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "model.max_attempts must be at least 1".to_owned(),
            ));
        }
        if self.store.url.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "store.url is empty; set it in the config file or {ENV_STORE_URL}"
            )));
        }
        if self.matching.default_limit == 0 {
            return Err(ConfigError::Invalid(
                "matching.default_limit must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    /// Model asset pair.
    #[must_use]
    pub fn assets(&self) -> ModelAssets {
        ModelAssets::new(&self.model.model_uri, &self.model.metadata_uri)
    }

    /// Load policy for the classifier adapter.
    #[must_use]
    pub fn load_policy(&self) -> LoadPolicy {
        LoadPolicy {
            max_attempts: self.model.max_attempts,
            retry_delay: Duration::from_millis(self.model.retry_delay_ms),
            timeout: Duration::from_millis(self.model.timeout_ms),
            startup_delay: Duration::from_millis(self.model.startup_delay_ms),
        }
    }

    /// Deadline per data store query.
    #[must_use]
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.store.lookup_timeout_ms)
    }

    /// Fallback policy: configured rules, or the built-in ones.
    #[must_use]
    pub fn synonym_map(&self) -> SynonymMap {
        match &self.matching.synonyms {
            Some(rules) => SynonymMap::new(
                self.matching.default_limit,
                rules
                    .iter()
                    .map(|(label, rule)| (label.clone(), rule.clone())),
            ),
            None => SynonymMap::builtin().with_default_limit(self.matching.default_limit),
        }
    }
}
