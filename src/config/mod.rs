//! Configuration for courseintel

mod extraction;
mod genai;

pub use extraction::{DiscoveryConfig, ExtractionConfig};
pub use genai::GenAiConfig;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default user agent for all HTTP requests (discovery, page fetching,
/// script-bundle fetching)
pub const DEFAULT_USER_AGENT: &str = "CourseIntelBot/1.0 (+https://github.com/courseintel)";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Persistence configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Discovery and fetch configuration
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// Subpage discovery configuration
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Generative provider configuration
    #[serde(default)]
    pub genai: GenAiConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            extraction: ExtractionConfig::default(),
            discovery: DiscoveryConfig::default(),
            genai: GenAiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together so the user
    /// can fix everything in one pass.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.extraction.max_concurrent_fetches == 0 {
            errors.push("max_concurrent_fetches must be positive".to_string());
        }
        if self.extraction.max_concurrent_fetches > 32 {
            errors.push("max_concurrent_fetches must be <= 32".to_string());
        }
        if self.extraction.request_timeout_secs == 0 {
            errors.push("request_timeout_secs must be positive".to_string());
        }
        if self.discovery.max_seed_urls == 0 {
            errors.push("max_seed_urls must be positive".to_string());
        }
        if self.discovery.max_candidates == 0 {
            errors.push("max_candidates must be positive".to_string());
        }
        if self.genai.model.trim().is_empty() {
            errors.push("genai model must not be empty".to_string());
        }
        if self.genai.draft_max_tokens == 0 {
            errors.push("genai draft_max_tokens must be positive".to_string());
        }
        if self.genai.retry_max_tokens < self.genai.draft_max_tokens {
            errors.push("genai retry_max_tokens must be >= draft_max_tokens".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("Invalid configuration:\n  - {}", errors.join("\n  - "))
        }
    }

    /// Serialize to TOML for `init`
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Data directory for the embedded database
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Level filter, overridable via RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = Config::default();
        config.extraction.max_concurrent_fetches = 0;
        config.genai.model = String::new();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_concurrent_fetches"));
        assert!(err.contains("model"));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let toml_str = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert!(parsed.validate().is_ok());
    }
}
