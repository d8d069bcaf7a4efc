//! Layered configuration.
//!
//! Sources, highest priority last:
//! 1. Built-in defaults
//! 2. `~/.config/rob2/config.toml`
//! 3. `./rob2.toml`
//! 4. `ROB2_*` environment variables, `__` separating sections
//!    (`ROB2_MODEL__NAME`, `ROB2_FILTER__CONTEXT_WINDOW`)

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::llm::Provider;

pub const ENV_PREFIX: &str = "ROB2_";
pub const LOCAL_CONFIG: &str = "rob2.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rob2Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: Provider,
    pub name: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Attempts per call, including the first.
    pub max_retries: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Ollama,
            name: "gemma3:27b".to_string(),
            base_url: None,
            api_key: None,
            temperature: 0.0,
            max_tokens: 4096,
            timeout_secs: 120,
            max_retries: 3,
        }
    }
}

impl ModelConfig {
    /// Configured key, else the provider's conventional environment variable.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| {
                self.provider
                    .api_key_env()
                    .and_then(|var| std::env::var(var).ok())
                    .filter(|k| !k.is_empty())
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub enabled: bool,
    /// Neighbors retained on each side of a relevant block.
    pub context_window: usize,
    /// Maximum short blocks sent together in one relevance query.
    pub batch_size: usize,
    /// Blocks with fewer characters than this are batched.
    pub short_text_threshold: usize,
    pub concurrency: usize,
    /// Cheaper model for relevance queries; same provider and endpoint.
    pub model: Option<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            context_window: 1,
            batch_size: 5,
            short_text_threshold: 80,
            concurrency: 4,
            model: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub enabled: bool,
    /// JSON file of custom review standards.
    pub standards_path: Option<PathBuf>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            standards_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(".cache"),
        }
    }
}

impl Rob2Config {
    /// Load from defaults, TOML files, and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(LOCAL_CONFIG))
    }

    /// Like [`load`](Self::load) with `local` in place of `./rob2.toml`.
    pub fn load_from(local: &Path) -> Result<Self, ConfigError> {
        let config: Self = Self::figment_from(Self::global_config_path(), local).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load `.env` from the working directory first, then
    /// [`load_from`](Self::load_from).
    pub fn load_with_dotenv(local: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load_from(local.unwrap_or(Path::new(LOCAL_CONFIG)))
    }

    pub fn figment() -> Figment {
        Self::figment_from(Self::global_config_path(), Path::new(LOCAL_CONFIG))
    }

    /// Provider chain with explicit file locations. Missing files are skipped.
    pub fn figment_from(global: Option<PathBuf>, local: &Path) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global) = global
            && global.exists()
        {
            figment = figment.merge(Toml::file(global));
        }

        if local.exists() {
            figment = figment.merge(Toml::file(local));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("rob2").join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, reason: &str| {
            Err(ConfigError::InvalidValue {
                field: field.to_string(),
                reason: reason.to_string(),
            })
        };
        if self.model.name.trim().is_empty() {
            return invalid("model.name", "must not be empty");
        }
        if self.model.max_retries == 0 {
            return invalid("model.max_retries", "must be at least 1");
        }
        if self.model.timeout_secs == 0 {
            return invalid("model.timeout_secs", "must be at least 1");
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return invalid("model.temperature", "must be between 0 and 2");
        }
        if self.filter.batch_size == 0 {
            return invalid("filter.batch_size", "must be at least 1");
        }
        if self.filter.concurrency == 0 {
            return invalid("filter.concurrency", "must be at least 1");
        }
        Ok(())
    }
}
