use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Directory holding project configuration.
pub const CONFIG_DIR: &str = ".repokeeper";

/// Environment variable prefix; nested keys are separated by `__`.
pub const ENV_PREFIX: &str = "REPOKEEPER_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid finalizer name: {0}. Must be a qualified name like example.com/finalizer")]
    InvalidFinalizerName(String),

    #[error("Invalid requests_per_second: {0}. Must be at least 1")]
    InvalidRateLimit(u32),

    #[error("Invalid timeout_secs: {0}. Must be at least 1")]
    InvalidTimeout(u64),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the current directory.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .repokeeper/config.yaml
    /// 3. .repokeeper/local.yaml (optional local overrides)
    /// 4. Environment variables (REPOKEEPER_* prefix)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Same layering as [`load`](Self::load), rooted at `dir`.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Config> {
        let config_dir = dir.as_ref().join(CONFIG_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(config_dir.join("config.yaml")))
            .merge(Yaml::file(config_dir.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        // Empty disables the finalizer; anything else must be domain-qualified.
        if let Some(name) = config.finalizer() {
            let qualified = name
                .split_once('/')
                .is_some_and(|(domain, rest)| domain.contains('.') && !rest.is_empty());
            if !qualified || name.contains(char::is_whitespace) {
                return Err(ConfigError::InvalidFinalizerName(name.to_string()));
            }
        }

        let gitlab = &config.gitlab;
        if gitlab.requests_per_second == 0 {
            return Err(ConfigError::InvalidRateLimit(gitlab.requests_per_second));
        }
        if gitlab.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout(gitlab.timeout_secs));
        }
        if gitlab.initial_backoff_ms >= gitlab.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                gitlab.initial_backoff_ms,
                gitlab.max_backoff_ms,
            ));
        }

        Ok(())
    }
}
