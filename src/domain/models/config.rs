use serde::{Deserialize, Serialize};

use super::repository::{CreationPolicy, DeletionPolicy};

/// Main configuration structure for repokeeper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Finalizer guarding remote cleanup. Empty disables the finalizer.
    #[serde(default = "default_finalizer_name")]
    pub finalizer_name: String,

    /// Stamp the deletion-protection annotation on new objects
    #[serde(default = "default_true")]
    pub deletion_protection: bool,

    /// Deletion policy used when neither descriptor nor object sets one
    #[serde(default)]
    pub default_deletion_policy: DeletionPolicy,

    /// Creation policy used when neither descriptor nor object sets one
    #[serde(default)]
    pub default_creation_policy: CreationPolicy,

    /// GitLab client configuration
    #[serde(default)]
    pub gitlab: GitLabConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Finalizer used when none is configured.
pub const DEFAULT_FINALIZER_NAME: &str = "repokeeper.io/finalizer";

fn default_finalizer_name() -> String {
    DEFAULT_FINALIZER_NAME.to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            finalizer_name: default_finalizer_name(),
            deletion_protection: true,
            default_deletion_policy: DeletionPolicy::default(),
            default_creation_policy: CreationPolicy::default(),
            gitlab: GitLabConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// The configured finalizer, `None` when disabled.
    pub fn finalizer(&self) -> Option<&str> {
        let name = self.finalizer_name.trim();
        (!name.is_empty()).then_some(name)
    }
}

/// GitLab HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GitLabConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Sustained request rate towards one GitLab instance
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Retries for transient failures (429, 5xx, network)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_requests_per_second() -> u32 {
    10
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            requests_per_second: default_requests_per_second(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}
