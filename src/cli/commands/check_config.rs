//! Implementation of the `repokeeper check-config` command.

use anyhow::Result;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

#[derive(Debug, Serialize)]
pub struct CheckConfigOutput {
    pub valid: bool,
    pub finalizer: Option<String>,
    pub deletion_protection: bool,
    pub default_deletion_policy: String,
    pub default_creation_policy: String,
    pub gitlab_requests_per_second: u32,
    pub gitlab_max_retries: u32,
    pub log_level: String,
    pub log_format: String,
    pub log_dir: Option<String>,
}

impl From<&Config> for CheckConfigOutput {
    fn from(config: &Config) -> Self {
        Self {
            valid: true,
            finalizer: config.finalizer().map(str::to_string),
            deletion_protection: config.deletion_protection,
            default_deletion_policy: format!("{:?}", config.default_deletion_policy),
            default_creation_policy: format!("{:?}", config.default_creation_policy),
            gitlab_requests_per_second: config.gitlab.requests_per_second,
            gitlab_max_retries: config.gitlab.max_retries,
            log_level: config.logging.level.clone(),
            log_format: config.logging.format.clone(),
            log_dir: config.logging.log_dir.clone(),
        }
    }
}

impl CommandOutput for CheckConfigOutput {
    fn to_human(&self) -> String {
        [
            "Configuration is valid".to_string(),
            format!("  finalizer:            {}", self.finalizer.as_deref().unwrap_or("(disabled)")),
            format!("  deletion protection:  {}", self.deletion_protection),
            format!("  deletion policy:      {}", self.default_deletion_policy),
            format!("  creation policy:      {}", self.default_creation_policy),
            format!(
                "  gitlab:               {} req/s, {} retries",
                self.gitlab_requests_per_second, self.gitlab_max_retries
            ),
            format!(
                "  logging:              {} ({}){}",
                self.log_level,
                self.log_format,
                self.log_dir.as_deref().map(|d| format!(", file in {d}")).unwrap_or_default()
            ),
        ]
        .join("\n")
    }
}

/// Config has already been loaded and validated by the time this runs.
pub fn execute(config: &Config, json_mode: bool) -> Result<()> {
    output(&CheckConfigOutput::from(config), json_mode);
    Ok(())
}
