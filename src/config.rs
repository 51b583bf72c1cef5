//! Process-wide configuration.
//!
//! `AppConfig` is built once (by the CLI, or directly in tests) and handed to
//! each component by reference. Nothing below reads the environment itself.

use crate::error::AppError;
use crate::services::gitlab_client::GitLabClientConfig;
use crate::services::sync_engine::SyncConfig;
use std::path::PathBuf;

/// Complete configuration for a run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// GitLab connection settings.
    pub gitlab: GitLabClientConfig,

    /// Sync tuning.
    pub sync: SyncConfig,

    /// Path to the SQLite database file.
    pub db_path: PathBuf,

    /// Group whose projects are mirrored by a full sync.
    pub group: Option<String>,
}

impl AppConfig {
    /// Check that the values needed to talk to GitLab are present.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.gitlab.base_url.trim().is_empty() {
            return Err(AppError::invalid_input_field(
                "GitLab URL is required",
                "gitlab_url",
            ));
        }
        if !self.gitlab.base_url.starts_with("http://") && !self.gitlab.base_url.starts_with("https://")
        {
            return Err(AppError::invalid_input_field(
                "GitLab URL must start with http:// or https://",
                "gitlab_url",
            ));
        }
        if self.gitlab.token.trim().is_empty() {
            return Err(AppError::invalid_input_field(
                "GitLab token is required",
                "gitlab_token",
            ));
        }
        Ok(())
    }

    /// The configured group, or an error naming the missing setting.
    pub fn require_group(&self) -> Result<&str, AppError> {
        self.group
            .as_deref()
            .filter(|g| !g.trim().is_empty())
            .ok_or_else(|| AppError::invalid_input_field("GitLab group is required", "group"))
    }
}
