use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use crate::domain::errors::DomainError;

/// Errors raised by the GitLab REST client.
#[derive(Error, Debug)]
pub enum GitLabError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Authentication failed ({0}): {1}")]
    Unauthorized(StatusCode, String),

    #[error("Rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Server error ({0}): {1}")]
    Server(StatusCode, String),

    #[error("Request rejected ({0}): {1}")]
    Api(StatusCode, String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Invalid endpoint: {0}")]
    InvalidUrl(String),
}

impl GitLabError {
    /// Classify a non-success response.
    pub fn from_status(status: StatusCode, body: String, retry_after: Option<Duration>) -> Self {
        match status {
            StatusCode::NOT_FOUND => Self::NotFound(body),
            StatusCode::CONFLICT => Self::Conflict(body),
            // Creating a project whose path exists answers 400.
            StatusCode::BAD_REQUEST if body.contains("has already been taken") => Self::Conflict(body),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized(status, body),
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited { retry_after },
            s if s.is_server_error() => Self::Server(s, body),
            s => Self::Api(s, body),
        }
    }

    /// Worth retrying after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Server(..) | Self::Network(_)
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<GitLabError> for DomainError {
    fn from(err: GitLabError) -> Self {
        match err {
            GitLabError::NotFound(what) => Self::NotFound(what),
            GitLabError::Conflict(what) => Self::Conflict {
                kind: "gitlab resource".to_string(),
                name: what,
            },
            GitLabError::InvalidUrl(msg) => Self::Configuration(msg),
            other => Self::Provider(other.to_string()),
        }
    }
}
