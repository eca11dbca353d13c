//! Error types for the market snapshot service

use thiserror::Error;

/// Errors that can occur when fetching listings from the upstream provider
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Network failure or timeout while reaching the provider
    #[error("Upstream unreachable: {0}")]
    Unreachable(String),

    /// Provider answered with a non-success status
    #[error("Upstream rejected request with HTTP {status}: {body}")]
    UpstreamRejected { status: u16, body: String },

    /// Provider answered successfully but the payload did not match the expected shape
    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),
}

impl FetchError {
    /// Creates an Unreachable error
    pub fn unreachable(cause: impl Into<String>) -> Self {
        Self::Unreachable(cause.into())
    }

    /// Creates an UpstreamRejected error
    pub fn rejected(status: u16, body: impl Into<String>) -> Self {
        Self::UpstreamRejected {
            status,
            body: body.into(),
        }
    }

    /// Creates a MalformedResponse error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Unreachable(_) => "unreachable",
            FetchError::UpstreamRejected { .. } => "upstream_rejected",
            FetchError::MalformedResponse(_) => "malformed_response",
        }
    }

    /// True when the upstream broke its response contract
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, FetchError::MalformedResponse(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Unreachable(format!("request timed out: {}", e))
        } else {
            Self::Unreachable(e.to_string())
        }
    }
}

/// Errors from the durable snapshot repository
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database driver error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be mapped back into a record
    #[error("Corrupt stored row: {0}")]
    CorruptRow(String),
}

/// Errors raised while loading configuration at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is missing or empty
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    /// A variable is present but unusable
    #[error("Invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl ConfigError {
    /// Creates an Invalid error
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            reason: reason.into(),
        }
    }
}
