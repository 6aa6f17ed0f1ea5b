//! Error types for the batch provisioning system.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Classification of a remote management API failure.
///
/// The kind alone decides retryability: `Throttled` and `Transient` calls are
/// retried under the backoff policy, `Conflict` and `Fatal` surface immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    Throttled,
    Conflict,
    Transient,
    Fatal,
}

impl std::fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RemoteErrorKind::Throttled => "throttled",
            RemoteErrorKind::Conflict => "conflict",
            RemoteErrorKind::Transient => "transient",
            RemoteErrorKind::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Errors returned by the remote resource client
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("request throttled by the management API: {message}")]
    Throttled {
        message: String,
        /// Server-provided delay hint (Retry-After), if any.
        retry_after: Option<Duration>,
    },

    #[error("resource name conflict: {0}")]
    Conflict(String),

    #[error("transient remote failure: {0}")]
    Transient(String),

    #[error("fatal remote failure: {0}")]
    Fatal(String),
}

impl RemoteError {
    pub fn kind(&self) -> RemoteErrorKind {
        match self {
            RemoteError::Throttled { .. } => RemoteErrorKind::Throttled,
            RemoteError::Conflict(_) => RemoteErrorKind::Conflict,
            RemoteError::Transient(_) => RemoteErrorKind::Transient,
            RemoteError::Fatal(_) => RemoteErrorKind::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Throttled { .. } | RemoteError::Transient(_)
        )
    }

    /// Server-provided backoff hint, if the error carries one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RemoteError::Throttled { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn throttled(message: impl Into<String>) -> Self {
        RemoteError::Throttled {
            message: message.into(),
            retry_after: None,
        }
    }
}

/// Crate-level errors for everything around the remote calls: configuration,
/// request validation, authentication, and artifact output.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid batch request: {0}")]
    InvalidRequest(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("resource group '{name}' could not be ensured: {source}")]
    ResourceGroup {
        name: String,
        #[source]
        source: RemoteError,
    },

    #[error("failed to write artifact {path:?}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<config::ConfigError> for ProvisionError {
    fn from(err: config::ConfigError) -> Self {
        ProvisionError::Config(err.to_string())
    }
}
