//! Error types for the sourcing workspace.
//!
//! Library crates use [`SourcingError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level error type for all sourcing operations.
#[derive(Debug, thiserror::Error)]
pub enum SourcingError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (empty title, malformed request, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Low-level HTTP client error outside any workflow stage.
    #[error("network error: {0}")]
    Network(String),

    /// The identity backend rejected the credentials or could not be reached.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The search backend rejected the token or could not be reached.
    #[error("search failed: {0}")]
    Search(String),

    /// Retryable persistence failure (backend unavailable, overloaded).
    #[error("transient save error: {0}")]
    TransientSave(String),

    /// Non-retryable persistence failure (malformed record, revoked token).
    #[error("permanent save error: {0}")]
    PermanentSave(String),

    /// The run was cancelled by the caller.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// A client call exceeded its deadline.
    #[error("{operation} timed out after {}ms", after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Orchestrator invariant violation (e.g. an illegal state transition).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SourcingError>;

/// Serializable classification of an error, reported in failure details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Io,
    Validation,
    Network,
    Auth,
    Search,
    TransientSave,
    PermanentSave,
    Cancelled,
    Timeout,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Io => "io",
            Self::Validation => "validation",
            Self::Network => "network",
            Self::Auth => "auth",
            Self::Search => "search",
            Self::TransientSave => "transient_save",
            Self::PermanentSave => "permanent_save",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SourcingError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classification used in summaries and logs.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::Config,
            Self::Io { .. } => ErrorKind::Io,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Network(_) => ErrorKind::Network,
            Self::Auth(_) => ErrorKind::Auth,
            Self::Search(_) => ErrorKind::Search,
            Self::TransientSave(_) => ErrorKind::TransientSave,
            Self::PermanentSave(_) => ErrorKind::PermanentSave,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether a persistence attempt that failed with this error may be retried.
    ///
    /// Timeouts count as transient: a save that ran out of time may succeed
    /// on the next attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientSave(_) | Self::Timeout { .. })
    }
}
