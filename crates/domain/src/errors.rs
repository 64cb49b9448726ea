//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for icalsync
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum SyncError {
    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection, timeout or transport failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Credential rejected, consent denied or token grant refused.
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// A named remote resource, usually a calendar, does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Feed or response body could not be decoded.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Non-success response not covered by a more specific variant.
    #[error("Remote API error ({status}): {message}")]
    Remote {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response.
        message: String,
    },

    /// One item of a batched remote call failed.
    #[error("Batch item failed: {0}")]
    BatchItem(String),

    /// Credential storage failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Bug or invariant violation.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by the sync loop to decide recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Target calendar missing; retried on the next run.
    NotFound,
    /// Credential must be discarded.
    Authorization,
    /// Network, parse and remote failures worth retrying.
    Transient,
    /// Part of a merge phase failed.
    BatchItem,
    /// Misconfiguration.
    Config,
    /// Credential storage failure.
    Storage,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Stable label suitable for structured logging.
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Authorization => "authorization",
            Self::Transient => "transient",
            Self::BatchItem => "batch_item",
            Self::Config => "config",
            Self::Storage => "storage",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl SyncError {
    /// Recovery classification of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Authorization(_) => ErrorKind::Authorization,
            Self::Network(_) | Self::Parse(_) | Self::Remote { .. } => ErrorKind::Transient,
            Self::BatchItem(_) => ErrorKind::BatchItem,
            Self::Config(_) => ErrorKind::Config,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True when the failure means the stored credential must not be reused.
    pub const fn is_authorization(&self) -> bool {
        matches!(self, Self::Authorization(_))
    }
}

/// Result type alias for icalsync operations
pub type Result<T> = std::result::Result<T, SyncError>;
