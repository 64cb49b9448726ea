//! Scheduler error types

use std::time::Duration;

use icalsync_domain::SyncError;
use thiserror::Error;

use crate::errors::InfraError;

/// Dispatcher lifecycle errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Dispatcher is already running
    #[error("Scheduler already running")]
    AlreadyRunning,

    /// Dispatcher is not running
    #[error("Scheduler not running")]
    NotRunning,

    /// The dispatch loop did not finish in time
    #[error("Operation timed out after {duration:?}")]
    Timeout {
        /// The join timeout that elapsed.
        duration: Duration,
    },

    /// Task join failed
    #[error("Task join failed: {0}")]
    TaskJoinFailed(#[from] tokio::task::JoinError),
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        InfraError(SyncError::Internal(err.to_string()))
    }
}

impl From<SchedulerError> for SyncError {
    fn from(err: SchedulerError) -> Self {
        InfraError::from(err).into()
    }
}

/// Convenience type alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
