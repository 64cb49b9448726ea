//! Scheduling infrastructure for periodic synchronization
//!
//! The dispatcher follows the runtime rules used across this crate:
//! - Explicit lifecycle management (start/stop)
//! - Join handles for spawned tasks
//! - Cancellation token support
//! - Timeout on joining the background loop

pub mod dispatcher;
pub mod error;

pub use dispatcher::{DispatchTarget, Dispatcher, DispatcherConfig};
pub use error::{SchedulerError, SchedulerResult};
