//! Synchronization engine: change detection, merge, per-user gating.

pub mod merge;
pub mod user_flow;

pub use merge::{MergeOutcome, MergeWriter, MergeWriterConfig};
pub use user_flow::{BindingOutcome, BindingReport, FeedBinding, SyncReport, SyncRun, UserFlow};
