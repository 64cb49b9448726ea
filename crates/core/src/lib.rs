//! # icalsync Core
//!
//! Pure synchronization logic - no infrastructure dependencies.
//!
//! This crate contains:
//! - Feed parsing into canonical events
//! - The full-replacement merge against a remote calendar
//! - Per-user flows with their change detection and error isolation
//! - Port interfaces (traits) implemented by `icalsync-infra`
//!
//! ## Architecture Principles
//! - Only depends on `icalsync-domain`
//! - No HTTP, filesystem, or OAuth code
//! - All external dependencies via traits

pub mod auth;
pub mod calendar;
pub mod feed;
pub mod sync;

pub use auth::ports::CredentialStore;
pub use calendar::ports::{
    BatchOperation, CalendarConnector, CalendarSummary, EventDraft, EventTiming, RemoteCalendar,
    RemoteEvent,
};
pub use feed::ports::FeedSource;
pub use feed::FeedReader;
pub use sync::{
    BindingOutcome, BindingReport, FeedBinding, MergeOutcome, MergeWriter, MergeWriterConfig,
    SyncReport, SyncRun, UserFlow,
};
