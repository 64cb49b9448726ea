//! # icalsync Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - The HTTP client and the HTTP feed source
//! - The Google Calendar adapter (OAuth coordinator, callback listener,
//!   REST and batch client)
//! - File-backed credential storage
//! - Configuration loading
//! - The fixed-delay dispatcher
//!
//! ## Architecture
//! - Implements traits defined in `icalsync-core`
//! - Contains all "impure" code (network, filesystem, timers)

pub mod config;
pub mod credentials;
pub mod errors;
pub mod http;
pub mod integrations;
pub mod scheduling;

// Re-export commonly used items
pub use credentials::FileCredentialStore;
pub use errors::InfraError;
pub use http::{HttpClient, HttpFeedSource};
pub use integrations::google::{
    AuthorizationCoordinator, AuthorizationNotifier, GoogleCalendarConnector, GoogleClientSecrets,
    GoogleEndpoints,
};
pub use scheduling::{DispatchTarget, Dispatcher, DispatcherConfig, SchedulerError};
