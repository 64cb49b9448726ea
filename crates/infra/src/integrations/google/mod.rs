//! Google Calendar adapter: OAuth authorization and the v3 REST/batch API.

mod batch;
pub mod callback;
pub mod client;
pub mod connector;
pub mod oauth;
pub mod secrets;
mod types;

pub use callback::{callback_router, AuthorizationOutcome, CallbackServer, PendingAuthorizations};
pub use client::{GoogleCalendarClient, GoogleEndpoints, TokenRefresher};
pub use connector::GoogleCalendarConnector;
pub use oauth::{AuthorizationCoordinator, AuthorizationNotifier, LogNotifier};
pub use secrets::GoogleClientSecrets;
