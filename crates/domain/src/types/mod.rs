//! Domain types and models

pub mod credential;
pub mod event;

pub use credential::StoredCredential;
pub use event::{CanonicalEvent, CanonicalEventSet, EventKey};
