//! Storage trait for per-user OAuth credentials.

use async_trait::async_trait;
use icalsync_domain::{Result, StoredCredential};

/// Durable per-user credential storage.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `Ok(None)` when nothing is stored for the user.
    async fn load(&self, user_id: &str) -> Result<Option<StoredCredential>>;

    /// Replace whatever is stored for the user.
    async fn save(&self, user_id: &str, credential: &StoredCredential) -> Result<()>;

    /// Deleting a missing credential is not an error.
    async fn delete(&self, user_id: &str) -> Result<()>;
}
