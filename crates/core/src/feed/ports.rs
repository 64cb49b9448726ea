//! Feed retrieval port.

use async_trait::async_trait;
use icalsync_domain::Result;

/// Retrieves raw feed documents.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Whole document body decoded as UTF-8.
    async fn fetch(&self, url: &str) -> Result<String>;
}
