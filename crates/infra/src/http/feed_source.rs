//! Feed retrieval over HTTP(S).

use async_trait::async_trait;
use icalsync_core::FeedSource;
use icalsync_domain::{Result, SyncError};
use reqwest::Method;
use tracing::{debug, instrument};

use super::client::HttpClient;
use crate::errors::{status_error, InfraError};

/// Fetches iCalendar documents with the shared retrying client.
#[derive(Clone)]
pub struct HttpFeedSource {
    client: HttpClient,
}

impl HttpFeedSource {
    /// Wrap a client; its redirect and retry settings apply to every fetch.
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<String> {
        let request = self.client.request(Method::GET, url).header("Accept", "text/calendar, */*");
        let response = self.client.send(request).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(
                status.as_u16(),
                status.canonical_reason().unwrap_or("unknown status"),
            ));
        }

        let bytes = response.bytes().await.map_err(|err| SyncError::from(InfraError::from(err)))?;
        debug!(bytes = bytes.len(), "feed retrieved");

        // Malformed sequences become U+FFFD rather than failing the read.
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
