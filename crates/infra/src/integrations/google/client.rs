//! Google Calendar v3 client bound to one user's credential.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use icalsync_core::{BatchOperation, CalendarSummary, RemoteCalendar, RemoteEvent};
use icalsync_domain::{Result, StoredCredential, SyncError};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use url::Url;

use super::batch;
use super::types::{error_message, CalendarListResponse, EventsResponse};
use crate::errors::{status_error, InfraError};
use crate::http::HttpClient;

const DEFAULT_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const DEFAULT_BATCH_URL: &str = "https://www.googleapis.com/batch/calendar/v3";

/// Where the Calendar API and its batch endpoint live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleEndpoints {
    /// Calendar v3 REST root.
    pub api_base: String,
    /// Batch endpoint for the same API.
    pub batch_url: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self { api_base: DEFAULT_API_BASE.to_string(), batch_url: DEFAULT_BATCH_URL.to_string() }
    }
}

impl GoogleEndpoints {
    /// Endpoints rooted at another host, laid out like googleapis.com.
    pub fn with_root(root: &str) -> Self {
        let root = root.trim_end_matches('/');
        Self {
            api_base: format!("{root}/calendar/v3"),
            batch_url: format!("{root}/batch/calendar/v3"),
        }
    }

    /// Path prefix used by the inner requests of a batch.
    fn api_path(&self) -> Result<String> {
        let url = Url::parse(&self.api_base)
            .map_err(|err| SyncError::Config(format!("invalid calendar API base URL: {err}")))?;
        Ok(url.path().trim_end_matches('/').to_string())
    }
}

/// Obtains a fresh access token when the current one is about to expire.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Exchange the refresh token; the result replaces the stored credential.
    async fn refresh(&self, user_id: &str, credential: &StoredCredential)
        -> Result<StoredCredential>;
}

/// [`RemoteCalendar`] over the Google Calendar REST API.
pub struct GoogleCalendarClient {
    http: HttpClient,
    endpoints: GoogleEndpoints,
    user_id: String,
    credential: Mutex<StoredCredential>,
    refresher: Option<Arc<dyn TokenRefresher>>,
}

impl GoogleCalendarClient {
    /// Client acting as `user_id` with the given credential.
    pub fn new(
        http: HttpClient,
        endpoints: GoogleEndpoints,
        user_id: impl Into<String>,
        credential: StoredCredential,
    ) -> Self {
        Self {
            http,
            endpoints,
            user_id: user_id.into(),
            credential: Mutex::new(credential),
            refresher: None,
        }
    }

    /// Refresh the credential through `refresher` shortly before it expires.
    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    async fn access_token(&self) -> Result<String> {
        let mut credential = self.credential.lock().await;
        if credential.needs_refresh_at(Utc::now()) {
            if let Some(refresher) = &self.refresher {
                debug!(user_id = %self.user_id, "refreshing access token");
                *credential = refresher.refresh(&self.user_id, &credential).await?;
            }
        }
        Ok(credential.access_token.clone())
    }

    async fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        Ok(builder.bearer_auth(self.access_token().await?))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        let request = self.authorized(self.http.request(Method::GET, url).query(query)).await?;
        let response = ensure_success(self.http.send(request).await?).await?;
        response.json::<T>().await.map_err(|err| SyncError::from(InfraError::from(err)))
    }
}

#[async_trait]
impl RemoteCalendar for GoogleCalendarClient {
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    async fn list_calendars(&self) -> Result<Vec<CalendarSummary>> {
        let url = format!("{}/users/me/calendarList", self.endpoints.api_base);
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = Vec::new();
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }
            let page: CalendarListResponse = self.get_json(&url, &query).await?;
            calendars.extend(
                page.items
                    .into_iter()
                    .map(|entry| CalendarSummary { id: entry.id, summary: entry.summary }),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(count = calendars.len(), "calendar list retrieved");
        Ok(calendars)
    }

    #[instrument(skip(self), fields(user_id = %self.user_id))]
    async fn list_events(&self, calendar_id: &str, max_results: usize) -> Result<Vec<RemoteEvent>> {
        let url = format!(
            "{}/calendars/{}/events",
            self.endpoints.api_base,
            urlencoding::encode(calendar_id)
        );
        let query = [("maxResults", max_results.to_string()), ("showDeleted", "false".to_string())];
        let page: EventsResponse = self.get_json(&url, &query).await?;

        Ok(page
            .items
            .into_iter()
            .map(|event| {
                let origin_tag = event.origin_tag();
                RemoteEvent { id: event.id, origin_tag }
            })
            .collect())
    }

    #[instrument(skip(self, operations), fields(user_id = %self.user_id, parts = operations.len()))]
    async fn execute_batch(
        &self,
        calendar_id: &str,
        operations: Vec<BatchOperation>,
    ) -> Result<Vec<Result<()>>> {
        if operations.is_empty() {
            return Ok(Vec::new());
        }

        let encoded = batch::encode(&self.endpoints.api_path()?, calendar_id, &operations)?;
        let builder = self
            .http
            .request(Method::POST, &self.endpoints.batch_url)
            .header(CONTENT_TYPE, encoded.content_type())
            .body(encoded.body);
        let request = self.authorized(builder).await?;

        // Inserts are not idempotent, so the batch is never replayed.
        let response = ensure_success(self.http.send_once(request).await?).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.text().await.map_err(|err| SyncError::from(InfraError::from(err)))?;

        batch::decode(&content_type, &body, operations.len())
    }
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown status").to_string());
    Err(status_error(status.as_u16(), &message))
}
