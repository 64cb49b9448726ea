//! Per-user Google calendar clients.

use std::sync::Arc;

use async_trait::async_trait;
use icalsync_core::{CalendarConnector, RemoteCalendar};
use icalsync_domain::Result;

use super::client::{GoogleCalendarClient, GoogleEndpoints};
use super::oauth::AuthorizationCoordinator;
use crate::http::HttpClient;

/// Hands out Google calendar clients bound to each user's credential.
#[derive(Clone)]
pub struct GoogleCalendarConnector {
    coordinator: Arc<AuthorizationCoordinator>,
    http: HttpClient,
    endpoints: GoogleEndpoints,
}

impl GoogleCalendarConnector {
    /// Connector against the public Google endpoints.
    pub fn new(coordinator: Arc<AuthorizationCoordinator>, http: HttpClient) -> Self {
        Self { coordinator, http, endpoints: GoogleEndpoints::default() }
    }

    /// Point clients at other endpoints, e.g. a mock server.
    pub fn with_endpoints(mut self, endpoints: GoogleEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }
}

#[async_trait]
impl CalendarConnector for GoogleCalendarConnector {
    async fn connect(&self, user_id: &str, user_email: &str) -> Result<Arc<dyn RemoteCalendar>> {
        let credential = self.coordinator.get_credential(user_id, user_email).await?;
        let client =
            GoogleCalendarClient::new(self.http.clone(), self.endpoints.clone(), user_id, credential)
                .with_refresher(self.coordinator.clone());
        Ok(Arc::new(client))
    }

    async fn forget(&self, user_id: &str) -> Result<()> {
        self.coordinator.forget(user_id).await
    }
}
