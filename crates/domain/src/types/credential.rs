//! Persisted delegated-access credential.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::CREDENTIAL_MIN_VALIDITY_SECS;

/// OAuth credential stored per user id.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    /// Bearer token sent with API requests.
    pub access_token: String,
    /// Present when the grant allows offline refresh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Token type reported by the provider, `Bearer` by default.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Absolute expiry; `None` when the provider did not report one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Space-separated granted scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl StoredCredential {
    /// A bearer credential without refresh token or expiry.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: default_token_type(),
            expires_at: None,
            scope: None,
        }
    }

    /// Attach a refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Set the absolute expiry.
    #[must_use]
    pub const fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Seconds until the access token expires, negative once expired.
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at.map(|expires_at| (expires_at - now).num_seconds())
    }

    /// Whether the access token expires within `threshold` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at - now <= threshold)
    }

    /// Reusable without interactive authorization: it can be refreshed, or it
    /// stays valid for more than the minimum validity window.
    pub fn is_reusable_at(&self, now: DateTime<Utc>) -> bool {
        if self.refresh_token.is_some() {
            return true;
        }
        match self.seconds_until_expiry(now) {
            Some(remaining) => remaining > CREDENTIAL_MIN_VALIDITY_SECS,
            None => true,
        }
    }

    /// [`Self::is_reusable_at`] the current time.
    pub fn is_reusable(&self) -> bool {
        self.is_reusable_at(Utc::now())
    }

    /// Should be refreshed before the next request.
    pub fn needs_refresh_at(&self, now: DateTime<Utc>) -> bool {
        self.refresh_token.is_some()
            && self.expires_within(now, Duration::seconds(CREDENTIAL_MIN_VALIDITY_SECS))
    }
}

impl std::fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredCredential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}
