//! OAuth client secrets file.

use std::fmt;
use std::path::Path;

use icalsync_domain::constants::{GOOGLE_AUTH_URI, GOOGLE_TOKEN_URI};
use icalsync_domain::{Result, SyncError};
use serde::Deserialize;

/// OAuth client registration, as downloaded from the Google Cloud console.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct GoogleClientSecrets {
    /// OAuth client id.
    pub client_id: String,
    /// Absent for public clients.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Authorization endpoint.
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    /// Token endpoint.
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

/// The console wraps the registration in `installed` or `web`.
#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<GoogleClientSecrets>,
    web: Option<GoogleClientSecrets>,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl GoogleClientSecrets {
    /// Confidential client with the default Google endpoints.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: Some(client_secret.into()),
            auth_uri: default_auth_uri(),
            token_uri: default_token_uri(),
        }
    }

    /// Override the token endpoint.
    pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = token_uri.into();
        self
    }

    /// Parse a console download, which wraps the registration in `installed`
    /// or `web`.
    ///
    /// # Errors
    /// Returns `SyncError::Config` for malformed JSON or when neither key is present.
    pub fn from_json(contents: &str) -> Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(contents)
            .map_err(|err| SyncError::Config(format!("invalid client secrets: {err}")))?;
        file.installed.or(file.web).ok_or_else(|| {
            SyncError::Config("client secrets contain neither \"installed\" nor \"web\"".into())
        })
    }

    /// Read and parse a client secrets file.
    ///
    /// # Errors
    /// Returns `SyncError::Config` when the file is unreadable or invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|err| {
            SyncError::Config(format!("failed to read client secrets {}: {err}", path.display()))
        })?;
        Self::from_json(&contents)
    }
}

impl fmt::Debug for GoogleClientSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleClientSecrets")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}
