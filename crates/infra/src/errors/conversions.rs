//! Conversions from external infrastructure errors into domain errors.

use icalsync_domain::SyncError;
use oauth2::basic::BasicErrorResponse;
use oauth2::RequestTokenError;
use reqwest::Error as HttpError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub SyncError);

impl From<InfraError> for SyncError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<SyncError> for InfraError {
    fn from(value: SyncError) -> Self {
        Self(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoSyncError {
    fn into_sync(self) -> SyncError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → SyncError */
/* -------------------------------------------------------------------------- */

impl IntoSyncError for HttpError {
    fn into_sync(self) -> SyncError {
        if self.is_timeout() {
            return SyncError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return SyncError::Network("HTTP connection failure".into());
        }

        if self.is_decode() {
            return SyncError::Parse(format!("failed to decode HTTP response: {self}"));
        }

        if let Some(status) = self.status() {
            return status_error(status.as_u16(), status.canonical_reason().unwrap_or("unknown status"));
        }

        SyncError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        Self(value.into_sync())
    }
}

/// Classify a non-success HTTP status from any remote endpoint.
///
/// Only 401 means the credential itself was rejected; 403 is also used for
/// quota and permission problems that re-authorizing would not fix.
pub fn status_error(code: u16, message: &str) -> SyncError {
    let message = format!("HTTP {code} {message}");
    match code {
        401 => SyncError::Authorization(message),
        404 => SyncError::NotFound(message),
        _ => SyncError::Remote { status: code, message },
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json::Error → SyncError */
/* -------------------------------------------------------------------------- */

impl IntoSyncError for serde_json::Error {
    fn into_sync(self) -> SyncError {
        SyncError::Parse(format!("invalid JSON: {self}"))
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        Self(value.into_sync())
    }
}

/* -------------------------------------------------------------------------- */
/* std::io::Error → SyncError */
/* -------------------------------------------------------------------------- */

impl IntoSyncError for std::io::Error {
    fn into_sync(self) -> SyncError {
        SyncError::Storage(format!("{:?}: {self}", self.kind()))
    }
}

impl From<std::io::Error> for InfraError {
    fn from(value: std::io::Error) -> Self {
        Self(value.into_sync())
    }
}

/* -------------------------------------------------------------------------- */
/* oauth2::RequestTokenError → SyncError */
/* -------------------------------------------------------------------------- */

impl<RE> IntoSyncError for RequestTokenError<RE, BasicErrorResponse>
where
    RE: std::error::Error + 'static,
{
    fn into_sync(self) -> SyncError {
        match self {
            RequestTokenError::ServerResponse(response) => {
                SyncError::Authorization(format!("token endpoint rejected the request: {response}"))
            }
            RequestTokenError::Request(err) => {
                SyncError::Network(format!("token endpoint request failed: {err}"))
            }
            RequestTokenError::Parse(err, _) => {
                SyncError::Parse(format!("invalid token endpoint response: {err}"))
            }
            RequestTokenError::Other(message) => {
                SyncError::Authorization(format!("token request failed: {message}"))
            }
        }
    }
}

impl<RE> From<RequestTokenError<RE, BasicErrorResponse>> for InfraError
where
    RE: std::error::Error + 'static,
{
    fn from(value: RequestTokenError<RE, BasicErrorResponse>) -> Self {
        Self(value.into_sync())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
