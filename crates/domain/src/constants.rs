//! Application constants
//!
//! Centralized location for domain-level constants shared by the engine and
//! the Google adapters.

// Remote calendar
/// Private extended property stamped on every event this service creates.
pub const ORIGIN_TAG_KEY: &str = "ical-to-google-calendar-uuid";
/// Upper bound for a single event listing. No follow-up pages are requested.
pub const EVENT_PAGE_LIMIT: usize = 2500;
/// Google rejects batch requests with more parts than this.
pub const BATCH_MAX_PARTS: usize = 1000;

// Authorization
/// OAuth scope requested for every user.
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";
/// Path served by the callback listener.
pub const CALLBACK_PATH: &str = "/google-calendar-auth-callback";
/// A credential with less validity than this and no refresh token is not reused.
pub const CREDENTIAL_MIN_VALIDITY_SECS: i64 = 60;
/// Default authorization endpoint when client secrets omit `auth_uri`.
pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
/// Default token endpoint when client secrets omit `token_uri`.
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// Static page returned for every callback hit.
pub const CALLBACK_PAGE_HTML: &str = "<html><head><title>OAuth 2.0 Authentication Token \
     Received</title></head><body>All done, you may now close this window...</body></html>";

// Scheduling
/// Five minutes between ticks unless configured.
pub const DEFAULT_SCHEDULE_DELAY_SECS: u64 = 300;
/// Default pool sizing factor.
pub const WORKERS_PER_USER: usize = 2;

// HTTP
/// Whole-request timeout.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
/// Sent with every outgoing request.
pub const USER_AGENT: &str = concat!("icalsync/", env!("CARGO_PKG_VERSION"));
