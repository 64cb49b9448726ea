//! Application configuration structures
//!
//! Deserialized by the infra loader from TOML or JSON. [`AppConfig::validate`]
//! enforces the cross-references serde alone cannot express.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::constants::{CALLBACK_PATH, DEFAULT_SCHEDULE_DELAY_SECS, WORKERS_PER_USER};
use crate::errors::{Result, SyncError};

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Accounts to synchronize, each with a unique id.
    pub users: Vec<UserConfig>,
    /// Feed bindings; each must name a configured user.
    #[serde(default)]
    pub flows: Vec<FlowConfig>,
    /// Dispatcher timing and pool size.
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// OAuth listener and credential storage settings.
    pub authorization: AuthorizationConfig,
}

/// A Google account the service writes into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    /// Key for stored credentials and log fields.
    pub id: String,
    /// Passed to Google as the login hint.
    pub email: String,
}

/// One feed mirrored into one named calendar of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Owning user.
    pub user_id: String,
    /// Feed to read.
    pub ical_url: String,
    /// Exact name of the target calendar.
    pub google_calendar_name: String,
    /// IANA zone used for feed times without an explicit zone.
    #[serde(default = "default_time_zone")]
    pub default_time_zone: String,
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Pause between ticks.
    #[serde(default = "default_delay_seconds")]
    pub delay_seconds: u64,
    /// Defaults to two workers per configured user.
    #[serde(default)]
    pub worker_pool_size: Option<usize>,
}

const fn default_delay_seconds() -> u64 {
    DEFAULT_SCHEDULE_DELAY_SECS
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { delay_seconds: DEFAULT_SCHEDULE_DELAY_SECS, worker_pool_size: None }
    }
}

/// OAuth callback listener and credential storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    /// Port the OAuth callback listener binds to.
    pub listening_port: u16,
    /// Externally reachable base of the callback listener, without the path.
    pub redirect_url_base: String,
    /// Directory holding one credential file per user.
    pub storage_directory: PathBuf,
    /// Client secrets JSON downloaded from the Google Cloud console.
    pub client_secrets_file: PathBuf,
    /// Bound on the wait for an interactive callback. Unbounded when absent.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl AuthorizationConfig {
    /// Base URL joined with the fixed callback path.
    pub fn redirect_uri(&self) -> String {
        format!("{}{}", self.redirect_url_base.trim_end_matches('/'), CALLBACK_PATH)
    }

    /// Wait bound for the interactive callback.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}

impl FlowConfig {
    /// # Errors
    /// Returns `SyncError::Config` for names that are not IANA zones.
    pub fn time_zone(&self) -> Result<Tz> {
        self.default_time_zone.parse::<Tz>().map_err(|e| {
            SyncError::Config(format!(
                "Invalid time zone '{}' for feed {}: {e}",
                self.default_time_zone, self.ical_url
            ))
        })
    }
}

impl AppConfig {
    /// Flows of one user in configured order.
    pub fn flows_for<'a>(&'a self, user_id: &'a str) -> impl Iterator<Item = &'a FlowConfig> + 'a {
        self.flows.iter().filter(move |flow| flow.user_id == user_id)
    }

    /// Delay between dispatcher ticks.
    pub fn schedule_delay(&self) -> Duration {
        Duration::from_secs(self.schedule.delay_seconds)
    }

    /// Configured pool size, else two workers per user; never below one.
    pub fn worker_pool_size(&self) -> usize {
        self.schedule
            .worker_pool_size
            .unwrap_or(self.users.len() * WORKERS_PER_USER)
            .max(1)
    }

    /// Check references and values that deserialization accepts blindly.
    ///
    /// # Errors
    /// Returns `SyncError::Config` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for user in &self.users {
            if user.id.trim().is_empty() {
                return Err(SyncError::Config("User id must not be empty".into()));
            }
            if !ids.insert(user.id.as_str()) {
                return Err(SyncError::Config(format!("User {} is defined twice", user.id)));
            }
        }

        for flow in &self.flows {
            if !ids.contains(flow.user_id.as_str()) {
                return Err(SyncError::Config(format!("User {} is not found", flow.user_id)));
            }
            url::Url::parse(&flow.ical_url).map_err(|e| {
                SyncError::Config(format!("Invalid feed URL '{}': {e}", flow.ical_url))
            })?;
            if flow.google_calendar_name.is_empty() {
                return Err(SyncError::Config(format!(
                    "Feed {} has no target calendar name",
                    flow.ical_url
                )));
            }
            flow.time_zone()?;
        }

        if self.schedule.delay_seconds == 0 {
            return Err(SyncError::Config("Schedule delay must be greater than zero".into()));
        }
        if self.schedule.worker_pool_size == Some(0) {
            return Err(SyncError::Config("Worker pool size must be greater than zero".into()));
        }

        url::Url::parse(&self.authorization.redirect_uri()).map_err(|e| {
            SyncError::Config(format!(
                "Invalid redirect URL base '{}': {e}",
                self.authorization.redirect_url_base
            ))
        })?;

        Ok(())
    }
}
