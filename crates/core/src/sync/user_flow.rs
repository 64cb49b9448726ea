//! Per-user synchronization flow.
//!
//! A flow owns its feed bindings behind a gate. A trigger that finds the gate
//! held returns [`SyncRun::Skipped`] immediately instead of waiting, so there
//! is never more than one active synchronization per user and triggers do not
//! queue up.

use std::sync::Arc;

use chrono_tz::Tz;
use icalsync_domain::{CanonicalEventSet, ErrorKind, FlowConfig, Result, SyncError, UserConfig};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use super::merge::{MergeOutcome, MergeWriter};
use crate::calendar::ports::CalendarConnector;
use crate::feed::ports::FeedSource;
use crate::feed::FeedReader;

/// One (feed, target calendar) pair of a user.
#[derive(Debug, Clone)]
pub struct FeedBinding {
    /// iCalendar feed to read.
    pub feed_url: String,
    /// Name of the remote calendar the feed is mirrored into.
    pub calendar_name: String,
    /// Zone for feed times that carry neither `Z` nor a `TZID`.
    pub default_time_zone: Tz,
    /// Last successfully merged read; only touched while the gate is held.
    last_snapshot: Option<CanonicalEventSet>,
}

impl FeedBinding {
    /// A binding that has not been merged yet.
    pub fn new(
        feed_url: impl Into<String>,
        calendar_name: impl Into<String>,
        default_time_zone: Tz,
    ) -> Self {
        Self {
            feed_url: feed_url.into(),
            calendar_name: calendar_name.into(),
            default_time_zone,
            last_snapshot: None,
        }
    }

    /// # Errors
    /// Returns `SyncError::Config` for an unknown default time zone.
    pub fn from_config(flow: &FlowConfig) -> Result<Self> {
        Ok(Self::new(&flow.ical_url, &flow.google_calendar_name, flow.time_zone()?))
    }
}

/// What happened to one binding during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BindingOutcome {
    /// Feed equal to the last merged read; no remote calls were made.
    Unchanged,
    /// The remote calendar was replaced with the feed's events.
    Merged(MergeOutcome),
    /// The binding failed; its snapshot is cleared so the next run merges.
    Failed {
        /// Classification of the error.
        kind: ErrorKind,
        /// Rendered error message.
        message: String,
    },
}

/// Outcome of one binding, labelled with the binding it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingReport {
    /// Feed the binding reads.
    pub feed_url: String,
    /// Target calendar name.
    pub calendar_name: String,
    /// What the run did.
    pub outcome: BindingOutcome,
}

/// Per-binding results of one completed run, in binding order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// User the run belonged to.
    pub user_id: String,
    /// One entry per binding.
    pub bindings: Vec<BindingReport>,
}

impl SyncReport {
    /// Number of bindings that were merged.
    pub fn merged(&self) -> usize {
        self.count(|outcome| matches!(outcome, BindingOutcome::Merged(_)))
    }

    /// Number of bindings whose feed had not changed.
    pub fn unchanged(&self) -> usize {
        self.count(|outcome| matches!(outcome, BindingOutcome::Unchanged))
    }

    /// Number of failed bindings.
    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, BindingOutcome::Failed { .. }))
    }

    fn count(&self, predicate: impl Fn(&BindingOutcome) -> bool) -> usize {
        self.bindings.iter().filter(|binding| predicate(&binding.outcome)).count()
    }
}

/// Result of one trigger of a [`UserFlow`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "run", rename_all = "snake_case")]
pub enum SyncRun {
    /// Another synchronization of the same user was in progress.
    Skipped,
    /// The run went through every binding.
    Completed(SyncReport),
}

impl SyncRun {
    /// Whether the trigger found another run in progress.
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    /// Report of a completed run.
    pub const fn report(&self) -> Option<&SyncReport> {
        match self {
            Self::Skipped => None,
            Self::Completed(report) => Some(report),
        }
    }
}

/// Synchronization of all feed bindings of one user, at most one run at a time.
pub struct UserFlow {
    user_id: String,
    user_email: String,
    bindings: Mutex<Vec<FeedBinding>>,
    feed_source: Arc<dyn FeedSource>,
    connector: Arc<dyn CalendarConnector>,
    reader: FeedReader,
    writer: MergeWriter,
}

impl UserFlow {
    /// A flow over `bindings`, synchronized in the given order.
    pub fn new(
        user_id: impl Into<String>,
        user_email: impl Into<String>,
        bindings: Vec<FeedBinding>,
        feed_source: Arc<dyn FeedSource>,
        connector: Arc<dyn CalendarConnector>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            user_email: user_email.into(),
            bindings: Mutex::new(bindings),
            feed_source,
            connector,
            reader: FeedReader::new(),
            writer: MergeWriter::default(),
        }
    }

    /// Build a flow with the user's bindings in configured order.
    ///
    /// # Errors
    /// Returns `SyncError::Config` when a binding has an invalid time zone.
    pub fn from_config<'a>(
        user: &UserConfig,
        flows: impl IntoIterator<Item = &'a FlowConfig>,
        feed_source: Arc<dyn FeedSource>,
        connector: Arc<dyn CalendarConnector>,
    ) -> Result<Self> {
        let bindings = flows
            .into_iter()
            .filter(|flow| flow.user_id == user.id)
            .map(FeedBinding::from_config)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(&user.id, &user.email, bindings, feed_source, connector))
    }

    /// Replace the default merge writer.
    #[must_use]
    pub fn with_merge_writer(mut self, writer: MergeWriter) -> Self {
        self.writer = writer;
        self
    }

    /// Configured user id.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Email passed as the login hint during authorization.
    pub fn user_email(&self) -> &str {
        &self.user_email
    }

    /// Whether a synchronization currently holds the gate.
    pub fn is_running(&self) -> bool {
        self.bindings.try_lock().is_err()
    }

    /// Synchronize every binding in order, isolating per-binding failures.
    ///
    /// Returns [`SyncRun::Skipped`] without doing anything if a
    /// synchronization of this user is already running.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn synchronize(&self) -> SyncRun {
        let Ok(mut bindings) = self.bindings.try_lock() else {
            info!("user flow still active, skipping");
            return SyncRun::Skipped;
        };

        info!(bindings = bindings.len(), "starting synchronization");
        let mut reports = Vec::with_capacity(bindings.len());
        for binding in bindings.iter_mut() {
            let outcome = match self.sync_binding(binding).await {
                Ok(outcome) => outcome,
                Err(err) => self.recover(binding, err).await,
            };
            reports.push(BindingReport {
                feed_url: binding.feed_url.clone(),
                calendar_name: binding.calendar_name.clone(),
                outcome,
            });
        }

        let report = SyncReport { user_id: self.user_id.clone(), bindings: reports };
        info!(
            merged = report.merged(),
            unchanged = report.unchanged(),
            failed = report.failed(),
            "user synchronized"
        );
        SyncRun::Completed(report)
    }

    async fn sync_binding(&self, binding: &mut FeedBinding) -> Result<BindingOutcome> {
        info!(feed_url = %binding.feed_url, "reading calendar feed");
        let document = self.feed_source.fetch(&binding.feed_url).await?;
        let current = self.reader.read(&document, binding.default_time_zone)?;

        if binding.last_snapshot.as_ref() == Some(&current) {
            info!(feed_url = %binding.feed_url, "no changes in feed, skipping synchronization");
            return Ok(BindingOutcome::Unchanged);
        }

        let remote = self.connector.connect(&self.user_id, &self.user_email).await?;
        let outcome = self.writer.merge(remote.as_ref(), &current, &binding.calendar_name).await?;

        binding.last_snapshot = Some(current);
        Ok(BindingOutcome::Merged(outcome))
    }

    /// Force a full resync of the binding next time; drop the credential too
    /// when it was rejected.
    async fn recover(&self, binding: &mut FeedBinding, err: SyncError) -> BindingOutcome {
        binding.last_snapshot = None;
        let kind = err.kind();

        error!(
            feed_url = %binding.feed_url,
            calendar = %binding.calendar_name,
            kind = %kind,
            error = %err,
            "calendar flow failed"
        );

        if err.is_authorization() {
            warn!("authorization rejected, forgetting stored credential");
            if let Err(forget_err) = self.connector.forget(&self.user_id).await {
                error!(error = %forget_err, "failed to forget stored credential");
            }
        }

        BindingOutcome::Failed { kind, message: err.to_string() }
    }
}

impl std::fmt::Debug for UserFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserFlow")
            .field("user_id", &self.user_id)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
