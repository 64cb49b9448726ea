//! Full-replacement merge of a canonical event set into a remote calendar.
//!
//! Every previously created (origin-tagged) event is deleted and the whole
//! current set is inserted again. Untagged events are never touched.

use icalsync_domain::constants::{BATCH_MAX_PARTS, EVENT_PAGE_LIMIT};
use icalsync_domain::{CanonicalEventSet, Result, SyncError};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::calendar::ports::{BatchOperation, EventDraft, RemoteCalendar};

/// Paging and batching limits of a [`MergeWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeWriterConfig {
    /// Events requested by the single listing call.
    pub page_limit: usize,
    /// Operations per batch request; larger phases are chunked.
    pub batch_limit: usize,
}

impl Default for MergeWriterConfig {
    fn default() -> Self {
        Self { page_limit: EVENT_PAGE_LIMIT, batch_limit: BATCH_MAX_PARTS }
    }
}

/// Counts of remote changes applied by one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    /// Origin-tagged events removed.
    pub deleted: usize,
    /// Feed events created.
    pub inserted: usize,
}

/// Delete-then-insert writer for one remote calendar.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeWriter {
    config: MergeWriterConfig,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Delete,
    Insert,
}

impl Phase {
    const fn name(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Insert => "insert",
        }
    }
}

impl MergeWriter {
    /// A batch limit of zero is raised to one.
    pub fn new(config: MergeWriterConfig) -> Self {
        Self { config: MergeWriterConfig { batch_limit: config.batch_limit.max(1), ..config } }
    }

    /// Replace the managed events of `calendar_name` with `events`.
    ///
    /// # Errors
    /// - `SyncError::NotFound` when no visible calendar has that exact name
    /// - `SyncError::BatchItem` when any item of a phase fails; earlier items
    ///   of that phase may already be applied
    /// - errors of the underlying remote calls
    #[instrument(skip(self, remote, events), fields(calendar = calendar_name, count = events.len()))]
    pub async fn merge(
        &self,
        remote: &dyn RemoteCalendar,
        events: &CanonicalEventSet,
        calendar_name: &str,
    ) -> Result<MergeOutcome> {
        let calendar_id = resolve_calendar(remote, calendar_name).await?;

        let stale: Vec<BatchOperation> = remote
            .list_events(&calendar_id, self.config.page_limit)
            .await?
            .into_iter()
            .filter(|event| event.origin_tag.is_some())
            .map(|event| BatchOperation::Delete { event_id: event.id })
            .collect();

        let deleted = stale.len();
        if stale.is_empty() {
            debug!("no managed events to delete");
        } else {
            self.run_phase(remote, &calendar_id, Phase::Delete, stale).await?;
        }

        if events.is_empty() {
            debug!("feed is empty, skipping insert phase");
            info!(deleted, inserted = 0, "calendar merged");
            return Ok(MergeOutcome { deleted, inserted: 0 });
        }

        let inserts: Vec<BatchOperation> = events
            .iter()
            .map(|event| BatchOperation::Insert(EventDraft::from_canonical(event)))
            .collect();
        let inserted = inserts.len();
        self.run_phase(remote, &calendar_id, Phase::Insert, inserts).await?;

        info!(deleted, inserted, "calendar merged");
        Ok(MergeOutcome { deleted, inserted })
    }

    async fn run_phase(
        &self,
        remote: &dyn RemoteCalendar,
        calendar_id: &str,
        phase: Phase,
        operations: Vec<BatchOperation>,
    ) -> Result<()> {
        let mut offset = 0;
        for chunk in operations.chunks(self.config.batch_limit) {
            let results = remote.execute_batch(calendar_id, chunk.to_vec()).await?;
            if results.len() != chunk.len() {
                return Err(SyncError::BatchItem(format!(
                    "{} batch returned {} results for {} operations",
                    phase.name(),
                    results.len(),
                    chunk.len()
                )));
            }
            for (index, result) in results.into_iter().enumerate() {
                if let Err(err) = result {
                    if err.is_authorization() {
                        return Err(err);
                    }
                    return Err(SyncError::BatchItem(format!(
                        "{} item {} failed: {err}",
                        phase.name(),
                        offset + index
                    )));
                }
            }
            offset += chunk.len();
        }
        Ok(())
    }
}

/// First calendar whose name matches exactly.
async fn resolve_calendar(remote: &dyn RemoteCalendar, calendar_name: &str) -> Result<String> {
    remote
        .list_calendars()
        .await?
        .into_iter()
        .find(|calendar| calendar.summary == calendar_name)
        .map(|calendar| calendar.id)
        .ok_or_else(|| SyncError::NotFound(format!("Calendar {calendar_name} is not found")))
}
