//! Remote calendar ports and the values crossing them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use icalsync_domain::{CanonicalEvent, Result};

/// Calendar visible to the authorized account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarSummary {
    /// Remote calendar id used in API paths.
    pub id: String,
    /// Display name, matched exactly against the configured calendar name.
    pub summary: String,
}

/// Existing remote event, reduced to what the merge needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEvent {
    /// Remote event id, the handle for deletes.
    pub id: String,
    /// Value of the origin tag, `None` for events this service did not create.
    pub origin_tag: Option<String>,
}

/// Start or end of a remote event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTiming {
    /// Calendar date of an all-day event.
    Date(NaiveDate),
    /// Exact instant of a timed event.
    DateTime(DateTime<Utc>),
}

/// Event to be created remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    /// Event title.
    pub summary: String,
    /// Free text body, empty when the feed had none.
    pub description: String,
    /// Start of the event.
    pub start: EventTiming,
    /// End of the event. Exclusive for all-day events.
    pub end: EventTiming,
    /// UID of the feed event, stored so later merges can find what they own.
    pub origin_tag: String,
}

impl EventDraft {
    /// Date-only timing for all-day events, instants otherwise.
    ///
    /// Remote all-day ends are exclusive, so an all-day event ending on or
    /// before its start date is widened to one day.
    pub fn from_canonical(event: &CanonicalEvent) -> Self {
        let (start, end) = if event.all_day {
            let start = event.start_date();
            let mut end = event.end_date();
            if end <= start {
                end = start + Duration::days(1);
            }
            (EventTiming::Date(start), EventTiming::Date(end))
        } else {
            (EventTiming::DateTime(event.start), EventTiming::DateTime(event.end))
        };

        Self {
            summary: event.title.clone(),
            description: event.description.clone(),
            start,
            end,
            origin_tag: event.uuid.clone(),
        }
    }
}

/// One part of a batched remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    /// Create an event.
    Insert(EventDraft),
    /// Remove an existing event.
    Delete {
        /// Remote id of the event to remove.
        event_id: String,
    },
}

/// Remote calendar API bound to one authorized account.
#[async_trait]
pub trait RemoteCalendar: Send + Sync {
    /// Every calendar the account can see.
    async fn list_calendars(&self) -> Result<Vec<CalendarSummary>>;

    /// Non-deleted events, at most `max_results` of them.
    async fn list_events(&self, calendar_id: &str, max_results: usize) -> Result<Vec<RemoteEvent>>;

    /// Submit operations as one batch.
    ///
    /// The outer error covers the batch request itself; the returned vector
    /// carries one result per operation, in order.
    async fn execute_batch(
        &self,
        calendar_id: &str,
        operations: Vec<BatchOperation>,
    ) -> Result<Vec<Result<()>>>;
}

/// Produces authorized remote calendar handles per user.
#[async_trait]
pub trait CalendarConnector: Send + Sync {
    /// May block until the user completes interactive authorization.
    async fn connect(&self, user_id: &str, user_email: &str) -> Result<Arc<dyn RemoteCalendar>>;

    /// Drop the stored credential so the next `connect` re-authorizes.
    async fn forget(&self, user_id: &str) -> Result<()>;
}
