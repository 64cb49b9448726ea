use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use icalsync_core::{
    BatchOperation, CalendarConnector, CalendarSummary, EventDraft, RemoteCalendar, RemoteEvent,
};
use icalsync_domain::{Result as DomainResult, SyncError};

/// Event as held by the fake remote calendar.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub id: String,
    pub calendar_id: String,
    pub summary: String,
    pub origin_tag: Option<String>,
    pub draft: Option<EventDraft>,
}

#[derive(Default)]
struct State {
    calendars: Vec<CalendarSummary>,
    events: Vec<StoredEvent>,
    next_id: usize,
    batches: Vec<Vec<BatchOperation>>,
    insert_failure: Option<SyncError>,
    request_failure: Option<SyncError>,
}

/// In-memory remote calendar recording every call.
#[derive(Default)]
pub struct InMemoryCalendar {
    state: Mutex<State>,
    calls: AtomicUsize,
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_calendar(self, id: &str, summary: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .calendars
            .push(CalendarSummary { id: id.to_string(), summary: summary.to_string() });
        self
    }

    pub fn seed_tagged(&self, calendar_id: &str, uuid: &str) {
        self.push(calendar_id, uuid, Some(uuid.to_string()), None);
    }

    pub fn seed_foreign(&self, calendar_id: &str, summary: &str) {
        self.push(calendar_id, summary, None, None);
    }

    /// Every item of following insert batches fails with `error`.
    pub fn fail_inserts_with(&self, error: SyncError) {
        self.state.lock().unwrap().insert_failure = Some(error);
    }

    /// Every following request fails with `error`.
    pub fn fail_requests_with(&self, error: SyncError) {
        self.state.lock().unwrap().request_failure = Some(error);
    }

    pub fn recover(&self) {
        let mut state = self.state.lock().unwrap();
        state.insert_failure = None;
        state.request_failure = None;
    }

    pub fn tagged_uuids(&self, calendar_id: &str) -> BTreeSet<String> {
        self.state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.calendar_id == calendar_id)
            .filter_map(|e| e.origin_tag.clone())
            .collect()
    }

    pub fn foreign_count(&self, calendar_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.calendar_id == calendar_id && e.origin_tag.is_none())
            .count()
    }

    pub fn drafts(&self, calendar_id: &str) -> Vec<EventDraft> {
        self.state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.calendar_id == calendar_id)
            .filter_map(|e| e.draft.clone())
            .collect()
    }

    pub fn batches(&self) -> Vec<Vec<BatchOperation>> {
        self.state.lock().unwrap().batches.clone()
    }

    /// Every call of any kind, reads included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn push(&self, calendar_id: &str, summary: &str, tag: Option<String>, draft: Option<EventDraft>) {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("evt-{}", state.next_id);
        state.events.push(StoredEvent {
            id,
            calendar_id: calendar_id.to_string(),
            summary: summary.to_string(),
            origin_tag: tag,
            draft,
        });
    }

    fn check_request(&self) -> DomainResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.state.lock().unwrap().request_failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteCalendar for InMemoryCalendar {
    async fn list_calendars(&self) -> DomainResult<Vec<CalendarSummary>> {
        self.check_request()?;
        Ok(self.state.lock().unwrap().calendars.clone())
    }

    async fn list_events(
        &self,
        calendar_id: &str,
        max_results: usize,
    ) -> DomainResult<Vec<RemoteEvent>> {
        self.check_request()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.calendar_id == calendar_id)
            .take(max_results)
            .map(|e| RemoteEvent { id: e.id.clone(), origin_tag: e.origin_tag.clone() })
            .collect())
    }

    async fn execute_batch(
        &self,
        calendar_id: &str,
        operations: Vec<BatchOperation>,
    ) -> DomainResult<Vec<DomainResult<()>>> {
        self.check_request()?;
        self.state.lock().unwrap().batches.push(operations.clone());

        let mut results = Vec::with_capacity(operations.len());
        for operation in operations {
            match operation {
                BatchOperation::Delete { event_id } => {
                    let mut state = self.state.lock().unwrap();
                    let before = state.events.len();
                    state.events.retain(|e| e.id != event_id);
                    results.push(if state.events.len() < before {
                        Ok(())
                    } else {
                        Err(SyncError::NotFound(event_id))
                    });
                }
                BatchOperation::Insert(draft) => {
                    let failure = self.state.lock().unwrap().insert_failure.clone();
                    match failure {
                        Some(err) => results.push(Err(err)),
                        None => {
                            let tag = Some(draft.origin_tag.clone());
                            let summary = draft.summary.clone();
                            self.push(calendar_id, &summary, tag, Some(draft));
                            results.push(Ok(()));
                        }
                    }
                }
            }
        }
        Ok(results)
    }
}

/// Connector handing out one shared fake calendar.
pub struct RecordingConnector {
    calendar: Arc<InMemoryCalendar>,
    connects: AtomicUsize,
    forgets: AtomicUsize,
    connect_error: Mutex<Option<SyncError>>,
}

impl RecordingConnector {
    pub fn new(calendar: Arc<InMemoryCalendar>) -> Self {
        Self {
            calendar,
            connects: AtomicUsize::new(0),
            forgets: AtomicUsize::new(0),
            connect_error: Mutex::new(None),
        }
    }

    pub fn fail_connect_with(&self, error: SyncError) {
        *self.connect_error.lock().unwrap() = Some(error);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn forgets(&self) -> usize {
        self.forgets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CalendarConnector for RecordingConnector {
    async fn connect(
        &self,
        _user_id: &str,
        _user_email: &str,
    ) -> DomainResult<Arc<dyn RemoteCalendar>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.connect_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.calendar.clone())
    }

    async fn forget(&self, _user_id: &str) -> DomainResult<()> {
        self.forgets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
