//! Canonical, feed-agnostic calendar events.

use std::collections::btree_map::{self, BTreeMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A single calendar item as read from a feed.
///
/// All-day events are anchored at 00:00 UTC of their calendar date so the
/// date survives the round-trip through `start`/`end`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalEvent {
    /// Feed UID, also written to the remote event as its origin tag.
    pub uuid: String,
    /// SUMMARY, empty when absent.
    pub title: String,
    /// DESCRIPTION, empty when absent.
    pub description: String,
    /// Start instant.
    pub start: DateTime<Utc>,
    /// End instant; equals `start` when the feed has no DTEND.
    pub end: DateTime<Utc>,
    /// DTSTART carried a date without a time of day.
    pub all_day: bool,
    /// Occurrence of a recurring series this event overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_id: Option<DateTime<Utc>>,
}

impl CanonicalEvent {
    /// All-day event covering the given dates.
    pub fn all_day(
        uuid: impl Into<String>,
        title: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            title: title.into(),
            description: String::new(),
            start: start.and_time(chrono::NaiveTime::MIN).and_utc(),
            end: end.and_time(chrono::NaiveTime::MIN).and_utc(),
            all_day: true,
            recurrence_id: None,
        }
    }

    /// Timed event between two instants.
    pub fn timed(
        uuid: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            title: title.into(),
            description: String::new(),
            start,
            end,
            all_day: false,
            recurrence_id: None,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark the event as an override of one occurrence.
    #[must_use]
    pub const fn with_recurrence_id(mut self, recurrence_id: DateTime<Utc>) -> Self {
        self.recurrence_id = Some(recurrence_id);
        self
    }

    /// Identity within a feed: the UID plus the overridden occurrence, if any.
    pub fn key(&self) -> EventKey {
        (self.uuid.clone(), self.recurrence_id)
    }

    /// UTC calendar date of `start`.
    pub fn start_date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    /// UTC calendar date of `end`.
    pub fn end_date(&self) -> NaiveDate {
        self.end.date_naive()
    }
}

/// UID and RECURRENCE-ID of an event.
pub type EventKey = (String, Option<DateTime<Utc>>);

/// Immutable snapshot of one feed read, keyed by [`EventKey`].
///
/// Overrides of a recurring series are separate entries, so editing a single
/// occurrence changes the snapshot. Equality is by content and ignores the
/// order events appeared in the feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalEventSet {
    events: BTreeMap<EventKey, CanonicalEvent>,
}

impl CanonicalEventSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events, overrides included.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the feed had no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The event with this UID that overrides no occurrence.
    pub fn get(&self, uuid: &str) -> Option<&CanonicalEvent> {
        self.events.get(&(uuid.to_string(), None))
    }

    /// Events in key order; a series master precedes its overrides.
    pub fn iter(&self) -> btree_map::Values<'_, EventKey, CanonicalEvent> {
        self.events.values()
    }
}

/// Keeps the first event seen for each key.
impl FromIterator<CanonicalEvent> for CanonicalEventSet {
    fn from_iter<I: IntoIterator<Item = CanonicalEvent>>(iter: I) -> Self {
        let mut events = BTreeMap::new();
        for event in iter {
            events.entry(event.key()).or_insert(event);
        }
        Self { events }
    }
}

impl<'a> IntoIterator for &'a CanonicalEventSet {
    type Item = &'a CanonicalEvent;
    type IntoIter = btree_map::Values<'a, EventKey, CanonicalEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
