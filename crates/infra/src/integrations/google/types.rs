//! Google Calendar v3 wire types.

use std::collections::HashMap;

use chrono::SecondsFormat;
use icalsync_core::{EventDraft, EventTiming};
use icalsync_domain::constants::ORIGIN_TAG_KEY;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CalendarListResponse {
    #[serde(default)]
    pub items: Vec<CalendarListEntry>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CalendarListEntry {
    pub id: String,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EventsResponse {
    #[serde(default)]
    pub items: Vec<EventResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventResource {
    pub id: String,
    pub extended_properties: Option<ExtendedProperties>,
}

impl EventResource {
    pub fn origin_tag(&self) -> Option<String> {
        self.extended_properties.as_ref().and_then(|props| props.private.get(ORIGIN_TAG_KEY).cloned())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct ExtendedProperties {
    #[serde(default)]
    pub private: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventInsertBody {
    pub summary: String,
    pub description: String,
    pub start: EventDateTimeBody,
    pub end: EventDateTimeBody,
    pub extended_properties: ExtendedProperties,
}

/// Exactly one of `date` and `dateTime` is set.
#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventDateTimeBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
}

impl From<EventTiming> for EventDateTimeBody {
    fn from(timing: EventTiming) -> Self {
        match timing {
            EventTiming::Date(date) => {
                Self { date: Some(date.format("%Y-%m-%d").to_string()), date_time: None }
            }
            EventTiming::DateTime(instant) => Self {
                date: None,
                date_time: Some(instant.to_rfc3339_opts(SecondsFormat::Secs, true)),
            },
        }
    }
}

impl From<&EventDraft> for EventInsertBody {
    fn from(draft: &EventDraft) -> Self {
        let mut private = HashMap::new();
        private.insert(ORIGIN_TAG_KEY.to_string(), draft.origin_tag.clone());
        Self {
            summary: draft.summary.clone(),
            description: draft.description.clone(),
            start: draft.start.into(),
            end: draft.end.into(),
            extended_properties: ExtendedProperties { private },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GoogleErrorEnvelope {
    pub error: GoogleErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GoogleErrorBody {
    #[serde(default)]
    pub message: String,
}

/// Human readable message of a Google error body, if it is one.
pub(crate) fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<GoogleErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error.message)
        .filter(|message| !message.is_empty())
}
