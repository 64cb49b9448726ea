//! Shared test helpers for `icalsync-core` integration tests.
//!
//! In-memory fakes for the core ports so sync tests can focus on behaviour
//! instead of HTTP plumbing.

#![allow(dead_code)]

pub mod calendar;
pub mod feeds;

pub use calendar::{InMemoryCalendar, RecordingConnector};
pub use feeds::{GatedFeedSource, StaticFeedSource};

/// Wrap VEVENT bodies into a minimal VCALENDAR document.
pub fn ics(events: &[&str]) -> String {
    let mut doc = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//icalsync tests//EN\r\n");
    for event in events {
        doc.push_str(event);
    }
    doc.push_str("END:VCALENDAR\r\n");
    doc
}

pub fn all_day_event(uid: &str, summary: &str, date: &str) -> String {
    format!("BEGIN:VEVENT\r\nUID:{uid}\r\nSUMMARY:{summary}\r\nDTSTART;VALUE=DATE:{date}\r\nEND:VEVENT\r\n")
}

pub fn timed_event(uid: &str, summary: &str, start: &str, end: &str) -> String {
    format!(
        "BEGIN:VEVENT\r\nUID:{uid}\r\nSUMMARY:{summary}\r\nDTSTART:{start}\r\nDTEND:{end}\r\nEND:VEVENT\r\n"
    )
}
