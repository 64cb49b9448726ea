//! iCalendar feed parsing into canonical events.
//!
//! Times carrying an explicit zone (`Z` suffix or `TZID` parameter) are read
//! in that zone; floating times use the binding's default zone. A date value
//! without a time of day marks the event as all-day.

use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::parser::{read_calendar, unfold, Component, Property};
use icalendar::{CalendarDateTime, DatePerhapsTime};
use icalsync_domain::{CanonicalEvent, CanonicalEventSet, Result, SyncError};
use tracing::{debug, instrument, warn};

/// Stateless iCalendar reader.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedReader;

impl FeedReader {
    /// Create a reader.
    pub const fn new() -> Self {
        Self
    }

    /// Parse a whole feed document.
    ///
    /// # Errors
    /// Returns `SyncError::Parse` if the document is malformed or any event
    /// lacks a UID or a readable DTSTART. No partial result is produced.
    #[instrument(skip(self, document), fields(bytes = document.len()))]
    pub fn read(&self, document: &str, default_tz: Tz) -> Result<CanonicalEventSet> {
        let unfolded = unfold(document);
        let calendar = read_calendar(&unfolded)
            .map_err(|e| SyncError::Parse(format!("Invalid iCalendar document: {e}")))?;

        let mut seen = HashSet::new();
        let mut events = Vec::new();
        for vevent in calendar.components.iter().filter(|c| c.name == "VEVENT") {
            let event = read_event(vevent, default_tz)?;
            if !seen.insert(event.key()) {
                warn!(uid = %event.uuid, "duplicate event in feed, keeping first occurrence");
                continue;
            }
            events.push(event);
        }

        debug!(count = events.len(), "feed parsed");
        Ok(events.into_iter().collect())
    }
}

fn read_event(vevent: &Component<'_>, default_tz: Tz) -> Result<CanonicalEvent> {
    let uuid = vevent
        .find_prop("UID")
        .map(|p| p.val.to_string())
        .filter(|uid| !uid.trim().is_empty())
        .ok_or_else(|| SyncError::Parse("VEVENT without UID".into()))?;

    let start_prop = vevent
        .find_prop("DTSTART")
        .ok_or_else(|| SyncError::Parse(format!("Event {uuid} has no DTSTART")))?;
    let (start, all_day) = read_timing(start_prop, default_tz, &uuid)?;

    let end = match vevent.find_prop("DTEND") {
        Some(prop) => read_timing(prop, default_tz, &uuid)?.0,
        None => start,
    };

    let recurrence_id = vevent
        .find_prop("RECURRENCE-ID")
        .map(|prop| read_timing(prop, default_tz, &uuid).map(|(instant, _)| instant))
        .transpose()?;

    Ok(CanonicalEvent {
        title: text_value(vevent, "SUMMARY"),
        description: text_value(vevent, "DESCRIPTION"),
        uuid,
        start,
        end,
        all_day,
        recurrence_id,
    })
}

/// Instant and whether the value was date-only.
fn read_timing(prop: &Property<'_>, default_tz: Tz, uid: &str) -> Result<(DateTime<Utc>, bool)> {
    let value = DatePerhapsTime::try_from(prop).map_err(|_| {
        SyncError::Parse(format!("Event {uid} has an unreadable {} value '{}'", prop.name, prop.val))
    })?;

    match value {
        DatePerhapsTime::Date(date) => Ok((date.and_time(NaiveTime::MIN).and_utc(), true)),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(instant)) => Ok((instant, false)),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => {
            localize(naive, default_tz, uid).map(|instant| (instant, false))
        }
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            let tz = lookup_zone(&tzid).unwrap_or_else(|| {
                warn!(uid, tzid = %tzid, fallback = %default_tz, "unknown TZID, using default zone");
                default_tz
            });
            localize(date_time, tz, uid).map(|instant| (instant, false))
        }
    }
}

fn lookup_zone(tzid: &str) -> Option<Tz> {
    tzid.trim_matches('"').trim_start_matches('/').parse::<Tz>().ok()
}

/// Ambiguous local times take the earlier instant; times in a DST gap are
/// shifted forward by an hour.
fn localize(naive: NaiveDateTime, tz: Tz, uid: &str) -> Result<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| {
            SyncError::Parse(format!("Event {uid} has a local time {naive} that does not exist in {tz}"))
        })
}

fn text_value(vevent: &Component<'_>, name: &str) -> String {
    vevent.find_prop(name).map(|p| unescape_text(p.val.as_ref())).unwrap_or_default()
}

fn unescape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn wrap(body: &str) -> String {
        format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//EN\r\n{body}END:VCALENDAR\r\n"
        )
    }

    fn read(body: &str, tz: Tz) -> Result<CanonicalEventSet> {
        FeedReader::new().read(&wrap(body), tz)
    }

    #[test]
    fn all_day_event_without_end_defaults_to_start() {
        let set = read(
            "BEGIN:VEVENT\r\nUID:u1\r\nSUMMARY:Holiday\r\nDTSTART;VALUE=DATE:20240101\r\nEND:VEVENT\r\n",
            Tz::UTC,
        )
        .unwrap();

        let event = set.get("u1").unwrap();
        assert!(event.all_day);
        assert_eq!(event.title, "Holiday");
        assert_eq!(event.description, "");
        assert_eq!(event.start_date(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(event.end, event.start);
    }

    #[test]
    fn floating_time_uses_default_zone() {
        let set = read(
            "BEGIN:VEVENT\r\nUID:f1\r\nDTSTART:20240115T090000\r\nDTEND:20240115T100000\r\nEND:VEVENT\r\n",
            chrono_tz::Europe::Prague,
        )
        .unwrap();

        let event = set.get("f1").unwrap();
        assert!(!event.all_day);
        assert_eq!(event.start.to_rfc3339(), "2024-01-15T08:00:00+00:00");
        assert_eq!(event.end.to_rfc3339(), "2024-01-15T09:00:00+00:00");
    }

    #[test]
    fn explicit_zones_win_over_default() {
        let set = read(
            "BEGIN:VEVENT\r\nUID:z1\r\nDTSTART:20240601T120000Z\r\n\
             DTEND;TZID=America/New_York:20240601T090000\r\nEND:VEVENT\r\n",
            chrono_tz::Asia::Tokyo,
        )
        .unwrap();

        let event = set.get("z1").unwrap();
        assert_eq!(event.start.to_rfc3339(), "2024-06-01T12:00:00+00:00");
        assert_eq!(event.end.to_rfc3339(), "2024-06-01T13:00:00+00:00");
    }

    #[test]
    fn unknown_tzid_falls_back_to_default_zone() {
        let set = read(
            "BEGIN:VEVENT\r\nUID:w1\r\nDTSTART;TZID=W. Europe Standard Time:20240115T090000\r\nEND:VEVENT\r\n",
            Tz::UTC,
        )
        .unwrap();

        assert_eq!(set.get("w1").unwrap().start.to_rfc3339(), "2024-01-15T09:00:00+00:00");
    }

    #[test]
    fn escaped_text_is_unescaped() {
        let set = read(
            "BEGIN:VEVENT\r\nUID:t1\r\nSUMMARY:Lunch\\, team\r\nDESCRIPTION:line one\\nline two\r\n\
             DTSTART:20240101T120000Z\r\nEND:VEVENT\r\n",
            Tz::UTC,
        )
        .unwrap();

        let event = set.get("t1").unwrap();
        assert_eq!(event.title, "Lunch, team");
        assert_eq!(event.description, "line one\nline two");
    }

    #[test]
    fn event_without_uid_fails_whole_document() {
        let result = read(
            "BEGIN:VEVENT\r\nUID:ok\r\nDTSTART:20240101T120000Z\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nSUMMARY:orphan\r\nDTSTART:20240101T120000Z\r\nEND:VEVENT\r\n",
            Tz::UTC,
        );
        assert!(matches!(result, Err(SyncError::Parse(_))));
    }

    #[test]
    fn event_without_start_fails_whole_document() {
        let result = read("BEGIN:VEVENT\r\nUID:nostart\r\nEND:VEVENT\r\n", Tz::UTC);
        assert!(matches!(result, Err(SyncError::Parse(_))));
    }

    #[test]
    fn duplicate_uid_keeps_first() {
        let set = read(
            "BEGIN:VEVENT\r\nUID:d\r\nSUMMARY:first\r\nDTSTART:20240101T120000Z\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:d\r\nSUMMARY:second\r\nDTSTART:20240102T120000Z\r\nEND:VEVENT\r\n",
            Tz::UTC,
        )
        .unwrap();

        assert_eq!(set.len(), 1);
        assert_eq!(set.get("d").unwrap().title, "first");
    }

    #[test]
    fn edited_override_changes_the_set() {
        let series = |summary: &str| {
            format!(
                "BEGIN:VEVENT\r\nUID:r\r\nSUMMARY:Weekly\r\nDTSTART:20240101T090000Z\r\n\
                 RRULE:FREQ=WEEKLY\r\nEND:VEVENT\r\n\
                 BEGIN:VEVENT\r\nUID:r\r\nRECURRENCE-ID:20240108T090000Z\r\nSUMMARY:{summary}\r\n\
                 DTSTART:20240108T100000Z\r\nEND:VEVENT\r\n"
            )
        };

        let before = read(&series("Moved"), Tz::UTC).unwrap();
        let after = read(&series("Moved again"), Tz::UTC).unwrap();

        assert_eq!(before.len(), 2);
        assert_eq!(before.get("r").unwrap().title, "Weekly");
        let moved = before.iter().find(|e| e.recurrence_id.is_some()).unwrap();
        assert_eq!(moved.recurrence_id.unwrap().to_rfc3339(), "2024-01-08T09:00:00+00:00");
        assert_ne!(before, after);
    }

    #[test]
    fn empty_calendar_yields_empty_set() {
        assert!(read("", Tz::UTC).unwrap().is_empty());
    }

    #[test]
    fn reading_same_document_twice_is_equal() {
        let body = "BEGIN:VEVENT\r\nUID:a\r\nDTSTART:20240101T120000Z\r\nEND:VEVENT\r\n\
                    BEGIN:VEVENT\r\nUID:b\r\nDTSTART;VALUE=DATE:20240105\r\nEND:VEVENT\r\n";
        assert_eq!(read(body, Tz::UTC).unwrap(), read(body, Tz::UTC).unwrap());
    }
}
