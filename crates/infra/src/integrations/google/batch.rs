//! `multipart/mixed` encoding for the Google batch endpoint.
//!
//! Each part wraps one inner HTTP request and is numbered through its
//! `Content-ID`; the response echoes the numbers back as `response-itemN`,
//! so results are matched by id rather than by position.

use icalsync_core::BatchOperation;
use icalsync_domain::{Result, SyncError};
use uuid::Uuid;

use super::types::{error_message, EventInsertBody};
use crate::errors::{status_error, InfraError};

const CRLF: &str = "\r\n";

/// Encoded batch body and the boundary it was written with.
#[derive(Debug, Clone)]
pub(crate) struct BatchRequest {
    pub boundary: String,
    pub body: String,
}

impl BatchRequest {
    pub fn content_type(&self) -> String {
        format!("multipart/mixed; boundary={}", self.boundary)
    }
}

/// Encode `operations` against `calendar_id`.
///
/// `api_path` is the path prefix of the Calendar API, e.g. `/calendar/v3`.
pub(crate) fn encode(
    api_path: &str,
    calendar_id: &str,
    operations: &[BatchOperation],
) -> Result<BatchRequest> {
    let boundary = format!("batch_{}", Uuid::new_v4().simple());
    let events_path =
        format!("{api_path}/calendars/{}/events", urlencoding::encode(calendar_id));

    let mut body = String::new();
    for (index, operation) in operations.iter().enumerate() {
        body.push_str(&format!("--{boundary}{CRLF}"));
        body.push_str(&format!("Content-Type: application/http{CRLF}"));
        body.push_str(&format!("Content-ID: <item{}>{CRLF}{CRLF}", index + 1));

        match operation {
            BatchOperation::Insert(draft) => {
                let json = serde_json::to_string(&EventInsertBody::from(draft))
                    .map_err(|err| SyncError::from(InfraError::from(err)))?;
                body.push_str(&format!("POST {events_path} HTTP/1.1{CRLF}"));
                body.push_str(&format!("Content-Type: application/json; charset=UTF-8{CRLF}"));
                body.push_str(&format!("Content-Length: {}{CRLF}{CRLF}", json.len()));
                body.push_str(&json);
                body.push_str(CRLF);
            }
            BatchOperation::Delete { event_id } => {
                body.push_str(&format!(
                    "DELETE {events_path}/{} HTTP/1.1{CRLF}{CRLF}",
                    urlencoding::encode(event_id)
                ));
            }
        }
    }
    body.push_str(&format!("--{boundary}--{CRLF}"));

    Ok(BatchRequest { boundary, body })
}

/// Pull the boundary parameter out of a `multipart/mixed` content type.
pub(crate) fn boundary_of(content_type: &str) -> Option<String> {
    content_type.split(';').map(str::trim).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim().eq_ignore_ascii_case("boundary").then(|| value.trim().trim_matches('"').to_string())
    })
}

/// Decode a batch response into one result per submitted operation.
///
/// An operation the response does not mention is reported as a failure.
pub(crate) fn decode(content_type: &str, body: &str, expected: usize) -> Result<Vec<Result<()>>> {
    let boundary = boundary_of(content_type).ok_or_else(|| {
        SyncError::Parse(format!("batch response has no multipart boundary: {content_type}"))
    })?;
    let delimiter = format!("--{boundary}");

    let mut results: Vec<Option<Result<()>>> = vec![None; expected];
    let mut position = 0usize;

    for part in body.split(delimiter.as_str()).skip(1) {
        if part.starts_with("--") {
            break;
        }
        if part.trim().is_empty() {
            continue;
        }

        let parsed = parse_part(part)?;
        let index = parsed.content_index.unwrap_or(position);
        position += 1;

        match results.get_mut(index) {
            Some(slot) => *slot = Some(parsed.into_result()),
            None => {
                return Err(SyncError::Parse(format!(
                    "batch response refers to item {} of {expected}",
                    index + 1
                )))
            }
        }
    }

    Ok(results
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| {
                Err(SyncError::BatchItem(format!("no response for batch item {}", index + 1)))
            })
        })
        .collect())
}

#[derive(Debug)]
struct ResponsePart {
    content_index: Option<usize>,
    status: u16,
    body: String,
}

impl ResponsePart {
    fn into_result(self) -> Result<()> {
        if (200..300).contains(&self.status) {
            return Ok(());
        }
        let message = error_message(&self.body).unwrap_or_else(|| "batch item failed".to_string());
        Err(status_error(self.status, &message))
    }
}

fn parse_part(part: &str) -> Result<ResponsePart> {
    let mut lines = part.lines().skip_while(|line| line.trim().is_empty());

    let mut content_index = None;
    for line in lines.by_ref() {
        if line.trim().is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-id") {
                content_index = content_id_index(value.trim());
            }
        }
    }

    let status_line = lines
        .by_ref()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| SyncError::Parse("batch response part has no status line".into()))?;
    let status = parse_status_line(status_line)?;

    for line in lines.by_ref() {
        if line.trim().is_empty() {
            break;
        }
    }
    let body = lines.collect::<Vec<_>>().join("\n");

    Ok(ResponsePart { content_index, status, body })
}

/// `<response-item3>` maps to index 2.
fn content_id_index(value: &str) -> Option<usize> {
    let inner = value.trim_start_matches('<').trim_end_matches('>');
    let digits = inner.rsplit("item").next()?;
    digits.parse::<usize>().ok().and_then(|n| n.checked_sub(1))
}

fn parse_status_line(line: &str) -> Result<u16> {
    let mut fields = line.split_whitespace();
    match (fields.next(), fields.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => code
            .parse::<u16>()
            .map_err(|_| SyncError::Parse(format!("invalid status in batch part: {line}"))),
        _ => Err(SyncError::Parse(format!("invalid status line in batch part: {line}"))),
    }
}
