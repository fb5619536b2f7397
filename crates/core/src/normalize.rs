//! Allow-list normalization of untrusted agent-event payloads.
//!
//! Every field is read explicitly and type-checked; nothing else in the payload
//! reaches [`CanonicalEvent`].

use crate::message::{CanonicalEvent, ContentBlock, EventKind, TurnRecord};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RejectReason {
    #[error("payload is not an object")]
    NotAnObject,
    #[error("turn_id is missing or not a string")]
    InvalidTurnId,
    #[error("event is missing or not a string")]
    MissingEventKind,
    #[error("unknown event kind: {kind}")]
    UnknownEventKind { kind: String },
}

/// Normalize a payload into a [`CanonicalEvent`], or `None` when it is not an event.
pub fn normalize_event(payload: &Value) -> Option<CanonicalEvent> {
    match try_normalize_event(payload) {
        Ok(event) => Some(event),
        Err(reason) => {
            tracing::debug!(%reason, "ignoring agent event payload");
            None
        }
    }
}

/// Same filter as [`normalize_event`], reporting why a payload was rejected.
pub fn try_normalize_event(payload: &Value) -> Result<CanonicalEvent, RejectReason> {
    let obj = payload.as_object().ok_or(RejectReason::NotAnObject)?;

    let turn_id = obj
        .get("turn_id")
        .and_then(Value::as_str)
        .ok_or(RejectReason::InvalidTurnId)?;

    let raw_kind = obj
        .get("event")
        .and_then(Value::as_str)
        .ok_or(RejectReason::MissingEventKind)?;
    let event = EventKind::parse(raw_kind).ok_or_else(|| RejectReason::UnknownEventKind {
        kind: raw_kind.chars().take(32).collect(),
    })?;

    Ok(CanonicalEvent {
        turn_id: turn_id.to_string(),
        session_id: trimmed_str(obj, "session_id"),
        event,
        tool_name: obj
            .get("tool_name")
            .and_then(Value::as_str)
            .map(str::to_string),
        is_error: obj.get("is_error").and_then(Value::as_bool),
        parent_tool_use_id: trimmed_str(obj, "parent_tool_use_id"),
        blocks: blocks(obj),
    })
}

/// Read the optional `events`/`contents` history carried by a payload.
///
/// Entries of `events` that fail normalization are dropped along with the content
/// at the same index. Returns `None` when no usable history remains.
pub fn normalize_history(payload: &Value) -> Option<TurnRecord> {
    let obj = payload.as_object()?;
    let raw_events = obj.get("events").and_then(Value::as_array)?;
    let raw_contents: &[Value] = obj
        .get("contents")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut events = Vec::with_capacity(raw_events.len());
    let mut contents = Vec::with_capacity(raw_events.len());
    for (i, raw) in raw_events.iter().enumerate() {
        let Some(event) = normalize_event(raw) else {
            continue;
        };
        events.push(event);
        // A missing or non-string content stays aligned as an empty string.
        if let Some(content) = raw_contents.get(i) {
            contents.push(content.as_str().unwrap_or_default().to_string());
        }
    }

    let head = normalize_event(payload).or_else(|| events.first().cloned())?;
    if events.is_empty() {
        return None;
    }
    Some(TurnRecord::from_parts(head, events, contents))
}

fn trimmed_str(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn blocks(obj: &Map<String, Value>) -> Vec<ContentBlock> {
    let Some(raw) = obj.get("blocks").and_then(Value::as_array) else {
        return Vec::new();
    };
    raw.iter()
        .filter_map(|block| serde_json::from_value(block.clone()).ok())
        .collect()
}
