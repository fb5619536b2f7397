use crate::message::{AGENT_EVENT_ATTR, ChatMessage, ContentBlock};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

/// Plain chat message with a deterministic, increasing timestamp.
pub fn chat_message(id: &str, username: &str, content: &str) -> ChatMessage {
    ChatMessage::new(id, username, content, timestamp())
}

/// Chat message carrying `payload` under the agent-event attribute.
pub fn agent_message(id: &str, username: &str, content: &str, payload: Value) -> ChatMessage {
    let mut msg = chat_message(id, username, content);
    msg.attributes.insert(AGENT_EVENT_ATTR.to_string(), payload);
    msg
}

/// Minimal event payload.
pub fn payload(turn_id: &str, event: &str) -> Value {
    json!({"turn_id": turn_id, "event": event})
}

/// Event payload scoped to a session.
pub fn session_payload(turn_id: &str, session_id: &str, event: &str) -> Value {
    json!({"turn_id": turn_id, "session_id": session_id, "event": event})
}

/// Tool-call payload for a sub-agent turn.
///
/// `parent` is the task the event runs under; `spawns` are task ids this event
/// launches through `Task` tool calls.
pub fn subagent_payload(turn_id: &str, parent: Option<&str>, spawns: &[&str]) -> Value {
    let blocks: Vec<ContentBlock> = spawns.iter().map(|id| spawn_block(id)).collect();
    let mut value = json!({
        "turn_id": turn_id,
        "event": "tool_call",
        "tool_name": "Task",
        "blocks": blocks,
    });
    if let Some(parent) = parent {
        value["parent_tool_use_id"] = json!(parent);
    }
    value
}

/// `tool_use` block that spawns a sub-agent task.
pub fn spawn_block(task_id: &str) -> ContentBlock {
    ContentBlock::tool_use(
        task_id,
        "Task",
        json!({"description": "explore", "prompt": "look around"}),
    )
}

fn timestamp() -> DateTime<Utc> {
    DateTime::from_timestamp(1_735_689_600 + i64::from(next_id()), 0).unwrap_or_default()
}

fn next_id() -> u32 {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}
