use crate::aggregate::grouping_key;
use crate::normalize::{normalize_event, normalize_history};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attribute key under which the transport carries the agent-event payload.
pub const AGENT_EVENT_ATTR: &str = "agent_event";

/// A chat message as delivered by the transport/message-store collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message identifier
    pub id: String,
    /// Author of the message
    pub username: String,
    /// Display content; for agent turns, the most recent event's content
    pub content: String,
    /// When the message was sent
    pub timestamp: DateTime<Utc>,
    /// Plain chat or accumulated agent turn
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    /// Untrusted transport metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, serde_json::Value>,
    /// Accumulated agent turn, present once `kind` is `AgentTurn`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn: Option<TurnRecord>,
}

impl ChatMessage {
    pub fn new(
        id: impl Into<String>,
        username: impl Into<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            content: content.into(),
            timestamp,
            kind: MessageKind::Chat,
            attributes: HashMap::new(),
            turn: None,
        }
    }

    pub fn is_agent_turn(&self) -> bool {
        self.kind == MessageKind::AgentTurn && self.turn.is_some()
    }

    /// The normalized agent event carried in this message's attributes, if any.
    pub fn agent_event(&self) -> Option<CanonicalEvent> {
        self.attributes.get(AGENT_EVENT_ATTR).and_then(normalize_event)
    }

    /// Read-only turn view: the stored record, or a single-event record built from
    /// the attribute payload (seeded from its history when one is carried).
    pub fn turn_view(&self) -> Option<TurnRecord> {
        if let Some(turn) = &self.turn {
            return Some(turn.clone());
        }
        let payload = self.attributes.get(AGENT_EVENT_ATTR)?;
        let event = normalize_event(payload)?;
        Some(
            normalize_history(payload)
                .unwrap_or_else(|| TurnRecord::new(event, self.content.clone())),
        )
    }

    /// Grouping key of this message's record, or of its own agent event.
    pub fn grouping_key(&self) -> Option<String> {
        match &self.turn {
            Some(turn) => Some(grouping_key(&self.username, &turn.head)),
            None => self
                .agent_event()
                .map(|event| grouping_key(&self.username, &event)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Chat,
    AgentTurn,
}

/// Kind of agent activity carried by a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Question,
    ToolCall,
    Text,
    Result,
}

impl EventKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "question" => Some(Self::Question),
            "tool_call" => Some(Self::ToolCall),
            "text" => Some(Self::Text),
            "result" => Some(Self::Result),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::ToolCall => "tool_call",
            Self::Text => "text",
            Self::Result => "result",
        }
    }
}

/// An agent event that survived normalization. Only allow-listed fields exist here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub turn_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub event: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    /// Sub-agent task this event was produced under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<ContentBlock>,
}

impl CanonicalEvent {
    pub fn new(turn_id: impl Into<String>, event: EventKind) -> Self {
        Self {
            turn_id: turn_id.into(),
            session_id: None,
            event,
            tool_name: None,
            is_error: None,
            parent_tool_use_id: None,
            blocks: Vec::new(),
        }
    }
}

/// Accumulated agent turn: every event merged under one grouping key, in arrival order.
///
/// `events` and `contents` are parallel sequences of equal length. Every
/// constructor, mutator and deserialization goes through [`TurnRecord::reconcile`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredTurnRecord")]
pub struct TurnRecord {
    /// Event the record was opened with; determines its grouping key
    pub head: CanonicalEvent,
    events: Vec<CanonicalEvent>,
    contents: Vec<String>,
}

/// Wire shape of a [`TurnRecord`] before its lengths are reconciled.
#[derive(Deserialize)]
struct StoredTurnRecord {
    head: CanonicalEvent,
    #[serde(default)]
    events: Vec<CanonicalEvent>,
    #[serde(default)]
    contents: Vec<String>,
}

impl From<StoredTurnRecord> for TurnRecord {
    fn from(stored: StoredTurnRecord) -> Self {
        Self::from_parts(stored.head, stored.events, stored.contents)
    }
}

impl TurnRecord {
    pub fn new(event: CanonicalEvent, content: impl Into<String>) -> Self {
        Self {
            head: event.clone(),
            events: vec![event],
            contents: vec![content.into()],
        }
    }

    /// Build a record from possibly mismatched sequences, padding or truncating
    /// `contents` to match `events`.
    pub fn from_parts(
        head: CanonicalEvent,
        events: Vec<CanonicalEvent>,
        contents: Vec<String>,
    ) -> Self {
        let mut record = Self {
            head,
            events,
            contents,
        };
        record.reconcile();
        record
    }

    pub fn push(&mut self, event: CanonicalEvent, content: impl Into<String>) {
        self.reconcile();
        self.events.push(event);
        self.contents.push(content.into());
    }

    /// Append every entry of `other` after this record's entries.
    pub fn extend(&mut self, other: &TurnRecord) {
        for (event, content) in other.entries() {
            self.push(event.clone(), content);
        }
    }

    /// Pad `contents` with empty strings or truncate it so it matches `events`.
    /// Returns `true` when the lengths had drifted.
    pub fn reconcile(&mut self) -> bool {
        if self.contents.len() == self.events.len() {
            return false;
        }
        tracing::debug!(
            events = self.events.len(),
            contents = self.contents.len(),
            turn_id = %self.head.turn_id,
            "reconciling turn record lengths"
        );
        self.contents.resize(self.events.len(), String::new());
        true
    }

    pub fn events(&self) -> &[CanonicalEvent] {
        &self.events
    }

    pub fn contents(&self) -> &[String] {
        &self.contents
    }

    /// Ordered `(event, content)` pairs.
    pub fn entries(&self) -> impl Iterator<Item = (&CanonicalEvent, &str)> {
        self.events
            .iter()
            .zip(self.contents.iter().map(String::as_str))
    }

    pub fn latest(&self) -> Option<(&CanonicalEvent, &str)> {
        self.entries().last()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// First non-absent `parent_tool_use_id` among the record's events.
    pub fn parent_tool_use_id(&self) -> Option<&str> {
        self.head
            .parent_tool_use_id
            .as_deref()
            .or_else(|| {
                self.events
                    .iter()
                    .find_map(|event| event.parent_tool_use_id.as_deref())
            })
    }

    /// Every content block of every event, in order.
    pub fn blocks(&self) -> impl Iterator<Item = &ContentBlock> {
        self.events.iter().flat_map(|event| event.blocks.iter())
    }
}

/// Individual unit of an agent's structured output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    Thinking {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        budget_tokens: Option<u32>,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_use(
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// A render unit produced by [`crate::group::group_blocks`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupedBlock {
    Content { block: ContentBlock },
    ToolGroup { name: String, items: Vec<ToolGroupItem> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolGroupItem {
    pub id: String,
    pub input: serde_json::Value,
}
