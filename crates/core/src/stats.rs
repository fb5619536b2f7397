use crate::message::{ChatMessage, ContentBlock, EventKind, TurnRecord};
use std::collections::HashMap;

/// Per-turn counts used for collapsed summary lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnStats {
    pub event_count: u64,
    pub question_count: u64,
    pub tool_call_count: u64,
    pub text_count: u64,
    pub result_count: u64,
    /// Events flagged `is_error` plus error tool results
    pub error_count: u64,
    pub subagent_count: u64,
}

impl TurnStats {
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }
}

/// Count events and blocks of a single turn.
pub fn turn_stats(turn: &TurnRecord) -> TurnStats {
    let mut stats = TurnStats::default();
    for event in turn.events() {
        stats.event_count += 1;
        match event.event {
            EventKind::Question => stats.question_count += 1,
            EventKind::ToolCall => stats.tool_call_count += 1,
            EventKind::Text => stats.text_count += 1,
            EventKind::Result => stats.result_count += 1,
        }
        if event.is_error == Some(true) {
            stats.error_count += 1;
        }
    }
    for block in turn.blocks() {
        match block {
            ContentBlock::ToolResult { is_error: true, .. } => stats.error_count += 1,
            ContentBlock::ToolUse { name, .. } if crate::depth::is_subagent_spawn(name) => {
                stats.subagent_count += 1
            }
            _ => {}
        }
    }
    stats
}

/// Count tool calls by tool name across every agent turn. Sorted by count descending,
/// then by name.
pub fn count_tool_calls(messages: &[ChatMessage]) -> Vec<(String, u64)> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for turn in messages.iter().filter_map(ChatMessage::turn_view) {
        for event in turn.events() {
            if event.event != EventKind::ToolCall {
                continue;
            }
            if let Some(name) = event.tool_name.as_deref() {
                *counts.entry(name.to_string()).or_default() += 1;
            }
        }
    }
    let mut result: Vec<_> = counts.into_iter().collect();
    result.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    result
}
