use agentwire_core::depth::resolve_depths;
use agentwire_core::group::group_turn_blocks;
use agentwire_core::sanitize::{
    PlainTextOptions, SanitizePolicy, sanitize_content_block, sanitize_markdown,
    sanitize_plain_text,
};
use agentwire_core::{AGENT_EVENT_ATTR, ChatMessage, GroupedBlock, condense, upsert};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

fn at(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_735_689_600 + seconds, 0).expect("valid timestamp")
}

fn message(id: &str, username: &str, content: &str, payload: Option<Value>) -> ChatMessage {
    let seconds = id.trim_start_matches('m').parse().unwrap_or(0);
    let mut msg = ChatMessage::new(id, username, content, at(seconds));
    if let Some(payload) = payload {
        msg.attributes.insert(AGENT_EVENT_ATTR.to_string(), payload);
    }
    msg
}

/// A session with a parent agent spawning one sub-agent, interleaved with chat,
/// a self echo, and a couple of malformed payloads.
fn fixture_history() -> Vec<ChatMessage> {
    vec![
        message("m1", "alice", "can you look at the build?", None),
        message(
            "m2",
            "bot",
            "Looking into it",
            Some(json!({"turn_id": "t1", "session_id": "s1", "event": "question"})),
        ),
        message(
            "m3",
            "bot",
            "Reading files",
            Some(json!({
                "turn_id": "t1",
                "session_id": "s1",
                "event": "tool_call",
                "tool_name": "Read",
                "blocks": [
                    {"type": "tool_use", "id": "r1", "name": "Read", "input": {"file_path": "Cargo.toml"}},
                    {"type": "tool_use", "id": "r2", "name": "Read", "input": {"file_path": "src/lib.rs"}},
                    {"type": "tool_use", "id": "task_1", "name": "Task", "input": {"prompt": "check CI"}}
                ]
            })),
        ),
        message(
            "m4",
            "bot",
            "CI is red on \x1b[31mlinux\x1b[0m",
            Some(json!({
                "turn_id": "sub-1",
                "event": "text",
                "parent_tool_use_id": "task_1"
            })),
        ),
        message(
            "m5",
            "me",
            "my own agent",
            Some(json!({"turn_id": "t7", "event": "text"})),
        ),
        message(
            "m6",
            "mallory",
            "not really an event",
            Some(json!({"turn_id": ["t1"], "event": "text"})),
        ),
        message(
            "m7",
            "bot",
            "Fixed: see [the run](https://CI.example.com/run/42)",
            Some(json!({"turn_id": "t2", "session_id": "s1", "event": "result", "is_error": false})),
        ),
    ]
}

#[test]
fn live_upserts_converge_with_batch_condense() {
    let history = fixture_history();

    let mut live = Vec::new();
    for msg in &history {
        live = upsert(&live, msg, "me");
    }

    assert_eq!(live, condense(&history, "me"));
}

#[test]
fn condense_is_idempotent_on_fixture() {
    let once = condense(&fixture_history(), "me");
    assert_eq!(condense(&once, "me"), once);
}

#[test]
fn condensed_history_shape() {
    let condensed = condense(&fixture_history(), "me");
    let ids: Vec<_> = condensed.iter().map(|m| m.id.as_str()).collect();
    // m3 and m7 fold into m2 through the session id; m5 is a self echo.
    assert_eq!(ids, ["m1", "m2", "m4", "m6"]);

    let parent = &condensed[1];
    assert!(parent.is_agent_turn());
    assert_eq!(
        parent.content,
        "Fixed: see [the run](https://CI.example.com/run/42)"
    );
    let turn = parent.turn.as_ref().expect("accumulated turn");
    assert_eq!(turn.events().len(), turn.contents().len());
    assert_eq!(turn.len(), 3);

    assert!(!condensed[3].is_agent_turn());
    assert_eq!(condensed[3].attributes.len(), 1);
}

#[test]
fn depths_follow_spawn_chain() {
    let condensed = condense(&fixture_history(), "me");
    let depths = resolve_depths(&condensed);
    assert_eq!(depths.len(), condensed.len());
    assert_eq!(depths["m1"], 0);
    assert_eq!(depths["m2"], 0);
    assert_eq!(depths["m4"], 1);
    assert_eq!(depths["m6"], 0);
}

#[test]
fn grouped_blocks_collapse_read_burst() {
    let condensed = condense(&fixture_history(), "me");
    let turn = condensed[1].turn.as_ref().expect("accumulated turn");
    let groups = group_turn_blocks(turn);
    let labels: Vec<_> = groups.iter().map(GroupedBlock::summary_label).collect();
    assert_eq!(labels, ["Read ×2", "Task"]);
}

#[test]
fn rendered_strings_are_terminal_safe() {
    let condensed = condense(&fixture_history(), "me");
    let policy = SanitizePolicy::default();

    for msg in &condensed {
        let rendered = sanitize_markdown(&msg.content, &policy);
        assert!(
            rendered
                .chars()
                .all(|c| !c.is_control() || c == '\n' || c == '\t'),
            "control char leaked in {rendered:?}"
        );
        assert!(!rendered.contains("https://"), "live link in {rendered:?}");

        if let Some(turn) = &msg.turn {
            for block in turn.blocks() {
                let safe = sanitize_content_block(block, PlainTextOptions::default());
                let encoded = serde_json::to_string(&safe).expect("serialize block");
                assert!(!encoded.contains("\\u001b"));
            }
        }
    }

    assert_eq!(
        sanitize_plain_text(&condensed[2].content, PlainTextOptions::default()),
        "CI is red on \u{241B}[31mlinux\u{241B}[0m"
    );
    assert_eq!(
        sanitize_markdown(&condensed[1].content, &policy),
        "Fixed: see the run (https&#58;//ci.example.com/run/42)"
    );
}

#[test]
fn hyperlinks_respect_allowlist() {
    let policy = SanitizePolicy::with_hyperlinks(["https"]);
    assert_eq!(
        sanitize_markdown("[docs](https://Example.com/path)", &policy),
        "[docs](https://example.com/path)"
    );
    assert_eq!(
        sanitize_markdown("[local](file:///tmp/x)", &policy),
        "local (file&#58;///tmp/x)"
    );
}
