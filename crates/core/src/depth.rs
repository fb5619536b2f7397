use crate::message::{ChatMessage, ContentBlock};
use std::collections::{HashMap, HashSet};

/// Message id → sub-agent nesting depth (0 for top-level messages).
pub type DepthMap = HashMap<String, usize>;

/// Spawned task id → `parent_tool_use_id` of the message that spawned it.
pub type TaskParentIndex = HashMap<String, Option<String>>;

/// Whether a `tool_use` with this name launches a sub-agent.
pub fn is_subagent_spawn(name: &str) -> bool {
    matches!(
        name.trim().to_ascii_lowercase().as_str(),
        "task" | "agent" | "subagent"
    )
}

/// Scan every agent message's `tool_use` blocks for sub-agent spawns.
///
/// When the same task id is spawned twice, the first spawn wins.
pub fn build_task_parent_index(messages: &[ChatMessage]) -> TaskParentIndex {
    let mut index = TaskParentIndex::new();
    for msg in messages {
        let Some(turn) = msg.turn_view() else {
            continue;
        };
        let parent = turn.parent_tool_use_id().map(str::to_string);
        for block in turn.blocks() {
            if let ContentBlock::ToolUse { id, name, .. } = block {
                if is_subagent_spawn(name) {
                    index.entry(id.clone()).or_insert_with(|| parent.clone());
                }
            }
        }
    }
    index
}

/// Compute the nesting depth of every message. Rebuilt from scratch on each call.
pub fn resolve_depths(messages: &[ChatMessage]) -> DepthMap {
    let index = build_task_parent_index(messages);
    resolve_depths_with_index(messages, &index)
}

/// Same as [`resolve_depths`] with a caller-supplied index.
pub fn resolve_depths_with_index(messages: &[ChatMessage], index: &TaskParentIndex) -> DepthMap {
    let mut memo: HashMap<String, usize> = HashMap::new();
    let mut depths = DepthMap::with_capacity(messages.len());

    for msg in messages {
        let parent = msg
            .turn_view()
            .and_then(|turn| turn.parent_tool_use_id().map(str::to_string));
        let depth = match parent {
            Some(task_id) => task_depth(&task_id, index, &mut memo),
            None => 0,
        };
        depths.insert(msg.id.clone(), depth);
    }

    depths
}

/// `depth(task) = 1 + depth(index[task])`, with `depth(absent) = 0`.
///
/// Walks the chain iteratively. A task seen twice in the same walk closes the
/// cycle at depth 1.
fn task_depth(task_id: &str, index: &TaskParentIndex, memo: &mut HashMap<String, usize>) -> usize {
    let mut chain: Vec<&str> = Vec::new();
    let mut visiting: HashSet<&str> = HashSet::new();
    let mut current = Some(task_id);

    let base = loop {
        let Some(id) = current else {
            break 0;
        };
        if let Some(&known) = memo.get(id) {
            break known;
        }
        if !visiting.insert(id) {
            tracing::warn!(task_id = %id, "cycle in sub-agent parent chain");
            break 1;
        }
        chain.push(id);
        current = index.get(id).and_then(|parent| parent.as_deref());
    };

    let mut depth = base;
    for id in chain.into_iter().rev() {
        depth += 1;
        memo.insert(id.to_string(), depth);
    }
    depth
}
