use crate::message::{ContentBlock, GroupedBlock, ToolGroupItem, TurnRecord};
use crate::sanitize::{PlainTextOptions, sanitize_plain_text};

/// Collapse strictly adjacent `tool_use` blocks with the same name into one group.
///
/// Every other block is wrapped on its own; any block in between, or a different
/// tool name, starts a new group.
pub fn group_blocks<I>(blocks: I) -> Vec<GroupedBlock>
where
    I: IntoIterator<Item = ContentBlock>,
{
    let mut groups: Vec<GroupedBlock> = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::ToolUse { id, name, input } => {
                if let Some(GroupedBlock::ToolGroup {
                    name: last_name,
                    items,
                }) = groups.last_mut()
                {
                    if *last_name == name {
                        items.push(ToolGroupItem { id, input });
                        continue;
                    }
                }
                groups.push(GroupedBlock::ToolGroup {
                    name,
                    items: vec![ToolGroupItem { id, input }],
                });
            }
            other => groups.push(GroupedBlock::Content { block: other }),
        }
    }
    groups
}

/// Group all blocks of an accumulated turn, in event order.
pub fn group_turn_blocks(turn: &TurnRecord) -> Vec<GroupedBlock> {
    group_blocks(turn.blocks().cloned())
}

impl GroupedBlock {
    /// Short display label, e.g. `Read ×3`. Tool names are sanitized.
    pub fn summary_label(&self) -> String {
        match self {
            Self::ToolGroup { name, items } => {
                let name = sanitize_plain_text(name, PlainTextOptions::default());
                if items.len() > 1 {
                    format!("{name} ×{}", items.len())
                } else {
                    name
                }
            }
            Self::Content { block } => match block {
                ContentBlock::Text { .. } => "text".to_string(),
                ContentBlock::ToolUse { name, .. } => {
                    sanitize_plain_text(name, PlainTextOptions::default())
                }
                ContentBlock::ToolResult { is_error: true, .. } => "error".to_string(),
                ContentBlock::ToolResult { .. } => "result".to_string(),
                ContentBlock::Thinking { .. } => "thinking".to_string(),
            },
        }
    }

    /// Number of source blocks this group stands for.
    pub fn block_count(&self) -> usize {
        match self {
            Self::ToolGroup { items, .. } => items.len(),
            Self::Content { .. } => 1,
        }
    }
}
