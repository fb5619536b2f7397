//! Agent-turn reconstruction and terminal-safe rendering helpers for a chat client.
//!
//! Untrusted messages flow through [`normalize`] and [`aggregate`]; the resulting
//! list feeds [`depth`] and [`group`]. [`sanitize`] guards every string on its way to
//! the terminal.

pub mod aggregate;
pub mod depth;
pub mod group;
pub mod message;
pub mod normalize;
pub mod sanitize;
pub mod stats;

pub use aggregate::{condense, grouping_key, upsert};
pub use depth::{DepthMap, TaskParentIndex, resolve_depths};
pub use group::group_blocks;
pub use message::*;
pub use normalize::normalize_event;
pub use sanitize::{PlainTextOptions, SanitizePolicy, sanitize_markdown, sanitize_plain_text};

#[cfg(any(test, feature = "testing"))]
pub mod testing;
