//! Merge per-event agent messages into accumulated turn records.
//!
//! [`upsert`] handles one live message; [`condense`] folds it over a history page.
//! Both produce the same list for the same input, and neither mutates its input.

use crate::message::{AGENT_EVENT_ATTR, CanonicalEvent, ChatMessage, MessageKind, TurnRecord};

/// Key that decides which record an event belongs to.
///
/// `username:session:<id>` when the event carries a session id, otherwise
/// `username:turn:<turn_id>`.
pub fn grouping_key(username: &str, event: &CanonicalEvent) -> String {
    match &event.session_id {
        Some(session_id) => format!("{username}:session:{session_id}"),
        None => format!("{username}:turn:{}", event.turn_id),
    }
}

/// Insert `incoming` into `messages`, merging it into an existing turn record when
/// one shares its grouping key.
pub fn upsert(
    messages: &[ChatMessage],
    incoming: &ChatMessage,
    self_username: &str,
) -> Vec<ChatMessage> {
    let mut next = messages.to_vec();
    upsert_into(&mut next, incoming.clone(), self_username);
    next
}

/// Left-fold [`upsert`] over `messages`. Idempotent.
pub fn condense(messages: &[ChatMessage], self_username: &str) -> Vec<ChatMessage> {
    messages
        .iter()
        .cloned()
        .fold(Vec::with_capacity(messages.len()), |mut acc, msg| {
            upsert_into(&mut acc, msg, self_username);
            acc
        })
}

fn upsert_into(messages: &mut Vec<ChatMessage>, incoming: ChatMessage, self_username: &str) {
    let Some(incoming_turn) = incoming.turn_view() else {
        messages.push(incoming);
        return;
    };

    if incoming.username == self_username {
        tracing::debug!(
            message_id = %incoming.id,
            turn_id = %incoming_turn.head.turn_id,
            "suppressing self-authored agent event"
        );
        return;
    }

    let key = grouping_key(&incoming.username, &incoming_turn.head);
    let existing = messages.iter_mut().find(|msg| {
        msg.username == incoming.username
            && msg.grouping_key().is_some_and(|k| k == key)
    });

    match existing {
        Some(existing) => {
            let Some(mut record) = existing.turn_view() else {
                return;
            };
            record.extend(&incoming_turn);
            existing.content = incoming.content;
            existing.kind = MessageKind::AgentTurn;
            existing.attributes.remove(AGENT_EVENT_ATTR);
            existing.turn = Some(record);
        }
        None => {
            let mut created = incoming;
            created.kind = MessageKind::AgentTurn;
            created.attributes.remove(AGENT_EVENT_ATTR);
            created.turn = Some(incoming_turn);
            messages.push(created);
        }
    }
}
