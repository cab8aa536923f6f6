//! Bounded conversation history.

use hostagent_llm::{ChatMessage, Role};

/// Drop the oldest messages until at most `max` remain.
///
/// A leading system message is always kept.  Tool results left at the head
/// without their assistant tool-call message are dropped as well, so the
/// model never sees a result it did not ask for.
pub fn trim_history(history: &mut Vec<ChatMessage>, max: usize) {
    if history.len() <= max {
        return;
    }
    let start = usize::from(history.first().is_some_and(|m| m.role == Role::System));
    let excess = history.len() - max.max(start);
    history.drain(start..start + excess);

    let orphans = history[start..]
        .iter()
        .take_while(|m| m.role == Role::Tool)
        .count();
    history.drain(start..start + orphans);
}

/// Keep only the leading system message, if any.
pub fn reset_history(history: &mut Vec<ChatMessage>) {
    let keep = usize::from(history.first().is_some_and(|m| m.role == Role::System));
    history.truncate(keep);
}
