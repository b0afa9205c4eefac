//! Transcript vocabulary shared by the store, the reconciler and the extractor.

pub use completion::{Message, Role};

/// User message that bootstraps a new game. It is sent to the model like any
/// other turn but never shown and never counted as active content.
pub const START_SENTINEL: &str = "Start Game";

/// Whether a message is the bootstrap sentinel.
pub fn is_sentinel(message: &Message) -> bool {
    message.role == Role::User && message.content == START_SENTINEL
}

/// The active view of a transcript: everything except the sentinel.
pub fn active_messages(messages: &[Message]) -> impl DoubleEndedIterator<Item = &Message> {
    messages.iter().filter(|m| !is_sentinel(m))
}

/// Assemble the full request sequence: system prompt, the entire stored
/// transcript, then the new user turn.
pub fn request_messages(system_prompt: &str, history: &[Message], new_turn: &Message) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(system_prompt));
    messages.extend(history.iter().cloned());
    messages.push(new_turn.clone());
    messages
}
