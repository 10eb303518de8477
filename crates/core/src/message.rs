//! Message and Conversation domain types.
//!
//! A conversation is the ordered history sent to the model on every request:
//! the system prompt first, then alternating user and assistant turns.
//! Tool results travel back to the model as user messages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (rules, tools, project context)
    System,
    /// The end user, or synthetic tool results presented as user input
    User,
    /// The model
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Raw text, including any tool-call JSON the assistant emitted.
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Ordered, append-only message history.
///
/// The first message is always the system prompt. It is never removed, only
/// replaced through [`Conversation::set_system_prompt`] or [`Conversation::reset`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    /// Add a message to the end of the history.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Replace the system prompt, keeping the rest of the history.
    pub fn set_system_prompt(&mut self, system_prompt: impl Into<String>) {
        self.messages[0] = Message::system(system_prompt);
    }

    /// Drop everything and start over from a fresh system prompt.
    pub fn reset(&mut self, system_prompt: impl Into<String>) {
        self.messages.clear();
        self.messages.push(Message::system(system_prompt));
    }

    /// Drop messages past `len`, never touching the system prompt.
    pub fn truncate(&mut self, len: usize) {
        self.messages.truncate(len.max(1));
    }

    pub fn system_prompt(&self) -> &str {
        &self.messages[0].content
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when only the system prompt is present.
    pub fn is_empty(&self) -> bool {
        self.messages.len() <= 1
    }
}
