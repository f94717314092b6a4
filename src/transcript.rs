//! UI-agnostic conversation state
//!
//! The transcript is the ordered, role-tagged history of one chat session. The
//! TUI, the line-mode chat and the tests all drive the same type, and the
//! model providers serialize `ChatMessage` straight onto the wire.

use serde::{Deserialize, Serialize};

/// A chat message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// Ordered conversation history, oldest message first.
///
/// While a turn is active the last two entries are the turn's user message and
/// the assistant reply being streamed into. Between turns the last entry is a
/// finished assistant reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Opens a turn: the user's text followed by an empty assistant placeholder.
    pub fn begin_turn(&mut self, text: &str) {
        self.messages.push(ChatMessage::user(text));
        self.messages.push(ChatMessage::assistant(""));
    }

    /// Appends a streamed fragment to the newest message.
    ///
    /// Returns `false` when there is no assistant message to grow.
    pub fn append_to_last(&mut self, fragment: &str) -> bool {
        match self.messages.last_mut() {
            Some(msg) if msg.role == ChatRole::Assistant => {
                msg.content.push_str(fragment);
                true
            }
            _ => false,
        }
    }

    /// Context handed to the model for the turn that was just opened.
    ///
    /// Takes up to `max_prior` messages preceding the current turn and appends
    /// the current user message. The assistant placeholder is never included.
    pub fn context_window(&self, max_prior: usize) -> Vec<ChatMessage> {
        let Some(split) = self.messages.len().checked_sub(2) else {
            return Vec::new();
        };
        let (prior, current) = self.messages.split_at(split);
        let start = prior.len().saturating_sub(max_prior);

        let mut window = prior[start..].to_vec();
        window.push(current[0].clone());
        window
    }
}
