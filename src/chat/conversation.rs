//! Ordered message list rendered by the chat panel.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{ChatMessage, ChatRole};

/// Conversation shared between the UI and the task streaming a reply.
pub type SharedConversation = Arc<Mutex<Conversation>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap the conversation for sharing with a streaming turn.
    pub fn shared(self) -> SharedConversation {
        Arc::new(Mutex::new(self))
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Append `delta` to the message with `id`.
    ///
    /// Returns `false` without touching anything when the message is gone,
    /// e.g. because the user cleared the conversation mid-stream.
    pub fn append(&mut self, id: &str, delta: &str) -> bool {
        match self.get_mut(id) {
            Some(message) => {
                message.content.push_str(delta);
                true
            }
            None => false,
        }
    }

    /// Overwrite the content of the message with `id`.
    ///
    /// Only used once a streaming call is over; while one is running the
    /// content is append-only.
    pub fn replace_content(&mut self, id: &str, content: &str) -> bool {
        match self.get_mut(id) {
            Some(message) => {
                message.content.clear();
                message.content.push_str(content);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    pub fn remove(&mut self, id: &str) -> Option<ChatMessage> {
        let index = self.messages.iter().position(|m| m.id == id)?;
        Some(self.messages.remove(index))
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages worth sending to the backend.
    ///
    /// Empty assistant placeholders left behind by failed turns are skipped.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| !(m.role == ChatRole::Assistant && m.content.is_empty()))
            .cloned()
            .collect()
    }
}
