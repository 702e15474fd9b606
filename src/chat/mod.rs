use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChatError;

pub mod conversation;
pub mod decoder;
pub mod selector;
pub mod session;
pub mod stream;

pub use conversation::{Conversation, SharedConversation};
pub use decoder::{LineOutcome, StreamDecoder};
pub use selector::{run_turn, FallbackReason, ReplyUpdate, TurnOutcome};
pub use session::{ChatReply, ChatSession};
pub use stream::{decode_stream, delta_stream, ByteStream, DeltaStream};

/// Role of a participant in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The clinician typing into the chat panel
    User,
    /// The AI assistant participant in the conversation
    Assistant,
}

impl ChatRole {
    /// Wire name of the role as chat backends expect it.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Caller-assigned identifier, unique within a conversation
    pub id: String,
    /// The role of who sent this message (user or assistant)
    pub role: ChatRole,
    /// The text content of the message. Only ever appended to while a reply streams in.
    pub content: String,
    /// When the message was created
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a new builder for a user message
    pub fn user() -> ChatMessageBuilder {
        ChatMessageBuilder::new(ChatRole::User)
    }

    /// Create a new builder for an assistant message
    pub fn assistant() -> ChatMessageBuilder {
        ChatMessageBuilder::new(ChatRole::Assistant)
    }
}

/// Builder for ChatMessage
#[derive(Debug)]
pub struct ChatMessageBuilder {
    role: ChatRole,
    id: Option<String>,
    content: String,
    timestamp: Option<DateTime<Utc>>,
}

impl ChatMessageBuilder {
    /// Create a new ChatMessageBuilder with specified role
    pub fn new(role: ChatRole) -> Self {
        Self {
            role,
            id: None,
            content: String::new(),
            timestamp: None,
        }
    }

    /// Use a specific id instead of a generated one
    pub fn id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the message content
    pub fn content<S: Into<String>>(mut self, content: S) -> Self {
        self.content = content.into();
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Build the ChatMessage
    pub fn build(self) -> ChatMessage {
        ChatMessage {
            id: self
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            role: self.role,
            content: self.content,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        }
    }
}

/// Conversation history handed to a [`ChatTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Ask the backend for a chunked stream instead of a single JSON body
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            stream: false,
        }
    }

    /// Copy of this request with the stream flag set to `stream`.
    pub fn with_stream(&self, stream: bool) -> Self {
        Self {
            messages: self.messages.clone(),
            stream,
        }
    }
}

/// Body of a non-streaming chat reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackResponse {
    pub response: String,
}

/// What the backend sent back for a streaming request.
pub enum StreamReply {
    /// A chunked body to decode as it arrives
    Stream(ByteStream),
    /// The backend ignored the stream flag and answered with the whole reply
    Whole(FallbackResponse),
    /// The backend answered without any readable body
    NoBody,
}

/// Transport used to reach the chat backend.
///
/// Implementations are constructed once and shared by reference; the
/// selector decides which of the two calls to make for a turn.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Starts a streaming request.
    ///
    /// # Returns
    ///
    /// * `Ok(StreamReply::Stream)` - the raw response body, chunked as it arrives
    /// * `Ok(StreamReply::Whole)` - a complete reply that must not be requested again
    /// * `Ok(StreamReply::NoBody)` - the backend answered but exposes nothing to read
    /// * `Err(ChatError)` - the request itself failed (network, status)
    async fn open_stream(&self, request: &ChatRequest) -> Result<StreamReply, ChatError>;

    /// Sends a blocking request and waits for the whole reply.
    async fn complete(&self, request: &ChatRequest) -> Result<FallbackResponse, ChatError>;
}
