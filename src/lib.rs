//! Streaming AI-chat client for the physiotherapy clinician assistant.
//!
//! The interesting part is [`chat::decoder`]: it turns a chunked reply body
//! (SSE `data:` lines, JSON lines or plain text, split anywhere) into text
//! deltas. [`chat::selector::run_turn`] decides between streaming and a
//! blocking request for each turn, and [`ChatSession`] ties both to a
//! conversation and an injected [`chat::ChatTransport`].

pub mod backends;
pub mod builder;
pub mod chat;
pub mod config;
pub mod error;

pub use builder::ChatBuilder;
pub use chat::{
    ChatMessage, ChatReply, ChatRequest, ChatRole, ChatSession, ChatTransport, Conversation,
    FallbackReason, FallbackResponse, ReplyUpdate, SharedConversation, StreamReply, TurnOutcome,
};
pub use config::ChatConfig;
pub use error::ChatError;
