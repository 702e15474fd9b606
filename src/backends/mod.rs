//! Concrete [`ChatTransport`](crate::chat::ChatTransport) implementations.

pub mod http;

pub use http::HttpChat;
