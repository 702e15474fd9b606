//! Builder for a ready-to-use [`ChatSession`].

use std::sync::Arc;

use crate::backends::http::HttpChat;
use crate::chat::ChatSession;
use crate::config::ChatConfig;
use crate::error::ChatError;

/// Builder for configuring and instantiating a chat session.
///
/// # Example
///
/// ```no_run
/// use physio_chat::ChatBuilder;
///
/// # async fn run() -> Result<(), physio_chat::ChatError> {
/// let session = ChatBuilder::new()
///     .endpoint("https://clinic.example/api/chat")
///     .api_key("sk-TESTKEY")
///     .stream(true)
///     .build()?;
/// let reply = session.send("Suggest a progression for patellar tendinopathy").await?;
/// println!("{:?}", reply.outcome);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default, Clone)]
pub struct ChatBuilder {
    endpoint: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    system: Option<String>,
    timeout_seconds: Option<u64>,
    proxy_url: Option<String>,
    stream: Option<bool>,
}

impl ChatBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a builder with every value present in `config`.
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            system: config.system.clone(),
            timeout_seconds: config.timeout_seconds,
            proxy_url: config.proxy_url.clone(),
            stream: config.stream,
        }
    }

    /// Sets the chat endpoint URL.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the API key for authentication.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the model identifier forwarded to the backend.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the system prompt.
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Sets the timeout for blocking requests in seconds.
    pub fn timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn proxy_url(mut self, proxy_url: impl Into<String>) -> Self {
        self.proxy_url = Some(proxy_url.into());
        self
    }

    /// Enables or disables streaming responses.
    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Builds only the HTTP transport.
    pub fn build_transport(self) -> Result<HttpChat, ChatError> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| ChatError::ConfigError("No chat endpoint specified".to_string()))?;

        HttpChat::new(
            &endpoint,
            self.api_key,
            self.model,
            self.system,
            self.timeout_seconds,
            self.proxy_url,
        )
    }

    /// Builds a session with a fresh conversation.
    pub fn build(self) -> Result<ChatSession, ChatError> {
        let streaming = self.stream.unwrap_or(true);
        let transport = self.build_transport()?;
        Ok(ChatSession::new(Arc::new(transport), streaming))
    }
}
