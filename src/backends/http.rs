//! HTTP chat transport.
//!
//! Talks to the assistant's chat endpoint, which answers either with a
//! chunked text stream or a single `{"response": "..."}` object depending on
//! the `stream` flag in the request body.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;

use crate::chat::{ChatRequest, ChatTransport, FallbackResponse, StreamReply};
use crate::error::ChatError;

/// Client for the assistant's chat endpoint.
pub struct HttpChat {
    pub endpoint: Url,
    pub api_key: Option<String>,
    pub model: Option<String>,
    /// Prepended to every request as a `system` message
    pub system: Option<String>,
    /// Applies to blocking calls only; streams may run as long as the server keeps sending
    pub timeout_seconds: Option<u64>,
    client: Client,
}

#[derive(Serialize, Debug)]
struct HttpChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Request payload for the chat endpoint.
#[derive(Serialize, Debug)]
struct HttpChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<HttpChatMessage<'a>>,
    stream: bool,
}

impl HttpChat {
    /// Creates a new chat client.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Absolute URL of the chat endpoint
    /// * `api_key` - Bearer token, if the endpoint needs one
    /// * `model` - Model name forwarded to the backend
    /// * `system` - System prompt
    /// * `timeout_seconds` - Timeout for blocking calls and for connecting
    /// * `proxy_url` - Proxy for all traffic
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        model: Option<String>,
        system: Option<String>,
        timeout_seconds: Option<u64>,
        proxy_url: Option<String>,
    ) -> Result<Self, ChatError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ChatError::ConfigError(format!("invalid chat endpoint {endpoint}: {e}")))?;

        let mut builder = Client::builder();
        if let Some(sec) = timeout_seconds {
            builder = builder.connect_timeout(Duration::from_secs(sec));
        }
        if let Some(proxy_url) = proxy_url {
            let proxy = reqwest::Proxy::all(&proxy_url)
                .map_err(|e| ChatError::ConfigError(format!("invalid proxy {proxy_url}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| ChatError::HttpError(e.to_string()))?;

        Ok(Self {
            endpoint,
            api_key,
            model,
            system,
            timeout_seconds,
            client,
        })
    }

    fn request_body<'a>(&'a self, request: &'a ChatRequest) -> HttpChatRequest<'a> {
        let mut messages: Vec<HttpChatMessage<'a>> = request
            .messages
            .iter()
            .map(|m| HttpChatMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect();

        if let Some(system) = &self.system {
            messages.insert(
                0,
                HttpChatMessage {
                    role: "system",
                    content: system,
                },
            );
        }

        HttpChatRequest {
            model: self.model.as_deref(),
            messages,
            stream: request.stream,
        }
    }

    fn post(&self, body: &HttpChatRequest<'_>) -> reqwest::RequestBuilder {
        if log::log_enabled!(log::Level::Trace) {
            if let Ok(json) = serde_json::to_string(body) {
                log::trace!("chat request payload: {}", json);
            }
        }

        let request = self.client.post(self.endpoint.clone()).json(body);
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

/// Turns a non-success status into the matching error, keeping the body.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
    let status = response.status();
    log::debug!("chat HTTP status: {}", status);

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => ChatError::TooManyRequests(body),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ChatError::AuthError(format!("chat endpoint returned {status}: {body}"))
        }
        _ => ChatError::ProviderError(format!(
            "chat endpoint returned error status {status}: {body}"
        )),
    })
}

fn decode_reply(resp_text: String) -> Result<FallbackResponse, ChatError> {
    match serde_json::from_str::<FallbackResponse>(&resp_text) {
        Ok(reply) => Ok(reply),
        Err(e) => Err(ChatError::ResponseFormatError {
            message: format!("Failed to decode chat response: {e}"),
            raw_response: resp_text,
        }),
    }
}

fn is_json(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"))
}

#[async_trait]
impl ChatTransport for HttpChat {
    async fn open_stream(&self, request: &ChatRequest) -> Result<StreamReply, ChatError> {
        let body = self.request_body(request);
        let response = self
            .post(&body)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = check_status(response).await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(StreamReply::NoBody);
        }

        // A plain JSON answer means the server ignored the stream flag.
        if is_json(&response) {
            log::debug!("chat endpoint answered a stream request with JSON");
            let resp_text = response.text().await?;
            return decode_reply(resp_text).map(StreamReply::Whole);
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ChatError::StreamError(e.to_string())));
        Ok(StreamReply::Stream(Box::pin(stream)))
    }

    async fn complete(&self, request: &ChatRequest) -> Result<FallbackResponse, ChatError> {
        let body = self.request_body(request);
        let mut builder = self.post(&body);
        if let Some(timeout) = self.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let response = check_status(builder.send().await?).await?;
        let resp_text = response.text().await?;
        decode_reply(resp_text)
    }
}
