//! Error type shared by every part of the chat client.

/// Errors that can occur while talking to the chat backend.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// HTTP request/response errors
    #[error("HTTP Error: {0}")]
    HttpError(String),
    /// Authentication and authorization errors
    #[error("Auth Error: {0}")]
    AuthError(String),
    /// The backend rejected the request because of rate limiting
    #[error("Too many requests: {0}")]
    TooManyRequests(String),
    /// The backend answered with a body that could not be decoded
    #[error("Response Format Error: {message}. Raw response: {raw_response}")]
    ResponseFormatError {
        message: String,
        raw_response: String,
    },
    /// Non-success answers from the backend
    #[error("Provider Error: {0}")]
    ProviderError(String),
    /// The response body failed while it was being streamed
    #[error("Stream Error: {0}")]
    StreamError(String),
    /// Invalid or missing configuration
    #[error("Config Error: {0}")]
    ConfigError(String),
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::HttpError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ChatError {
    fn from(err: serde_yaml::Error) -> Self {
        ChatError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_format_error_display_includes_raw_body() {
        let err = ChatError::ResponseFormatError {
            message: "missing field `response`".to_string(),
            raw_response: "{}".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Response Format Error: missing field `response`. Raw response: {}"
        );
    }

    #[test]
    fn test_yaml_error_converts_to_config_error() {
        let err = serde_yaml::from_str::<u64>("[not, a, number]").unwrap_err();
        assert!(matches!(ChatError::from(err), ChatError::ConfigError(_)));
    }
}
