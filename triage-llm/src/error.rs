//! Error types for the LLM client

use thiserror::Error;

/// Result type alias for LLM operations
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors that can occur when calling a chat-completions endpoint
#[derive(Debug, Error)]
pub enum LlmError {
    /// The request did not complete in time
    #[error("LLM request timed out: {0}")]
    Timeout(String),

    /// The endpoint could not be reached
    #[error("Failed to connect to LLM endpoint: {0}")]
    Connect(String),

    /// The endpoint rejected the credentials
    #[error("LLM authentication failed (status {status}): {message}")]
    Unauthorized {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// The endpoint returned a non-success status
    #[error("LLM API error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// The response body was not a valid completion
    #[error("Failed to parse LLM response: {0}")]
    Parse(String),

    /// The completion carried no content
    #[error("LLM returned an empty response")]
    EmptyResponse,

    /// Any other transport failure
    #[error("LLM request failed: {0}")]
    Request(String),
}

impl LlmError {
    /// Create an error from a non-success status and body
    ///
    /// 401 and 403 are classified as authentication failures.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Unauthorized { status, message },
            _ => Self::Api { status, message },
        }
    }

    /// Short stable tag for the failure class
    pub fn category(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Connect(_) => "connection",
            Self::Unauthorized { .. } => "auth",
            Self::Api { .. } => "api",
            Self::Parse(_) => "parse",
            Self::EmptyResponse => "empty",
            Self::Request(_) => "request",
        }
    }

    /// Check if this error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}
