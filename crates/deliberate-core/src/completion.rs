//! The participant call boundary.
//!
//! A [`Completion`] turns a system/user prompt pair into a response string.
//! Structures never look inside it: any error, or an empty answer, means
//! "this participant failed this turn". [`CompletionError::is_transient`]
//! decides whether the fan-out structure may retry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Generation parameters forwarded untouched to the backend
/// (`temperature`, `max_tokens`, `top_p`, ...).
pub type Params = serde_json::Map<String, serde_json::Value>;

/// A single generation request issued by a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier recorded in participant history.
    pub model: String,
    /// Optional fixed persona / system instructions.
    pub system: Option<String>,
    /// The user prompt: task plus any formatted context.
    pub user: String,
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub params: Params,
}

/// Classification of completion failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionErrorKind {
    /// Rate limited (429).
    RateLimited,
    /// Server error (5xx).
    ServerError,
    /// Connection failure or timeout.
    Network,
    /// The backend answered with no content.
    Empty,
    /// Bad request, auth failure and other 4xx answers.
    Client,
    /// The response body could not be decoded.
    Parse,
}

impl CompletionErrorKind {
    /// Transient kinds may succeed when the same request is retried.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            CompletionErrorKind::RateLimited
                | CompletionErrorKind::ServerError
                | CompletionErrorKind::Network
                | CompletionErrorKind::Empty
        )
    }
}

impl std::fmt::Display for CompletionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CompletionErrorKind::RateLimited => "rate limited",
            CompletionErrorKind::ServerError => "server error",
            CompletionErrorKind::Network => "network error",
            CompletionErrorKind::Empty => "empty response",
            CompletionErrorKind::Client => "client error",
            CompletionErrorKind::Parse => "parse error",
        };
        write!(f, "{s}")
    }
}

/// Opaque failure of a completion call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct CompletionError {
    pub kind: CompletionErrorKind,
    pub message: String,
}

impl CompletionError {
    pub fn new(kind: CompletionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The null-result signal: the backend returned nothing usable.
    pub fn empty() -> Self {
        Self::new(CompletionErrorKind::Empty, "completion returned no content")
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::Network, message)
    }

    pub fn client(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::Client, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::Parse, message)
    }

    /// Build an error from an HTTP status code and response body.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(classify_http_status(status), message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Map an HTTP status code onto a [`CompletionErrorKind`].
pub fn classify_http_status(status: u16) -> CompletionErrorKind {
    match status {
        429 => CompletionErrorKind::RateLimited,
        400..=499 => CompletionErrorKind::Client,
        _ => CompletionErrorKind::ServerError,
    }
}

/// The response-generation call behind every participant.
///
/// Implementations must be shareable across concurrently running
/// participants; the fan-out structure calls several at once.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CompletionErrorKind::RateLimited.is_transient());
        assert!(CompletionErrorKind::ServerError.is_transient());
        assert!(CompletionErrorKind::Network.is_transient());
        assert!(CompletionErrorKind::Empty.is_transient());
        assert!(!CompletionErrorKind::Client.is_transient());
        assert!(!CompletionErrorKind::Parse.is_transient());
    }

    #[test]
    fn test_http_status_classification() {
        assert_eq!(classify_http_status(429), CompletionErrorKind::RateLimited);
        assert_eq!(classify_http_status(500), CompletionErrorKind::ServerError);
        assert_eq!(classify_http_status(503), CompletionErrorKind::ServerError);
        assert_eq!(classify_http_status(400), CompletionErrorKind::Client);
        assert_eq!(classify_http_status(401), CompletionErrorKind::Client);
    }

    #[test]
    fn test_error_display_includes_kind_and_message() {
        let err = CompletionError::from_status(503, "upstream unavailable");
        let msg = err.to_string();
        assert!(msg.contains("server error"));
        assert!(msg.contains("upstream unavailable"));
        assert!(err.is_transient());
    }
}
