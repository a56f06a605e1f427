//! Error types for the Alfred assistant.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for assistant operations.
pub type AlfredResult<T> = Result<T, AlfredError>;

/// Errors that can occur across the conversation pipeline.
#[derive(Error, Debug)]
pub enum AlfredError {
    /// Microphone/transcription failure.
    #[error("Capture error: {0}")]
    Capture(String),

    /// No utterance was detected within the listen window.
    #[error("No speech detected within the listen window")]
    SilenceTimeout,

    /// Language-model call failed (after retries, where applicable).
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Speech synthesis or output device failure.
    #[error("Playback error: {0}")]
    Playback(String),

    /// Missing credential, invalid mode, bad startup configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure kind reported by the AI gateway. Transient kinds are retried
/// with backoff; permanent kinds fail on the first call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    RateLimited,
    Network,
    Timeout,
    ContentFiltered,
    Auth,
    InvalidRequest,
    Unknown,
}

impl GatewayErrorKind {
    /// Whether the retry policy may attempt this call again.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            GatewayErrorKind::RateLimited | GatewayErrorKind::Network | GatewayErrorKind::Timeout
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GatewayErrorKind::RateLimited => "rate_limited",
            GatewayErrorKind::Network => "network",
            GatewayErrorKind::Timeout => "timeout",
            GatewayErrorKind::ContentFiltered => "content_filtered",
            GatewayErrorKind::Auth => "auth",
            GatewayErrorKind::InvalidRequest => "invalid_request",
            GatewayErrorKind::Unknown => "unknown",
        }
    }
}

/// Structured failure from the language-model API.
#[derive(Error, Debug, Clone)]
#[error("Gateway error ({}): {message}", kind.as_str())]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
    /// Server-provided retry hint (e.g. from a 429 Retry-After header).
    pub retry_after: Option<Duration>,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, hint: Duration) -> Self {
        self.retry_after = Some(hint);
        self
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds() {
        assert!(GatewayErrorKind::RateLimited.is_transient());
        assert!(GatewayErrorKind::Network.is_transient());
        assert!(GatewayErrorKind::Timeout.is_transient());
        assert!(!GatewayErrorKind::ContentFiltered.is_transient());
        assert!(!GatewayErrorKind::Auth.is_transient());
        assert!(!GatewayErrorKind::InvalidRequest.is_transient());
    }

    #[test]
    fn gateway_error_display_includes_kind() {
        let e = GatewayError::new(GatewayErrorKind::Auth, "bad key");
        assert!(e.to_string().contains("auth"));
        assert!(e.to_string().contains("bad key"));
    }
}
