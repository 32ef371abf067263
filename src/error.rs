use std::time::Duration;
use thiserror::Error;

/// Errors raised by a single fetch attempt
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("content too large: {0} bytes")]
    ContentTooLarge(usize),
    #[error("render failed: {0}")]
    Render(String),
}

impl FetchError {
    /// Whether the attempt is worth retrying with backoff.
    ///
    /// Timeouts, connection failures, 5xx and 429 are transient. Every other
    /// status and every malformed request is permanent for the session.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Network(_) | FetchError::Render(_) => true,
            FetchError::Status(code) => *code == 429 || (500..600).contains(code),
            FetchError::InvalidUrl(_) | FetchError::ContentTooLarge(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not report the configured duration
            FetchError::Timeout(Duration::ZERO)
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else if err.is_builder() {
            FetchError::InvalidUrl(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Engine-level errors surfaced to callers of the crawl API
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid seed URL '{url}': {reason}")]
    InvalidSeed { url: String, reason: String },
    #[error("invalid URL pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("unknown session {0}")]
    UnknownSession(uuid::Uuid),
    #[error("session {0} has not finished")]
    SessionActive(uuid::Uuid),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = CrawlError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(FetchError::Network("reset".into()).is_transient());
        assert!(FetchError::Status(503).is_transient());
        assert!(FetchError::Status(429).is_transient());

        assert!(!FetchError::Status(404).is_transient());
        assert!(!FetchError::Status(403).is_transient());
        assert!(!FetchError::InvalidUrl("x".into()).is_transient());
        assert!(!FetchError::ContentTooLarge(1).is_transient());
    }
}
