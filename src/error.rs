//! Error taxonomy for the ingestion pipeline.
//!
//! Per-URL failures ([`FetchError`], [`ParseError`], [`ValidationError`]) are
//! recoverable: the orchestrator turns them into feed error entries and keeps
//! going. [`SinkError`] is the only failure that is fatal to a run.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Network-level failure while retrieving a URL.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP status {status}")]
    Status {
        status: u16,
        retry_after: Option<Duration>,
    },

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to read response body: {0}")]
    Body(String),
}

impl FetchError {
    /// Timeouts, connection failures, 5xx and 429 are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Connect(_) => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Request(_) | FetchError::Body(_) => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }

    /// Server-requested delay, only ever set on 429/503 responses.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Required fields an adapter must extract from an article page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Body,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Title => f.write_str("title"),
            Field::Body => f.write_str("body"),
        }
    }
}

/// Structural failure while extracting fields from a fetched page.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("required field `{0}` not found in page")]
    MissingField(Field),

    #[error("malformed feed document: {0}")]
    Feed(String),
}

/// A parsed record that fails the canonical-record checks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("title is empty after normalization")]
    EmptyTitle,

    #[error("body text is empty after normalization")]
    EmptyBody,

    #[error("url `{0}` is not an absolute http(s) url")]
    BadUrl(String),
}

/// Feed write failure. Fatal to the run.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to serialize batch: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("source `{0}` is registered more than once")]
    Duplicate(String),

    #[error("unknown source `{0}`")]
    Unknown(String),

    #[error("no sources selected")]
    Empty,
}

/// Why a triggered run did not produce a feed.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("feed write failed: {0}")]
    Sink(#[from] SinkError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        let status = |status| FetchError::Status {
            status,
            retry_after: None,
        };
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!status(403).is_retryable());
        assert!(FetchError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(FetchError::Connect("reset".into()).is_retryable());
        assert!(!FetchError::Body("bad gzip".into()).is_retryable());
    }

    #[test]
    fn test_parse_error_names_field() {
        let e = ParseError::MissingField(Field::Body);
        assert_eq!(e.to_string(), "required field `body` not found in page");
    }
}
