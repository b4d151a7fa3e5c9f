// src/error.rs

//! Unified error handling for the catalog builder.
//!
//! [`AppError`] covers failures that abort an operation (bad configuration,
//! unwritable cache, download errors). Per-source scrape problems are not
//! errors in this sense: they are reported as [`ScrapeFailure`] values so a
//! refresh can keep going for every other source.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization failed
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Lookup of a source or entry failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Download failed
    #[error("Download error for {url}: {message}")]
    Download { url: String, message: String },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a download error with the offending URL.
    pub fn download(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Download {
            url: url.into(),
            message: message.to_string(),
        }
    }
}

/// Why a single source could not be refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Fetch failed: timeout, connection error, or HTTP error status.
    /// Retrying later may succeed.
    Unreachable,
    /// The listing could not be turned into rows (empty body, bad selectors).
    /// Needs a configuration change before a retry makes sense.
    ParseFailed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Unreachable => f.write_str("unreachable"),
            FailureKind::ParseFailed => f.write_str("parse failed"),
        }
    }
}

/// Structured per-source scrape failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeFailure {
    pub source_id: String,
    pub kind: FailureKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl ScrapeFailure {
    pub fn new(source_id: impl Into<String>, kind: FailureKind, message: impl fmt::Display) -> Self {
        Self {
            source_id: source_id.into(),
            kind,
            message: message.to_string(),
            at: Utc::now(),
        }
    }

    pub fn unreachable(source_id: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::new(source_id, FailureKind::Unreachable, message)
    }

    pub fn parse_failed(source_id: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::new(source_id, FailureKind::ParseFailed, message)
    }

    /// Whether the same configuration might succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        self.kind == FailureKind::Unreachable
    }
}

impl fmt::Display for ScrapeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.source_id, self.kind, self.message)
    }
}

impl std::error::Error for ScrapeFailure {}
