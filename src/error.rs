// src/error.rs

//! Unified error handling for the news aggregator.

use std::fmt;

use thiserror::Error;

/// Result type alias for aggregator operations.
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

    /// Upstream body did not have the expected shape
    #[error("Upstream format error for {context}: {message}")]
    UpstreamFormat { context: String, message: String },

    /// Upstream envelope reported a non-success status
    #[error("Upstream status {retcode}: {message}")]
    UpstreamStatus { retcode: i64, message: String },

    /// Delivery sink rejected or failed a payload
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// State persistence failed (cycle-fatal)
    #[error("State error: {0}")]
    State(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Run-level deadline expired before the cycle finished
    #[error("Run deadline exceeded after {0:?}")]
    Deadline(std::time::Duration),
}

impl AppError {
    /// Create an upstream format error with context.
    pub fn upstream_format(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::UpstreamFormat {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create an upstream status error.
    pub fn upstream_status(retcode: i64, message: impl Into<String>) -> Self {
        Self::UpstreamStatus {
            retcode,
            message: message.into(),
        }
    }

    /// Create a delivery error.
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery(message.into())
    }

    /// Create a state error.
    pub fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether a bounded retry with backoff may succeed.
    ///
    /// Only network-level failures qualify. Format and logical errors are
    /// deterministic for a given upstream body and retrying cannot help.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            AppError::Delivery(_) => true,
            _ => false,
        }
    }
}
