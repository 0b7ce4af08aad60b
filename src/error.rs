//! Error types for db-pager.
//!
//! Defines the error taxonomy shared by the server-side cache and the
//! client-side orchestrator.

use thiserror::Error;

/// Main error type for cache and pagination operations.
#[derive(Error, Debug)]
pub enum PagerError {
    /// Malformed request (page < 1, unknown filter column, etc.)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown or expired session.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Read attempted while the session is still materializing.
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Result set too large to page interactively; CSV export is still offered.
    #[error("Result too large to page: {total_rows} rows")]
    SizeExceeded { total_rows: usize },

    /// The underlying query failed.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Client-observed transient failure (timeout, dropped connection); retryable.
    #[error("Transient error: {0}")]
    Transient(String),

    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration errors (invalid config file, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (unexpected states, bugs, closed channels).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PagerError {
    /// Creates a validation error with the given message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a not-found error with the given message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Creates a not-ready error with the given message.
    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }

    /// Creates an execution error with the given message.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Creates a transient error with the given message.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if a client poll loop should retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Validation Error",
            Self::NotFound(_) => "Not Found",
            Self::NotReady(_) => "Not Ready",
            Self::SizeExceeded { .. } => "Size Exceeded",
            Self::Execution(_) => "Execution Error",
            Self::Transient(_) => "Transient Error",
            Self::Connection(_) => "Connection Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using PagerError.
pub type Result<T> = std::result::Result<T, PagerError>;
