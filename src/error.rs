//! Error types for db-chat.
//!
//! Each pipeline component reports its own variant so the session can turn
//! any failure into a readable chat entry.

use thiserror::Error;

/// Main error type for db-chat operations.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Cannot open, switch, or reach the database (host unreachable, auth failed, unknown database).
    #[error("Connection error: {0}")]
    Connection(String),

    /// Schema introspection failures (missing table, permission denied).
    #[error("Query error: {0}")]
    Query(String),

    /// Language model failures (unreachable, timeout, malformed response).
    #[error("Generation error: {0}")]
    Generation(String),

    /// Statement execution failures (syntax errors, constraint violations, timeouts).
    #[error("Execution error: {0}")]
    Execution(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal application errors (unexpected states, closed channels).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a schema query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a generation error with the given message.
    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    /// Creates an execution error with the given message.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Generation(_) => "Generation Error",
            Self::Execution(_) => "Execution Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns the message without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Connection(msg)
            | Self::Query(msg)
            | Self::Generation(msg)
            | Self::Execution(msg)
            | Self::Config(msg)
            | Self::Internal(msg) => msg,
        }
    }
}

/// Result type alias using ChatError.
pub type Result<T> = std::result::Result<T, ChatError>;
