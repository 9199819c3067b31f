//! Error types for echoip
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for echoip operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for echoip
#[derive(Error, Debug)]
pub enum Error {
    /// A source answered, but the body could not be turned into an IP reading
    #[error("Parse error from {source_name}: {message}")]
    Parse {
        /// Source that produced the response
        source_name: String,
        /// What was wrong with it
        message: String,
    },

    /// A source could not be reached
    #[error("Connection error from {source_name}: {message}")]
    Connection {
        /// Source that failed
        source_name: String,
        /// Transport error text
        message: String,
    },

    /// A source answered with a non-success HTTP status
    #[error("HTTP error from {source_name}: {status}")]
    Http {
        /// Source that failed
        source_name: String,
        /// Status code returned
        status: u16,
    },

    /// Every source failed or returned insufficient data (single-source provider)
    #[error("No sources returned a valid response")]
    NoSourcesResponded,

    /// Fewer sources are registered than the agreement threshold requires
    #[error("{required} sources are required but only {configured} configured")]
    InsufficientSources {
        /// Minimum agreement threshold
        required: usize,
        /// Number of registered sources
        configured: usize,
    },

    /// The consensus pass finished without a qualifying result
    #[error("An insufficient number of sources were able to agree")]
    NoAgreement,

    /// A source registration was rejected
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors (config files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a parse error for a source
    pub fn parse(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create a connection error for a source
    pub fn connection(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP status error for a source
    pub fn http(source_name: impl Into<String>, status: u16) -> Self {
        Self::Http {
            source_name: source_name.into(),
            status,
        }
    }

    /// Create an invalid source error
    pub fn invalid_source(msg: impl Into<String>) -> Self {
        Self::InvalidSource(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error is a single source's fetch failure.
    ///
    /// Providers skip over these and move on to the next source; anything
    /// else aborts the pass.
    pub fn is_source_failure(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::Connection { .. } | Self::Http { .. }
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
