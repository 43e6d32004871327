//! Error types for the dramline stock analytics system.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the dramline stock analytics system.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (missing or invalid setting).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed snapshot data (bad header, unusable row).
    #[error("Parse error: {0}")]
    Parse(String),

    /// Storage engine error (lock held, corrupt file, bad SQL).
    #[error("Database error: {0}")]
    Database(String),

    /// Remote query failed on the backend side.
    #[error("Query {query_id} failed: {reason}")]
    QueryFailed { query_id: String, reason: String },

    /// Remote query exceeded the polling timeout ceiling.
    #[error("Query {query_id} timed out after {seconds}s")]
    QueryTimeout { query_id: String, seconds: u64 },

    /// CSV read/write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Error::Database(msg.into())
    }

    /// Create a remote query failure error.
    pub fn query_failed(query_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::QueryFailed {
            query_id: query_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a remote query timeout error.
    pub fn query_timeout(query_id: impl Into<String>, seconds: u64) -> Self {
        Error::QueryTimeout {
            query_id: query_id.into(),
            seconds,
        }
    }
}
