//! Error types for the alert pipeline.

use crate::worker::task::EscalationTask;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A record field that could not be interpreted.
///
/// Recovered locally: the record is skipped and the batch continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("user {user_id}: unparseable time '{raw}'")]
    InvalidTime { user_id: String, raw: String },

    #[error("user {user_id}: unparseable duration '{raw}'")]
    InvalidDuration { user_id: String, raw: String },
}

/// Escalation queue errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The dispatcher has shut down; the task is handed back to the caller.
    #[error("escalation queue is closed, task {} from {} not accepted", .0.id, .0.sender)]
    Closed(Box<EscalationTask>),
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
