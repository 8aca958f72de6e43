//! Error types for the collaborator seams
//!
//! Store and notification failures are values the scheduler inspects, never panics.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use thiserror::Error;

/// Failure reading from or writing to the event store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] sqlite::Error),

    /// A row could not be mapped back into an `Event`
    #[error("corrupt event row: {0}")]
    Corrupt(String),

    #[error("event store unavailable: {0}")]
    Unavailable(String),
}

/// Failure delivering a reminder
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("discord request failed: {0}")]
    Discord(#[from] serenity::Error),

    #[error("invalid channel id '{0}'")]
    InvalidChannel(String),

    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Invalid or missing configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },

    #[error("{0}")]
    Constraint(String),
}
