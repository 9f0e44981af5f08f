//! Core error types for bastion-core.
//!
//! Flag submission rejections are not errors: they are ordinary
//! [`SubmitOutcome`](crate::flag::SubmitOutcome) values. The types here cover
//! configuration problems, storage failures and collaborator failures.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Core error type for bastion-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Competition schedule is unusable
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// A side-effect collaborator failed
    #[error("{port} failed: {message}")]
    Port { port: &'static str, message: String },

    /// Listing parameters out of range
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub fn port(port: &'static str, message: impl Into<String>) -> Self {
        CoreError::Port {
            port,
            message: message.into(),
        }
    }
}

/// Schedule validation failures. All of them are fatal at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("competition must begin before it ends (begin {begin}, end {end})")]
    InvertedWindow {
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("round duration must be a positive number of minutes")]
    ZeroRoundDuration,

    #[error("pause must start before it ends (from {start} to {end})")]
    InvertedPause {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("pause from {start} to {end} is not strictly inside the competition window")]
    PauseOutsideWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("pauses must be configured in start-time order (from {start} to {end})")]
    PauseOutOfOrder {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Missing required configuration key
    #[error("Missing required configuration key: {0}")]
    MissingKey(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg)
                if e.code == rusqlite::ErrorCode::DatabaseLocked
                    || e.code == rusqlite::ErrorCode::DatabaseBusy =>
            {
                DatabaseError::Locked
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_error_names_the_collaborator() {
        let err = CoreError::port("flag planter", "ssh timed out");
        assert_eq!(err.to_string(), "flag planter failed: ssh timed out");
    }

    #[test]
    fn query_errors_map_to_query_failed() {
        let err: DatabaseError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, DatabaseError::QueryFailed(_)));
    }
}
