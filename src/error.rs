//! sqliteserver Error Types

use thiserror::Error;

/// Result type alias for sqliteserver operations
pub type Result<T> = std::result::Result<T, Error>;

/// sqliteserver error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Storage errors
    #[error("{0}")]
    Storage(String),

    #[error("Write log append failed: {0}")]
    WriteLog(String),

    // Request errors
    #[error("{0}")]
    Decode(#[from] serde_json::Error),

    // Replication errors
    #[error("Replication error: {0}")]
    Replication(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Follower {address} rejected statement: {reason}")]
    FollowerRejected { address: String, reason: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error is reported back to the client that issued the request.
    ///
    /// Storage, decode and write-log failures are. Anything raised while talking
    /// to followers is only logged on the leader.
    pub fn is_request_visible(&self) -> bool {
        matches!(
            self,
            Error::Storage(_) | Error::Decode(_) | Error::WriteLog(_)
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e.to_string())
    }
}
