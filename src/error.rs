//! Unified error types for banwatch

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for banwatch operations
#[derive(Error, Debug)]
pub enum Error {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),

    // Config errors
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config validation failed: {0}")]
    ConfigValidation(String),

    // Control interface errors
    #[error("Failed to invoke '{command}': {message}")]
    Invocation { command: String, message: String },

    #[error("Command '{command}' timed out after {secs} seconds")]
    CommandTimeout { command: String, secs: u64 },

    #[error("Command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("Unexpected output from {0}")]
    UnexpectedOutput(String),

    // Unban errors
    #[error("missing address")]
    MissingAddress,

    #[error("not an IPv4 address: '{0}'")]
    NotIpv4(String),

    #[error("Failed to unban {address}: {message}")]
    UnbanFailed { address: String, message: String },

    // Poll loop errors
    #[error("Poll loop is not running")]
    PollLoopClosed,
}

impl Error {
    /// Whether the operator input was rejected before anything ran
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::MissingAddress | Error::NotIpv4(_))
    }

    /// Whether the control tool could not be run at all
    pub fn is_invocation(&self) -> bool {
        matches!(
            self,
            Error::Invocation { .. } | Error::CommandTimeout { .. }
        )
    }
}

/// Result type alias for banwatch operations
pub type Result<T> = std::result::Result<T, Error>;
