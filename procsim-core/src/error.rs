//! Error types for procsim-core

use thiserror::Error;

use crate::workspace::Activity;

/// Main error type for the procsim-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error outside the oracle boundary (snapshot encoding)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// No API credential is configured for the oracle
    #[error("oracle unavailable: no API key configured")]
    OracleUnavailable,

    /// The oracle answered with data that does not satisfy the expected schema
    #[error("malformed oracle response: {0}")]
    MalformedResponse(String),

    /// Network failure or credential rejection while talking to the oracle
    #[error("oracle transport failure: {0}")]
    Transport(String),

    /// Step not found
    #[error("step not found: {0}")]
    StepNotFound(String),

    /// Rejected user input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The same oracle activity is already running
    #[error("{0} already in progress")]
    Busy(Activity),

    /// No optimization proposal in the transcript
    #[error("no optimization proposal to apply")]
    NoProposal,
}

impl Error {
    /// Whether this failure came from the oracle exchange itself
    /// (as opposed to local storage or configuration).
    pub fn is_oracle_failure(&self) -> bool {
        matches!(self, Error::MalformedResponse(_) | Error::Transport(_))
    }
}

/// Result type alias for procsim-core
pub type Result<T> = std::result::Result<T, Error>;
