//! Error types surfaced by providers and the fund store

use thiserror::Error;

/// Failure of a single provider call.
///
/// Providers never retry; the caller decides whether a failure is worth
/// another attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// The request did not complete within the endpoint timeout
    #[error("request timed out")]
    Timeout,

    /// Connection, DNS or other transport level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered with a non-success status
    #[error("provider returned HTTP status {0}")]
    HttpStatus(u16),

    /// The response body could not be decoded
    #[error("parse error: {0}")]
    Parse(String),

    /// The provider answered with an error-shaped payload
    #[error("provider error: {0}")]
    ProviderReported(String),

    /// The response decoded fine but carried no usable data
    #[error("empty result: {0}")]
    EmptyResult(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::HttpStatus(status.as_u16())
        } else if err.is_decode() {
            FetchError::Parse(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Parse(err.to_string())
    }
}

/// Failure of a fund store operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("fund {0} is already in the watch-list")]
    Duplicate(String),

    #[error("fund code must not be empty")]
    InvalidCode,

    #[error("refresh interval must be a positive number of milliseconds")]
    InvalidInterval,

    #[error("failed to fetch fund data: {0}")]
    Fetch(#[from] FetchError),

    #[error("failed to refresh fund data: {0}")]
    AllFailed(String),
}

impl EngineError {
    /// Message shown to the user through `EngineState::error`.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}
