//! Query execution error types
//!
//! Only `Config` and `UnknownBackend` ever reach the caller of
//! [`handle_request`](crate::tsdb::handle_request). Everything else is
//! recorded per query in the batch result.

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while resolving, compiling or executing queries
#[derive(Error, Debug)]
pub enum TsdbError {
    /// A required data source setting is missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// No executor factory is registered for the data source type
    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    /// A query descriptor could not be compiled
    #[error("Compile error: {0}")]
    Compile(String),

    /// The backend was unreachable or answered with an error
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend call did not finish before the query or client deadline
    #[error("Query timed out: {0}")]
    Timeout(String),
}

impl TsdbError {
    /// Failure classification recorded in the batch result
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Transport(_) => FailureKind::Transport,
            Self::Timeout(_) => FailureKind::Timeout,
            _ => FailureKind::Compile,
        }
    }
}

impl From<reqwest::Error> for TsdbError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TsdbError::Timeout(err.to_string())
        } else {
            TsdbError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TsdbError {
    fn from(err: serde_json::Error) -> Self {
        TsdbError::Compile(err.to_string())
    }
}

/// Why a query is missing from the batch result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Compile,
    Transport,
    Timeout,
}

/// Result type alias for query execution
pub type TsdbResult<T> = Result<T, TsdbError>;
