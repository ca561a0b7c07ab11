//! Error types for the orchestration core

use thiserror::Error;

/// Result type alias for runner operations
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Errors that cross the runner boundary
///
/// Phase failures never appear here: they are caught, written into the
/// failing phase's audit columns, and reported as an unsuccessful run.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// No active pipeline with the requested name
    #[error("pipeline '{0}' not found or inactive")]
    NotFound(String),

    /// The metadata, audit or warehouse store could not be reached
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
