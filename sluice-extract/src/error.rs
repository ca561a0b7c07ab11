//! Error types for the extractors

use thiserror::Error;

/// Result type alias for extractor operations
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Errors that can occur while fetching or parsing a source
#[derive(Debug, Error)]
pub enum ExtractError {
    /// HTTP request failed
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Source answered with a non-success status code
    #[error("source returned status {status}: {url}")]
    Status { status: u16, url: String },

    /// Local file could not be read
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Delimited payload could not be parsed
    #[error("csv parse error: {0}")]
    Csv(#[from] csv::Error),

    /// Bulk download archive could not be opened
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Payload parsed but did not contain records where expected
    #[error("{0}")]
    Shape(String),
}
