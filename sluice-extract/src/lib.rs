//! Sluice Extractors
//!
//! Source collaborators for the sluice orchestration core. Each extractor
//! fetches from one kind of source and returns a finite, already-materialized
//! batch of flat records; the orchestrator never sees streams or partial
//! batches because it needs the row count before staging begins.
//!
//! Variants:
//! - `ApiExtractor`: JSON over HTTP
//! - `CsvExtractor`: delimited file, fetched from a URL or read from disk
//! - `BulkDownloadExtractor`: ZIP archive of delimited exports
//!
//! A source location may carry a `#fragment` hint: the JSON record path for
//! API sources (`…/bank-holidays.json#england-and-wales.events`) or the
//! archive member name for bulk downloads.

pub mod error;

mod api;
mod bulk;
mod delimited;

pub use api::ApiExtractor;
pub use bulk::BulkDownloadExtractor;
pub use delimited::CsvExtractor;
pub use error::{ExtractError, Result};

use async_trait::async_trait;
use std::time::Duration;

use sluice_core::domain::pipeline::SourceKind;
use sluice_core::domain::record::Record;

/// One source, one fetch
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Fetches from the source and returns every record in one batch
    ///
    /// Fails on network or parse errors. All records in the batch share the
    /// same field names.
    async fn extract(&self) -> Result<Vec<Record>>;
}

/// Picks the extractor variant for a source
pub trait SelectExtractor: Send + Sync {
    fn select(&self, kind: SourceKind, location: &str) -> Box<dyn Extractor>;
}

/// The default source-kind to extractor mapping
pub struct SourceExtractors;

impl SelectExtractor for SourceExtractors {
    fn select(&self, kind: SourceKind, location: &str) -> Box<dyn Extractor> {
        match kind {
            SourceKind::Api => Box::new(ApiExtractor::new(location)),
            SourceKind::Csv => Box::new(CsvExtractor::new(location)),
            SourceKind::BulkDownload => Box::new(BulkDownloadExtractor::new(location)),
        }
    }
}

/// Splits an optional `#fragment` hint off a source location
pub(crate) fn split_fragment(location: &str) -> (&str, Option<&str>) {
    match location.split_once('#') {
        Some((base, fragment)) => (base, (!fragment.is_empty()).then_some(fragment)),
        None => (location, None),
    }
}

/// HTTP client shared by the extractor variants
///
/// The request timeout lives here: the orchestrator imposes none of its own.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .unwrap_or_default()
}

/// Reads the raw payload from an `http(s)` URL or a local path
pub(crate) async fn fetch_bytes(client: &reqwest::Client, location: &str) -> Result<Vec<u8>> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let response = client.get(location).send().await?;

        if !response.status().is_success() {
            return Err(ExtractError::Status {
                status: response.status().as_u16(),
                url: location.to_string(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    } else {
        Ok(tokio::fs::read(location).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_fragment() {
        assert_eq!(
            split_fragment("https://example.org/data.json#a.b"),
            ("https://example.org/data.json", Some("a.b"))
        );
        assert_eq!(
            split_fragment("/srv/exports/epraccur.zip"),
            ("/srv/exports/epraccur.zip", None)
        );
        assert_eq!(
            split_fragment("https://example.org/data.json#"),
            ("https://example.org/data.json", None)
        );
    }
}
