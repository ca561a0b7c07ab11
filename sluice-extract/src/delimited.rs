//! Delimited flat-file extractor
//!
//! Reads a headered CSV export from a URL or a local path. The header row
//! names the fields; empty cells become nulls so they stage as SQL NULL.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use sluice_core::domain::record::Record;

use crate::error::Result;
use crate::{Extractor, fetch_bytes, http_client};

/// Extractor for delimited exports
pub struct CsvExtractor {
    location: String,
    client: reqwest::Client,
}

impl CsvExtractor {
    pub fn new(location: &str) -> Self {
        Self {
            location: location.to_string(),
            client: http_client(),
        }
    }
}

#[async_trait]
impl Extractor for CsvExtractor {
    async fn extract(&self) -> Result<Vec<Record>> {
        debug!(location = %self.location, "fetching csv records");

        let bytes = fetch_bytes(&self.client, &self.location).await?;
        records_from_csv(&bytes)
    }
}

/// Parses a headered CSV payload into a record batch
pub(crate) fn records_from_csv(bytes: &[u8]) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|header| header.trim().to_string())
        .collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;

        let mut record = Record::new();
        for (index, header) in headers.iter().enumerate() {
            let field = row.get(index).unwrap_or("").trim();
            let value = if field.is_empty() {
                Value::Null
            } else {
                Value::String(field.to_string())
            };
            record.insert(header.clone(), value);
        }
        records.push(record);
    }

    Ok(records)
}
