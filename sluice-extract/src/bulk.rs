//! Bulk download extractor
//!
//! Fetches a bulk export and parses the delimited payload inside it. ZIP
//! archives are opened in memory; the member to parse is named by the
//! location's `#fragment`, or the first `.csv` member is used. A payload
//! that is not an archive is treated as a bare delimited export.

use async_trait::async_trait;
use std::io::{Cursor, Read};
use tracing::debug;
use zip::ZipArchive;

use sluice_core::domain::record::Record;

use crate::delimited::records_from_csv;
use crate::error::{ExtractError, Result};
use crate::{Extractor, fetch_bytes, http_client, split_fragment};

/// Extractor for bulk archive exports
pub struct BulkDownloadExtractor {
    url: String,
    member: Option<String>,
    client: reqwest::Client,
}

impl BulkDownloadExtractor {
    pub fn new(location: &str) -> Self {
        let (url, fragment) = split_fragment(location);
        Self {
            url: url.to_string(),
            member: fragment.map(str::to_string),
            client: http_client(),
        }
    }
}

#[async_trait]
impl Extractor for BulkDownloadExtractor {
    async fn extract(&self) -> Result<Vec<Record>> {
        debug!(url = %self.url, "fetching bulk export");

        let bytes = fetch_bytes(&self.client, &self.url).await?;

        if is_zip(&bytes) {
            records_from_archive(&bytes, self.member.as_deref())
        } else {
            records_from_csv(&bytes)
        }
    }
}

fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(b"PK\x03\x04")
}

/// Parses one delimited member out of a ZIP payload
pub(crate) fn records_from_archive(bytes: &[u8], member: Option<&str>) -> Result<Vec<Record>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let name = match member {
        Some(name) => name.to_string(),
        None => {
            let mut found = None;
            for index in 0..archive.len() {
                let candidate = archive.by_index(index)?;
                if candidate.name().to_ascii_lowercase().ends_with(".csv") {
                    found = Some(candidate.name().to_string());
                    break;
                }
            }
            found.ok_or_else(|| {
                ExtractError::Shape("archive contains no csv member".to_string())
            })?
        }
    };

    let mut file = archive.by_name(&name)?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;

    records_from_csv(&contents)
}
