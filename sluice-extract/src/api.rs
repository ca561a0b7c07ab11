//! JSON API extractor
//!
//! Fetches a JSON document over HTTP and flattens its record array into a
//! batch. The array is named explicitly by the location's `#dot.path`
//! fragment, or discovered by depth-first search when no fragment is given.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use sluice_core::domain::record::Record;

use crate::error::{ExtractError, Result};
use crate::{Extractor, fetch_bytes, http_client, split_fragment};

/// Extractor for JSON HTTP APIs
pub struct ApiExtractor {
    url: String,
    record_path: Option<String>,
    client: reqwest::Client,
}

impl ApiExtractor {
    pub fn new(location: &str) -> Self {
        let (url, fragment) = split_fragment(location);
        Self {
            url: url.to_string(),
            record_path: fragment.map(str::to_string),
            client: http_client(),
        }
    }
}

#[async_trait]
impl Extractor for ApiExtractor {
    async fn extract(&self) -> Result<Vec<Record>> {
        debug!(url = %self.url, "fetching json records");

        let body = fetch_bytes(&self.client, &self.url).await?;
        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| ExtractError::Shape(format!("response is not valid json: {e}")))?;

        records_from_json(&value, self.record_path.as_deref())
    }
}

/// Flattens a JSON document into a record batch
pub(crate) fn records_from_json(value: &Value, record_path: Option<&str>) -> Result<Vec<Record>> {
    let target = match record_path {
        Some(path) => resolve_path(value, path)?,
        None if value.is_array() => value,
        None => find_record_array(value).ok_or_else(|| {
            ExtractError::Shape("response contains no array of records".to_string())
        })?,
    };

    let Value::Array(items) = target else {
        return Err(ExtractError::Shape(format!(
            "'{}' does not name an array",
            record_path.unwrap_or("<root>")
        )));
    };

    Ok(items
        .iter()
        .map(|item| match item {
            Value::Object(map) => map.clone(),
            other => {
                // Scalar elements become single-field records
                let mut record = Record::new();
                record.insert("value".to_string(), other.clone());
                record
            }
        })
        .collect())
}

fn resolve_path<'a>(value: &'a Value, path: &str) -> Result<&'a Value> {
    let mut current = value;
    for key in path.split('.') {
        current = current.get(key).ok_or_else(|| {
            ExtractError::Shape(format!("response has no field '{key}' along '{path}'"))
        })?;
    }
    Ok(current)
}

/// Depth-first search for the first non-empty array of objects
fn find_record_array(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
            Some(value)
        }
        Value::Object(map) => map.values().find_map(find_record_array),
        _ => None,
    }
}
