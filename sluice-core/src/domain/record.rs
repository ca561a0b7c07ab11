//! Extracted record types

/// One flat extracted row: field name to value, insertion order preserved
///
/// All records in a batch are expected to share the same shape; the keys of
/// the first record define the staging column list for the whole batch.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Column list for a batch, taken from the first record
///
/// An empty batch has no columns.
pub fn columns(records: &[Record]) -> Vec<String> {
    records
        .first()
        .map(|record| record.keys().cloned().collect())
        .unwrap_or_default()
}
