//! Pipeline definition domain types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::run::RunStatus;

/// A named, recurring extract-stage-transform job definition
///
/// Structure shared between the orchestration core (persists and updates)
/// and the CLI (registers and displays). One row per pipeline name; only
/// active definitions are eligible for due-selection or lookup-by-name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub source_kind: SourceKind,
    /// URL or local path; an optional `#fragment` carries a source-specific
    /// hint (JSON record path for API sources, archive member for bulk
    /// downloads).
    pub source_location: String,
    pub staging_table: String,
    pub output_table: String,
    pub transform_procedure: String,
    pub refresh_frequency: RefreshFrequency,
    pub next_due_date: NaiveDate,
    pub last_run_date: Option<chrono::DateTime<chrono::Utc>>,
    pub last_run_status: Option<RunStatus>,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Where a pipeline's records come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    Api,
    Csv,
    BulkDownload,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Api => "API",
            SourceKind::Csv => "CSV",
            SourceKind::BulkDownload => "BULK_DOWNLOAD",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "API" => Ok(SourceKind::Api),
            "CSV" => Ok(SourceKind::Csv),
            "BULK_DOWNLOAD" => Ok(SourceKind::BulkDownload),
            other => Err(UnknownVariant::new("source kind", other)),
        }
    }
}

/// How often a pipeline becomes due for refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefreshFrequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Manual,
}

impl RefreshFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshFrequency::Daily => "DAILY",
            RefreshFrequency::Weekly => "WEEKLY",
            RefreshFrequency::Monthly => "MONTHLY",
            RefreshFrequency::Quarterly => "QUARTERLY",
            RefreshFrequency::Manual => "MANUAL",
        }
    }
}

impl fmt::Display for RefreshFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefreshFrequency {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DAILY" => Ok(RefreshFrequency::Daily),
            "WEEKLY" => Ok(RefreshFrequency::Weekly),
            "MONTHLY" => Ok(RefreshFrequency::Monthly),
            "QUARTERLY" => Ok(RefreshFrequency::Quarterly),
            "MANUAL" => Ok(RefreshFrequency::Manual),
            other => Err(UnknownVariant::new("refresh frequency", other)),
        }
    }
}

/// A stored enum string that no variant recognizes
#[derive(Debug, Clone, thiserror::Error)]
#[error("unrecognized {kind} '{value}'")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
