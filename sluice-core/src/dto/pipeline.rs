//! Pipeline registration DTO

use serde::{Deserialize, Serialize};

use crate::domain::pipeline::{RefreshFrequency, SourceKind};

/// Request to register a new pipeline definition
///
/// The core assigns the id, computes the initial next-due date from the
/// frequency, and marks the definition active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterPipeline {
    pub name: String,
    pub description: Option<String>,
    pub source_kind: SourceKind,
    pub source_location: String,
    pub staging_table: String,
    pub output_table: String,
    pub transform_procedure: String,
    pub refresh_frequency: RefreshFrequency,
}
