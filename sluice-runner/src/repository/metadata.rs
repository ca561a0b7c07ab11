//! Pipeline metadata store
//!
//! Durable record of each pipeline's identity, source, targets, ETL
//! procedure and refresh policy. Due-selection and lookup only ever see
//! active rows; definitions are deactivated, never deleted.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use sluice_core::domain::pipeline::{PipelineDefinition, RefreshFrequency, SourceKind};
use sluice_core::domain::run::RunStatus;
use sluice_core::dto::pipeline::RegisterPipeline;

use crate::schedule::next_due_date;

/// Metadata store operations consumed by the runner and the CLI
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Active definitions eligible to run now
    ///
    /// `force` drops the due-date predicate; inactive definitions are never
    /// returned. Ordering is unspecified.
    async fn due_pipelines(&self, force: bool) -> Result<Vec<PipelineDefinition>>;

    /// Exact, case-sensitive lookup over active definitions
    ///
    /// `None` means "not found", not an error.
    async fn find_by_name(&self, name: &str) -> Result<Option<PipelineDefinition>>;

    /// Every definition, active or not, for status display
    async fn list_all(&self) -> Result<Vec<PipelineDefinition>>;

    /// Creates a definition with its initial next-due date
    async fn register(&self, req: RegisterPipeline) -> Result<PipelineDefinition>;

    /// Records a run outcome and advances the next-due date
    async fn record_outcome(
        &self,
        pipeline_id: Uuid,
        status: RunStatus,
        next_due: NaiveDate,
    ) -> Result<()>;

    /// Clears the active flag; returns false when the name is unknown
    async fn deactivate(&self, name: &str) -> Result<bool>;
}

/// Postgres implementation of the metadata store
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn due_pipelines(&self, force: bool) -> Result<Vec<PipelineDefinition>> {
        let query = if force {
            r#"
            SELECT id, name, description, source_kind, source_location, staging_table,
                   output_table, transform_procedure, refresh_frequency, next_due_date,
                   last_run_date, last_run_status, is_active, created_at, updated_at
            FROM pipelines
            WHERE is_active
            "#
        } else {
            r#"
            SELECT id, name, description, source_kind, source_location, staging_table,
                   output_table, transform_procedure, refresh_frequency, next_due_date,
                   last_run_date, last_run_status, is_active, created_at, updated_at
            FROM pipelines
            WHERE is_active
              AND next_due_date <= CURRENT_DATE
            "#
        };

        let rows = sqlx::query_as::<_, PipelineRow>(query)
            .fetch_all(&self.pool)
            .await
            .context("failed to query due pipelines")?;

        rows.into_iter().map(PipelineDefinition::try_from).collect()
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<PipelineDefinition>> {
        let row = sqlx::query_as::<_, PipelineRow>(
            r#"
            SELECT id, name, description, source_kind, source_location, staging_table,
                   output_table, transform_procedure, refresh_frequency, next_due_date,
                   last_run_date, last_run_status, is_active, created_at, updated_at
            FROM pipelines
            WHERE name = $1 AND is_active
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to look up pipeline '{name}'"))?;

        row.map(PipelineDefinition::try_from).transpose()
    }

    async fn list_all(&self) -> Result<Vec<PipelineDefinition>> {
        let rows = sqlx::query_as::<_, PipelineRow>(
            r#"
            SELECT id, name, description, source_kind, source_location, staging_table,
                   output_table, transform_procedure, refresh_frequency, next_due_date,
                   last_run_date, last_run_status, is_active, created_at, updated_at
            FROM pipelines
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list pipelines")?;

        rows.into_iter().map(PipelineDefinition::try_from).collect()
    }

    async fn register(&self, req: RegisterPipeline) -> Result<PipelineDefinition> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();
        let next_due = next_due_date(now.date_naive(), req.refresh_frequency);

        sqlx::query(
            r#"
            INSERT INTO pipelines (
                id, name, description, source_kind, source_location, staging_table,
                output_table, transform_procedure, refresh_frequency, next_due_date,
                is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, TRUE, $11, $11)
            "#,
        )
        .bind(id)
        .bind(&req.name)
        .bind(&req.description)
        .bind(req.source_kind.as_str())
        .bind(&req.source_location)
        .bind(&req.staging_table)
        .bind(&req.output_table)
        .bind(&req.transform_procedure)
        .bind(req.refresh_frequency.as_str())
        .bind(next_due)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to register pipeline '{}'", req.name))?;

        Ok(PipelineDefinition {
            id,
            name: req.name,
            description: req.description,
            source_kind: req.source_kind,
            source_location: req.source_location,
            staging_table: req.staging_table,
            output_table: req.output_table,
            transform_procedure: req.transform_procedure,
            refresh_frequency: req.refresh_frequency,
            next_due_date: next_due,
            last_run_date: None,
            last_run_status: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    async fn record_outcome(
        &self,
        pipeline_id: Uuid,
        status: RunStatus,
        next_due: NaiveDate,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE pipelines
            SET last_run_date = NOW(),
                last_run_status = $2,
                next_due_date = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(pipeline_id)
        .bind(status.as_str())
        .bind(next_due)
        .execute(&self.pool)
        .await
        .context("failed to update pipeline metadata")?;

        Ok(())
    }

    async fn deactivate(&self, name: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE pipelines SET is_active = FALSE, updated_at = NOW() WHERE name = $1")
                .bind(name)
                .execute(&self.pool)
                .await
                .with_context(|| format!("failed to deactivate pipeline '{name}'"))?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PipelineRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    source_kind: String,
    source_location: String,
    staging_table: String,
    output_table: String,
    transform_procedure: String,
    refresh_frequency: String,
    next_due_date: NaiveDate,
    last_run_date: Option<chrono::DateTime<chrono::Utc>>,
    last_run_status: Option<String>,
    is_active: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<PipelineRow> for PipelineDefinition {
    type Error = anyhow::Error;

    fn try_from(row: PipelineRow) -> Result<Self> {
        let source_kind = row
            .source_kind
            .parse::<SourceKind>()
            .with_context(|| format!("pipeline '{}'", row.name))?;
        let refresh_frequency = row
            .refresh_frequency
            .parse::<RefreshFrequency>()
            .with_context(|| format!("pipeline '{}'", row.name))?;
        // A status written by an older build is display-only; ignore it
        // rather than failing the whole row
        let last_run_status = row
            .last_run_status
            .as_deref()
            .and_then(|status| status.parse::<RunStatus>().ok());

        Ok(PipelineDefinition {
            id: row.id,
            name: row.name,
            description: row.description,
            source_kind,
            source_location: row.source_location,
            staging_table: row.staging_table,
            output_table: row.output_table,
            transform_procedure: row.transform_procedure,
            refresh_frequency,
            next_due_date: row.next_due_date,
            last_run_date: row.last_run_date,
            last_run_status,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
