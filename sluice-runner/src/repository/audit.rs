//! Pipeline run audit store
//!
//! Append/update log of phase-level run outcomes. A run row is opened in
//! RUNNING state before the first phase executes, so a crash mid-phase
//! still leaves a discoverable record for operators. Each phase's triple is
//! written exactly once, in phase order; finalization happens exactly once.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use sluice_core::domain::run::{
    PhaseOutcome, PhaseStatus, PipelineRun, RunStatus, TriggeredBy,
};

/// Audit trail operations consumed by the runner
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Opens a run record in RUNNING state; returns the run id
    async fn open_run(&self, pipeline_id: Uuid, triggered_by: TriggeredBy) -> Result<Uuid>;

    /// Writes the extraction phase triple
    async fn record_extraction(
        &self,
        run_id: Uuid,
        rows: i64,
        status: PhaseStatus,
        error: Option<&str>,
    ) -> Result<()>;

    /// Writes the staging phase triple
    async fn record_staging(
        &self,
        run_id: Uuid,
        rows: i64,
        status: PhaseStatus,
        error: Option<&str>,
    ) -> Result<()>;

    /// Writes the ETL phase triple
    async fn record_etl(
        &self,
        run_id: Uuid,
        rows: i64,
        status: PhaseStatus,
        error: Option<&str>,
    ) -> Result<()>;

    /// Sets the overall status and end time
    async fn finalize_run(&self, run_id: Uuid, overall: RunStatus) -> Result<()>;

    /// Most recent run for a pipeline, if it has ever run
    async fn latest_run(&self, pipeline_id: Uuid) -> Result<Option<PipelineRun>>;
}

/// Postgres implementation of the audit store
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn open_run(&self, pipeline_id: Uuid, triggered_by: TriggeredBy) -> Result<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO pipeline_runs (id, pipeline_id, started_at, overall_status, triggered_by)
            VALUES ($1, $2, NOW(), $3, $4)
            "#,
        )
        .bind(id)
        .bind(pipeline_id)
        .bind(RunStatus::Running.as_str())
        .bind(triggered_by.as_str())
        .execute(&self.pool)
        .await
        .context("failed to open run audit record")?;

        Ok(id)
    }

    async fn record_extraction(
        &self,
        run_id: Uuid,
        rows: i64,
        status: PhaseStatus,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE pipeline_runs
            SET rows_extracted = $2,
                extraction_status = $3,
                extraction_error = $4
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(rows)
        .bind(status.as_str())
        .bind(error)
        .execute(&self.pool)
        .await
        .context("failed to record extraction outcome")?;

        Ok(())
    }

    async fn record_staging(
        &self,
        run_id: Uuid,
        rows: i64,
        status: PhaseStatus,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE pipeline_runs
            SET rows_staged = $2,
                staging_status = $3,
                staging_error = $4
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(rows)
        .bind(status.as_str())
        .bind(error)
        .execute(&self.pool)
        .await
        .context("failed to record staging outcome")?;

        Ok(())
    }

    async fn record_etl(
        &self,
        run_id: Uuid,
        rows: i64,
        status: PhaseStatus,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE pipeline_runs
            SET rows_loaded = $2,
                etl_status = $3,
                etl_error = $4
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(rows)
        .bind(status.as_str())
        .bind(error)
        .execute(&self.pool)
        .await
        .context("failed to record etl outcome")?;

        Ok(())
    }

    async fn finalize_run(&self, run_id: Uuid, overall: RunStatus) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE pipeline_runs
            SET completed_at = NOW(),
                overall_status = $2
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(overall.as_str())
        .execute(&self.pool)
        .await
        .context("failed to finalize run audit record")?;

        Ok(())
    }

    async fn latest_run(&self, pipeline_id: Uuid) -> Result<Option<PipelineRun>> {
        let row = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT id, pipeline_id, started_at, completed_at, overall_status, triggered_by,
                   rows_extracted, extraction_status, extraction_error,
                   rows_staged, staging_status, staging_error,
                   rows_loaded, etl_status, etl_error
            FROM pipeline_runs
            WHERE pipeline_id = $1
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
        .bind(pipeline_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to read the audit trail")?;

        row.map(PipelineRun::try_from).transpose()
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct RunRow {
    id: Uuid,
    pipeline_id: Uuid,
    started_at: chrono::DateTime<chrono::Utc>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    overall_status: String,
    triggered_by: String,
    rows_extracted: Option<i64>,
    extraction_status: Option<String>,
    extraction_error: Option<String>,
    rows_staged: Option<i64>,
    staging_status: Option<String>,
    staging_error: Option<String>,
    rows_loaded: Option<i64>,
    etl_status: Option<String>,
    etl_error: Option<String>,
}

fn phase(status: Option<String>, error: Option<String>, rows: Option<i64>) -> PhaseOutcome {
    PhaseOutcome {
        status: status.as_deref().and_then(|s| s.parse::<PhaseStatus>().ok()),
        error,
        rows,
    }
}

impl TryFrom<RunRow> for PipelineRun {
    type Error = anyhow::Error;

    fn try_from(row: RunRow) -> Result<Self> {
        let overall_status = row
            .overall_status
            .parse::<RunStatus>()
            .context("run audit row")?;
        let triggered_by = row
            .triggered_by
            .parse::<TriggeredBy>()
            .context("run audit row")?;

        Ok(PipelineRun {
            id: row.id,
            pipeline_id: row.pipeline_id,
            started_at: row.started_at,
            completed_at: row.completed_at,
            overall_status,
            triggered_by,
            extraction: phase(row.extraction_status, row.extraction_error, row.rows_extracted),
            staging: phase(row.staging_status, row.staging_error, row.rows_staged),
            etl: phase(row.etl_status, row.etl_error, row.rows_loaded),
        })
    }
}
