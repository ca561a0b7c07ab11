use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

/// Creates the orchestrator's bookkeeping tables
///
/// Staging tables, output tables and transform procedures are owned by the
/// warehouse operators and are deliberately not created here.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Pipeline metadata table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipelines (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL UNIQUE,
            description TEXT,
            source_kind VARCHAR(20) NOT NULL,
            source_location TEXT NOT NULL,
            staging_table VARCHAR(255) NOT NULL,
            output_table VARCHAR(255) NOT NULL,
            transform_procedure VARCHAR(255) NOT NULL,
            refresh_frequency VARCHAR(20) NOT NULL,
            next_due_date DATE NOT NULL,
            last_run_date TIMESTAMPTZ,
            last_run_status VARCHAR(20),
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Run audit trail
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_runs (
            id UUID PRIMARY KEY,
            pipeline_id UUID NOT NULL REFERENCES pipelines(id) ON DELETE CASCADE,
            started_at TIMESTAMPTZ NOT NULL,
            completed_at TIMESTAMPTZ,
            overall_status VARCHAR(20) NOT NULL,
            triggered_by VARCHAR(20) NOT NULL,
            rows_extracted BIGINT,
            extraction_status VARCHAR(20),
            extraction_error TEXT,
            rows_staged BIGINT,
            staging_status VARCHAR(20),
            staging_error TEXT,
            rows_loaded BIGINT,
            etl_status VARCHAR(20),
            etl_error TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Transform procedures log their affected-row counts here; the
    // orchestrator only ever reads it
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS etl_log (
            id SERIAL PRIMARY KEY,
            procedure_name VARCHAR(255) NOT NULL,
            logged_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            rows_affected BIGINT NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes for due-selection and audit lookups
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pipelines_due ON pipelines(is_active, next_due_date)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pipeline_runs_pipeline ON pipeline_runs(pipeline_id, started_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_etl_log_procedure ON etl_log(procedure_name, logged_at DESC)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Bookkeeping table migrations completed");
    Ok(())
}
