//! Warehouse staging and transform invocation
//!
//! The destructive side of a run: truncate-and-reload of the staging table,
//! invocation of the operator-owned transform procedure, and the
//! best-effort row-count lookup from the ETL log the procedures write to.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};

use sluice_core::domain::record::{Record, columns};

/// Rows bound per INSERT statement; keeps each statement well under the
/// Postgres bind-parameter limit even for wide staging tables.
const INSERT_BATCH: usize = 500;

/// Warehouse operations consumed by the runner
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Truncates the staging table and loads the whole batch
    ///
    /// The first record's keys are the column list; an empty batch leaves
    /// the table truncated and reports zero rows.
    async fn reload_staging(&self, table: &str, records: &[Record]) -> Result<u64>;

    /// Invokes the named transform procedure
    async fn run_procedure(&self, procedure: &str) -> Result<()>;

    /// Most recent logged row count for a procedure, zero when never logged
    async fn latest_rows_affected(&self, procedure: &str) -> Result<i64>;
}

/// Postgres implementation of the warehouse operations
pub struct PgWarehouse {
    pool: PgPool,
}

impl PgWarehouse {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Warehouse for PgWarehouse {
    async fn reload_staging(&self, table: &str, records: &[Record]) -> Result<u64> {
        validate_identifier(table)?;

        sqlx::query(&format!("TRUNCATE TABLE {table}"))
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to truncate {table}"))?;

        if records.is_empty() {
            return Ok(0);
        }

        let column_list = columns(records);
        for column in &column_list {
            validate_identifier(column)?;
        }

        for chunk in records.chunks(INSERT_BATCH) {
            let mut builder = QueryBuilder::<Postgres>::new(format!(
                "INSERT INTO {table} ({}) ",
                column_list.join(", ")
            ));
            builder.push_values(chunk, |mut row, record| {
                for column in &column_list {
                    row.push_bind(text_value(record.get(column.as_str())));
                }
            });

            builder
                .build()
                .execute(&self.pool)
                .await
                .with_context(|| format!("failed to load {table}"))?;
        }

        Ok(records.len() as u64)
    }

    async fn run_procedure(&self, procedure: &str) -> Result<()> {
        validate_identifier(procedure)?;

        sqlx::query(&format!("CALL {procedure}()"))
            .execute(&self.pool)
            .await
            .with_context(|| format!("procedure {procedure} failed"))?;

        Ok(())
    }

    async fn latest_rows_affected(&self, procedure: &str) -> Result<i64> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT rows_affected
            FROM etl_log
            WHERE procedure_name = $1
            ORDER BY logged_at DESC
            LIMIT 1
            "#,
        )
        .bind(procedure)
        .fetch_optional(&self.pool)
        .await
        .context("failed to read the etl log")?;

        Ok(row.map(|(rows,)| rows).unwrap_or(0))
    }
}

/// Staging columns are text; the transform procedure owns typing
fn text_value(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// Table and procedure names come from the metadata table; only plain,
/// optionally schema-qualified identifiers may be interpolated into SQL
fn validate_identifier(name: &str) -> Result<()> {
    let parts_valid = name.split('.').all(|part| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    });

    if name.is_empty() || !parts_valid || name.split('.').count() > 2 {
        bail!("'{name}' is not a valid table or procedure identifier");
    }

    Ok(())
}
