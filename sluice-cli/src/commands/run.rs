//! Run command handlers
//!
//! Per-pipeline failures are reported and exit zero; only store
//! connectivity failures propagate and fail the process.

use anyhow::Result;
use colored::*;
use sqlx::PgPool;

use sluice_core::domain::run::TriggeredBy;
use sluice_runner::repository::{MetadataStore, PgMetadataStore};
use sluice_runner::{PipelineRunner, RunnerError};

/// Run a single pipeline by name
pub async fn run_one(pool: &PgPool, name: &str, force: bool) -> Result<()> {
    let runner = PipelineRunner::new(pool.clone());

    match runner.run_pipeline(name, force, TriggeredBy::Manual).await {
        Ok(true) => {
            println!("{} pipeline '{}' completed", "✓".green(), name);
            Ok(())
        }
        Ok(false) => {
            println!(
                "{} pipeline '{}' failed, see the audit trail",
                "✗".red(),
                name
            );
            Ok(())
        }
        Err(RunnerError::NotFound(_)) => {
            println!("{} pipeline '{}' not found or inactive", "✗".red(), name);
            Ok(())
        }
        Err(RunnerError::Store(err)) => Err(err),
    }
}

/// Run every due pipeline in sequence
pub async fn run_all(pool: &PgPool, force: bool) -> Result<()> {
    let runner = PipelineRunner::new(pool.clone());

    let summary = match runner.run_due(force).await {
        Ok(summary) => summary,
        Err(RunnerError::Store(err)) => return Err(err),
        Err(other) => return Err(anyhow::Error::new(other)),
    };

    if summary.attempted() == 0 {
        println!("{}", "No pipelines are due.".yellow());
    } else {
        println!(
            "{} {} succeeded, {} failed",
            "Batch complete:".bold(),
            summary.succeeded.to_string().green(),
            summary.failed.to_string().red()
        );
    }

    Ok(())
}

/// Clear a pipeline's active flag
pub async fn deactivate(pool: &PgPool, name: &str) -> Result<()> {
    let store = PgMetadataStore::new(pool.clone());

    if store.deactivate(name).await? {
        println!("{} pipeline '{}' deactivated", "✓".green(), name);
    } else {
        println!("{} no pipeline named '{}'", "✗".red(), name);
    }

    Ok(())
}
