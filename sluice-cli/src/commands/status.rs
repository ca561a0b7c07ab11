//! Pipeline status display
//!
//! Tabular dump of every registered definition, overdue pipelines first.
//! Pipelines whose last run failed also show the most recent failure
//! message from the audit trail.

use anyhow::Result;
use chrono::Utc;
use colored::*;
use sqlx::PgPool;

use sluice_core::domain::pipeline::PipelineDefinition;
use sluice_core::domain::run::RunStatus;
use sluice_runner::repository::{AuditStore, MetadataStore, PgAuditStore, PgMetadataStore};

pub async fn show_status(pool: &PgPool) -> Result<()> {
    let metadata = PgMetadataStore::new(pool.clone());
    let audit = PgAuditStore::new(pool.clone());

    let mut definitions = metadata.list_all().await?;
    if definitions.is_empty() {
        println!("{}", "No pipelines registered.".yellow());
        return Ok(());
    }

    let today = Utc::now().date_naive();
    let is_overdue =
        |definition: &PipelineDefinition| definition.is_active && definition.next_due_date <= today;

    definitions.sort_by(|a, b| {
        is_overdue(b)
            .cmp(&is_overdue(a))
            .then_with(|| a.name.cmp(&b.name))
    });

    println!();
    println!(
        "{:<24} {:<11} {:<12} {:<12} {:<8} {}",
        "Pipeline", "Frequency", "Last run", "Next due", "Overdue", "Status"
    );
    println!("{}", "-".repeat(80));

    for definition in &definitions {
        let last_run = definition
            .last_run_date
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "never".to_string());

        let overdue = if !definition.is_active {
            "-"
        } else if is_overdue(definition) {
            "YES"
        } else {
            "no"
        };

        println!(
            "{:<24} {:<11} {:<12} {:<12} {:<8} {}",
            truncate(&definition.name, 24),
            definition.refresh_frequency.as_str(),
            last_run,
            definition.next_due_date.to_string(),
            overdue,
            status_label(definition)
        );

        if definition.last_run_status == Some(RunStatus::Failed) {
            if let Some(run) = audit.latest_run(definition.id).await? {
                let error = run.extraction.error.or(run.staging.error).or(run.etl.error);
                if let Some(error) = error {
                    println!("    {} {}", "last error:".dimmed(), error.red());
                }
            }
        }
    }

    println!();
    Ok(())
}

fn status_label(definition: &PipelineDefinition) -> ColoredString {
    if !definition.is_active {
        return "INACTIVE".dimmed();
    }

    match definition.last_run_status {
        Some(RunStatus::Succeeded) => "SUCCESS".green(),
        Some(RunStatus::Failed) => "FAILED".red(),
        Some(RunStatus::Running) => "RUNNING".yellow(),
        None => "NEVER RUN".dimmed(),
    }
}

fn truncate(name: &str, width: usize) -> String {
    if name.chars().count() <= width {
        name.to_string()
    } else {
        let mut shortened: String = name.chars().take(width - 1).collect();
        shortened.push('…');
        shortened
    }
}
