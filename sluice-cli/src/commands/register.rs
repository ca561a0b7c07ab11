//! Interactive pipeline registration

use anyhow::{Context, Result};
use colored::*;
use sqlx::PgPool;
use std::io::{self, BufRead, Write};
use std::str::FromStr;

use sluice_core::domain::pipeline::{RefreshFrequency, SourceKind};
use sluice_core::dto::pipeline::RegisterPipeline;
use sluice_runner::repository::{MetadataStore, PgMetadataStore};

/// Prompt-driven definition creation
pub async fn register_pipeline(pool: &PgPool) -> Result<()> {
    println!("{}", "Register a new pipeline".bold());
    println!();

    let name = prompt("Pipeline name (e.g. 'GP_Practices')")?;
    let description = optional(prompt("Description")?);
    let source_kind = prompt_source_kind()?;
    let source_location = prompt("Source URL or path")?;
    let staging_table = prompt("Staging table (e.g. 'staging_gp_practice')")?;
    let output_table = prompt("Output table (e.g. 'dim_gp_practice')")?;
    let transform_procedure = prompt("Transform procedure (e.g. 'load_dim_gp_practice')")?;
    let refresh_frequency = prompt_frequency()?;

    let store = PgMetadataStore::new(pool.clone());
    let definition = store
        .register(RegisterPipeline {
            name,
            description,
            source_kind,
            source_location,
            staging_table,
            output_table,
            transform_procedure,
            refresh_frequency,
        })
        .await?;

    println!();
    println!("{} pipeline '{}' registered", "✓".green(), definition.name);
    println!("  Next refresh: {}", definition.next_due_date);

    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read input")?;

    Ok(line.trim().to_string())
}

fn optional(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn prompt_source_kind() -> Result<SourceKind> {
    loop {
        let answer = prompt("Source type (API/CSV/BULK_DOWNLOAD)")?;
        match SourceKind::from_str(&answer.to_uppercase()) {
            Ok(kind) => return Ok(kind),
            Err(err) => println!("{}", err.to_string().red()),
        }
    }
}

fn prompt_frequency() -> Result<RefreshFrequency> {
    println!("Refresh frequency:");
    println!("  1. DAILY");
    println!("  2. WEEKLY");
    println!("  3. MONTHLY");
    println!("  4. QUARTERLY");
    println!("  5. MANUAL");

    let choice = prompt("Select frequency (1-5)")?;

    Ok(match choice.as_str() {
        "1" => RefreshFrequency::Daily,
        "3" => RefreshFrequency::Monthly,
        "4" => RefreshFrequency::Quarterly,
        "5" => RefreshFrequency::Manual,
        _ => RefreshFrequency::Weekly,
    })
}
