//! Sluice Runner
//!
//! The orchestration core: discovers due pipelines from the metadata table,
//! drives the extract → stage → ETL sequence for a named pipeline, records
//! phase-level outcomes into the audit trail, and recomputes next-due dates
//! from the refresh-frequency policy.
//!
//! Architecture:
//! - `db`: connection pool and idempotent bookkeeping-table migrations
//! - `repository`: metadata, audit and warehouse stores (traits + Postgres)
//! - `runner`: the per-run state machine and the batch loop
//! - `schedule`: the next-due-date policy

pub mod db;
pub mod error;
pub mod repository;
pub mod runner;
pub mod schedule;

pub use error::{Result, RunnerError};
pub use runner::{BatchSummary, PipelineRunner};
