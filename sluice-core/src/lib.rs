//! Sluice Core
//!
//! Core types and abstractions for the sluice reference-data pipeline system.
//!
//! This crate contains:
//! - Domain types: Core business entities (PipelineDefinition, PipelineRun, etc.)
//! - DTOs: Request objects passed from the CLI into the orchestration core

pub mod domain;
pub mod dto;
