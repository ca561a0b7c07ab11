//! Data transfer objects
//!
//! Request objects passed from the CLI front end into the orchestration
//! core. DTOs carry only what the caller supplies; identifiers, dates and
//! flags are filled in by the core.

pub mod pipeline;
