//! Store traits and their Postgres implementations
//!
//! The traits are the seams the run state machine is driven and tested
//! through; the `Pg*` types are the production implementations, one per
//! bookkeeping concern (pipeline metadata, run audit trail, warehouse
//! staging).

mod audit;
mod metadata;
mod warehouse;

pub use audit::{AuditStore, PgAuditStore};
pub use metadata::{MetadataStore, PgMetadataStore};
pub use warehouse::{PgWarehouse, Warehouse};
