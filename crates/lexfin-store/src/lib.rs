//! Lexfin shared store
//!
//! The durable-store abstraction behind every lifecycle component:
//! - [`EntityStore`]: a concurrent row-per-record table whose mutations run
//!   as closures under the entry lock (single atomic read-check-write)
//! - [`AuditLog`]: the append-only, hash-chained transition history
//!
//! No component writes an entity's status outside a store mutation, and
//! every successful mutation appends exactly one audit record.

pub mod audit;
pub mod entity;
pub mod store;

pub use audit::{AuditIntegrityError, AuditLog, AuditRecord};
pub use entity::Entity;
pub use store::EntityStore;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
