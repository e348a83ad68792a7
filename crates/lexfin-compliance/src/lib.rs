//! Lexfin compliance registry
//!
//! Tracks per-vendor document compliance and per-job UTTAI clearance, and
//! produces the point-in-time snapshots consumed by intake:
//! - Vendor statuses are derived from document expiry dates, never set by hand
//! - Job clearance changes only through the UTTAI request flow
//! - The engine reads clearance through [`ComplianceView`], supplied as
//!   per-request context

pub mod job;
pub mod registry;
pub mod uttai;
pub mod vendor;

pub use job::{Job, UttaiStatus};
pub use registry::{
    ComplianceRegistry, ComplianceSnapshot, ComplianceView, JobCompliance, NewJob, NewVendor,
};
pub use uttai::{UttaiOutcome, UttaiRequest, UttaiRequestStatus};
pub use vendor::{derive_status, ComplianceStatus, DocumentKind, Vendor, VendorDocument};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
