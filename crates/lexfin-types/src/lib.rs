//! Lexfin foundation types
//!
//! Shared building blocks for the financial document lifecycle engine:
//! - Typed entity identifiers (ULID newtypes)
//! - Currency-tagged money with pure base-currency conversion
//! - Actor/role model (per-request trusted context)
//! - Engine policy configuration
//! - The cross-component error taxonomy

pub mod actor;
pub mod error;
pub mod ids;
pub mod money;
pub mod policy;

pub use actor::{Actor, Role};
pub use error::{EngineError, EngineResult};
pub use ids::{
    ActorId, BatchId, BatchItemId, ClaimId, DeliveryId, DocumentId, IntakeItemId, InvoiceId,
    JobId, PlatformTaskId, PostingId, UttaiRequestId, VendorId,
};
pub use money::{Currency, Money, RateTable};
pub use policy::{EnginePolicy, FourEyesRule};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Lexfin types
    pub use crate::{
        Actor, ActorId, Currency, EngineError, EnginePolicy, EngineResult, FourEyesRule, Money,
        Role,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
