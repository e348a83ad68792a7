//! Lexfin lifecycle engine
//!
//! The financial document lifecycle engine: the directed graph of states an
//! invoice-related record moves through, from raw intake to collection
//! claims. Every transition is gated by role, by prerequisite data, and
//! (for collection claims) by a separation-of-duties rule enforced at the
//! data layer.
//!
//! # Components
//! - [`intake`]: the intake ledger and the posting bridge
//! - [`billing`]: billing batch assembly and decisions
//! - [`invoice`]: the client invoice lifecycle
//! - [`dispatch`]: deliveries and AP platform tasks
//! - [`claims`]: the collection claim workflow
//!
//! # Example
//!
//! ```rust
//! use lexfin_engine::Engine;
//! use lexfin_types::EnginePolicy;
//!
//! let engine = Engine::new(EnginePolicy::default());
//! assert!(engine.audit().is_empty());
//! ```

pub mod billing;
pub mod claims;
pub mod dispatch;
pub mod intake;
pub mod invoice;
mod shared;

pub use billing::{
    BatchAssembler, BatchState, BillingBatch, BillingBatchItem, Decision, NewBatch,
};
pub use claims::{ClaimState, ClaimWorkflow, CollectionClaim};
pub use dispatch::{
    Delivery, DeliveryKind, DeliveryStatus, Dispatcher, PlatformTask, PlatformTaskStatus,
};
pub use intake::{
    IntakeItem, IntakeKind, IntakeLedger, IntakeState, NewIntakeItem, PostingBridge, SapPosting,
};
pub use invoice::{ClientInvoice, InvoiceLifecycle, InvoiceOrigin, InvoiceState};

use lexfin_store::{AuditLog, AuditRecord};
use lexfin_types::EnginePolicy;
use shared::Shared;
use std::sync::Arc;

/// The lifecycle engine facade
///
/// Owns the shared store set, the audit log, and the policy; every
/// component service borrows them. Services are cheap handles and may be
/// cloned across request handlers.
#[derive(Debug)]
pub struct Engine {
    shared: Arc<Shared>,
    intake: IntakeLedger,
    posting: PostingBridge,
    billing: BatchAssembler,
    invoicing: InvoiceLifecycle,
    dispatch: Dispatcher,
    claims: ClaimWorkflow,
}

impl Engine {
    /// Create an engine with its own audit log
    #[must_use]
    pub fn new(policy: EnginePolicy) -> Self {
        Self::with_audit(policy, Arc::new(AuditLog::new()))
    }

    /// Create an engine writing to a shared audit log
    ///
    /// Sharing the log with the compliance registry keeps one replayable
    /// history across both.
    #[must_use]
    pub fn with_audit(policy: EnginePolicy, audit: Arc<AuditLog>) -> Self {
        let shared = Arc::new(Shared::new(policy, audit));
        let intake = IntakeLedger::new(Arc::clone(&shared));
        let posting = PostingBridge::new(Arc::clone(&shared), intake.clone());
        let billing = BatchAssembler::new(Arc::clone(&shared));
        let invoicing = InvoiceLifecycle::new(Arc::clone(&shared), intake.clone());
        let dispatch = Dispatcher::new(Arc::clone(&shared));
        let claims = ClaimWorkflow::new(Arc::clone(&shared));
        Self {
            shared,
            intake,
            posting,
            billing,
            invoicing,
            dispatch,
            claims,
        }
    }

    /// The intake ledger
    #[inline]
    #[must_use]
    pub fn intake(&self) -> &IntakeLedger {
        &self.intake
    }

    /// The posting bridge
    #[inline]
    #[must_use]
    pub fn posting(&self) -> &PostingBridge {
        &self.posting
    }

    /// The billing batch assembler
    #[inline]
    #[must_use]
    pub fn billing(&self) -> &BatchAssembler {
        &self.billing
    }

    /// The client invoice lifecycle
    #[inline]
    #[must_use]
    pub fn invoicing(&self) -> &InvoiceLifecycle {
        &self.invoicing
    }

    /// The delivery & platform dispatcher
    #[inline]
    #[must_use]
    pub fn dispatch(&self) -> &Dispatcher {
        &self.dispatch
    }

    /// The collection claim workflow
    #[inline]
    #[must_use]
    pub fn claims(&self) -> &ClaimWorkflow {
        &self.claims
    }

    /// The audit log
    #[inline]
    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.shared.audit
    }

    /// Transition history for one entity (actor + timestamp per transition)
    #[must_use]
    pub fn history_for(&self, entity_kind: &str, entity_id: &str) -> Vec<AuditRecord> {
        self.shared.audit.history_for(entity_kind, entity_id)
    }
}

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the Lexfin engine
    pub use crate::{
        BatchState, ClaimState, Decision, DeliveryKind, Engine, IntakeKind, IntakeState,
        InvoiceOrigin, InvoiceState, NewBatch, NewIntakeItem, PlatformTaskStatus,
    };
    pub use lexfin_types::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
