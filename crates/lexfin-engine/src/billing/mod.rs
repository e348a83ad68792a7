//! Billing batches - job-scoped groupings of posted items
//!
//! A batch freezes its totals at creation time and records a per-item
//! emit/transfer/discard decision. The platform branch sits between
//! `ready_for_sap` and `issued` for batches that route through a
//! third-party AP platform.

pub mod assembler;

pub use assembler::{BatchAssembler, NewBatch};

use chrono::{DateTime, Utc};
use lexfin_store::Entity;
use lexfin_types::{ActorId, BatchId, BatchItemId, Currency, IntakeItemId, InvoiceId, JobId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Batch lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchState {
    /// Open for decisions, awaiting partner approval
    PendingPartnerApproval,
    /// Approved; an invoice may be derived
    ReadyForSap,
    /// Waiting on third-party AP platform confirmation
    PlatformRequired,
    /// Platform confirmation recorded
    PlatformCompleted,
    /// The derived invoice was issued
    Issued,
    /// Terminal: the derived invoice was delivered
    Delivered,
}

impl BatchState {
    /// Stable lowercase label
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingPartnerApproval => "pending_partner_approval",
            Self::ReadyForSap => "ready_for_sap",
            Self::PlatformRequired => "platform_required",
            Self::PlatformCompleted => "platform_completed",
            Self::Issued => "issued",
            Self::Delivered => "delivered",
        }
    }

    /// States reachable from this one
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [BatchState] {
        match self {
            Self::PendingPartnerApproval => &[Self::ReadyForSap],
            Self::ReadyForSap => &[Self::Issued, Self::PlatformRequired],
            Self::PlatformRequired => &[Self::PlatformCompleted],
            Self::PlatformCompleted => &[Self::Issued],
            Self::Issued => &[Self::Delivered],
            Self::Delivered => &[],
        }
    }

    /// Whether the machine defines an edge to `to`
    #[must_use]
    pub fn can_transition(self, to: BatchState) -> bool {
        self.allowed_transitions().contains(&to)
    }
}

impl std::fmt::Display for BatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-item decision inside a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// Invoice the item in this batch
    Emit,
    /// Remove from this batch; eligible for a future batch of the same job
    Transfer,
    /// Exclude permanently from this batch's billing
    Discard,
}

impl Decision {
    /// Stable lowercase label
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Emit => "emit",
            Self::Transfer => "transfer",
            Self::Discard => "discard",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job-scoped grouping of posted items destined for one client invoice
///
/// # Invariants
/// - Totals are a frozen snapshot computed at creation; they never change
///   afterwards even though the ledger is append-only anyway
/// - Every member item was `posted` at creation time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingBatch {
    /// Identifier
    pub id: BatchId,
    /// Owning job
    pub job_id: JobId,
    /// Lifecycle state
    pub status: BatchState,
    /// Currency shared by all member items
    pub currency: Currency,
    /// Frozen sum of all member amounts
    pub total_amount: Decimal,
    /// Frozen sum of official-fee member amounts
    pub total_fees: Decimal,
    /// Whether delivery routes through a third-party AP platform
    pub via_platform: bool,
    /// The invoice derived from this batch, once created
    pub invoice_id: Option<InvoiceId>,
    /// Creator
    pub created_by: ActorId,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Approver of the partner gate (populated by `advance`)
    pub approved_by: Option<ActorId>,
    /// Approval time
    pub approved_at: Option<DateTime<Utc>>,
}

impl Entity for BillingBatch {
    type Id = BatchId;
    const KIND: &'static str = "billing_batch";

    fn id(&self) -> BatchId {
        self.id
    }

    fn status_label(&self) -> &'static str {
        self.status.as_str()
    }
}

/// One (batch, item) pairing with its decision
///
/// The decision stays `None` only while the batch is still open for
/// decisions; it is frozen once the derived invoice is issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingBatchItem {
    /// Identifier
    pub id: BatchItemId,
    /// Owning batch
    pub batch_id: BatchId,
    /// The member intake item
    pub item_id: IntakeItemId,
    /// Emit/transfer/discard decision
    pub decision: Option<Decision>,
    /// Decider (populated with the decision)
    pub decided_by: Option<ActorId>,
    /// Decision time
    pub decided_at: Option<DateTime<Utc>>,
}

impl BillingBatchItem {
    /// Whether this pairing still counts as batch membership
    ///
    /// Transferred pairings leave the batch; discarded ones stay as a
    /// terminal exclusion record.
    #[must_use]
    pub fn is_active_member(&self) -> bool {
        self.decision != Some(Decision::Transfer)
    }
}

impl Entity for BillingBatchItem {
    type Id = BatchItemId;
    const KIND: &'static str = "billing_batch_item";

    fn id(&self) -> BatchItemId {
        self.id
    }

    fn status_label(&self) -> &'static str {
        match self.decision {
            None => "undecided",
            Some(d) => d.as_str(),
        }
    }
}
