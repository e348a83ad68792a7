//! Client invoices
//!
//! An invoice is derived from a ready batch or stands alone for
//! platform-only/manual flows. The two origins are a tagged variant, not an
//! inference from nullable columns, so both are exhaustively testable.

pub mod lifecycle;

pub use lifecycle::InvoiceLifecycle;

use chrono::{DateTime, NaiveDate, Utc};
use lexfin_store::Entity;
use lexfin_types::{ActorId, BatchId, InvoiceId, JobId};
use serde::{Deserialize, Serialize};

/// Invoice lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvoiceState {
    /// Drafted, not yet under approval
    Draft,
    /// Awaiting partner approval
    PendingPartnerApproval,
    /// Approved; may be issued
    ReadyForSap,
    /// Issued with external identifiers
    Issued,
    /// Waiting on third-party AP platform confirmation
    PlatformRequired,
    /// Terminal: closed through platform confirmation
    PlatformCompleted,
    /// Terminal: delivered to the client
    Delivered,
}

impl InvoiceState {
    /// Stable lowercase label
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "invoice_draft",
            Self::PendingPartnerApproval => "pending_partner_approval",
            Self::ReadyForSap => "ready_for_sap",
            Self::Issued => "issued",
            Self::PlatformRequired => "platform_required",
            Self::PlatformCompleted => "platform_completed",
            Self::Delivered => "delivered",
        }
    }

    /// States reachable from this one
    ///
    /// Rejection returns an invoice to draft; the platform branch follows
    /// issuing for invoices that close through a platform confirmation.
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [InvoiceState] {
        match self {
            Self::Draft => &[Self::PendingPartnerApproval],
            Self::PendingPartnerApproval => &[Self::ReadyForSap, Self::Draft],
            Self::ReadyForSap => &[Self::Issued],
            Self::Issued => &[Self::Delivered, Self::PlatformRequired],
            Self::PlatformRequired => &[Self::PlatformCompleted],
            Self::PlatformCompleted | Self::Delivered => &[],
        }
    }

    /// Whether the machine defines an edge to `to`
    #[must_use]
    pub fn can_transition(self, to: InvoiceState) -> bool {
        self.allowed_transitions().contains(&to)
    }
}

impl std::fmt::Display for InvoiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an invoice came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceOrigin {
    /// Derived from a billing batch
    FromBatch(BatchId),
    /// Created standalone (platform-only/manual flows)
    Manual,
}

impl InvoiceOrigin {
    /// The source batch, when derived from one
    #[inline]
    #[must_use]
    pub fn batch_id(&self) -> Option<BatchId> {
        match self {
            Self::FromBatch(id) => Some(*id),
            Self::Manual => None,
        }
    }
}

/// An invoice issued (or to be issued) to the client
///
/// External identifiers stay empty until `issue` assigns them exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInvoice {
    /// Identifier
    pub id: InvoiceId,
    /// Owning job
    pub job_id: JobId,
    /// Batch-derived or manual
    pub origin: InvoiceOrigin,
    /// Lifecycle state
    pub status: InvoiceState,
    /// External invoice number (assigned by `issue`)
    pub sap_invoice_number: Option<String>,
    /// External invoice date (assigned by `issue`)
    pub sap_invoice_date: Option<NaiveDate>,
    /// Creator
    pub created_by: ActorId,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Approver (populated by approval)
    pub approved_by: Option<ActorId>,
    /// Approval time
    pub approved_at: Option<DateTime<Utc>>,
    /// Reason recorded when approval was refused
    pub rejection_reason: Option<String>,
    /// Issuer (populated by `issue`)
    pub issued_by: Option<ActorId>,
    /// Issue time
    pub issued_at: Option<DateTime<Utc>>,
}

impl Entity for ClientInvoice {
    type Id = InvoiceId;
    const KIND: &'static str = "client_invoice";

    fn id(&self) -> InvoiceId {
        self.id
    }

    fn status_label(&self) -> &'static str {
        self.status.as_str()
    }
}
