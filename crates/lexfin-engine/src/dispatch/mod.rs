//! Delivery & platform dispatch
//!
//! Records how an issued invoice reached the client: direct email delivery,
//! or a third-party AP platform task with an SLA. SLA breach is a derived
//! read, recomputed against the caller's clock on every evaluation - it is
//! never persisted, so it cannot go stale.

pub mod dispatcher;

pub use dispatcher::Dispatcher;

use chrono::{DateTime, Utc};
use lexfin_store::Entity;
use lexfin_types::{ActorId, DeliveryId, InvoiceId, PlatformTaskId};
use serde::{Deserialize, Serialize};

/// How a delivery goes out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryKind {
    /// Direct email to the client's recipients
    Email,
    /// Hand-off through a third-party AP platform
    Platform,
}

impl DeliveryKind {
    /// Stable lowercase label
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Platform => "platform",
        }
    }
}

/// Delivery lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    /// Prepared, not yet sent
    Pending,
    /// Sent to the recipients
    Sent,
}

impl DeliveryStatus {
    /// Stable lowercase label
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
        }
    }
}

/// One outbound delivery of an issued invoice
///
/// A re-send is a new record, never a mutation of a sent one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    /// Identifier
    pub id: DeliveryId,
    /// The delivered invoice
    pub invoice_id: InvoiceId,
    /// Email or platform
    pub kind: DeliveryKind,
    /// Recipient email addresses
    pub recipients: Vec<String>,
    /// Lifecycle state
    pub status: DeliveryStatus,
    /// Creator
    pub created_by: ActorId,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Sender (populated by sending)
    pub sent_by: Option<ActorId>,
    /// Send time
    pub sent_at: Option<DateTime<Utc>>,
}

impl Entity for Delivery {
    type Id = DeliveryId;
    const KIND: &'static str = "delivery";

    fn id(&self) -> DeliveryId {
        self.id
    }

    fn status_label(&self) -> &'static str {
        self.status.as_str()
    }
}

/// Platform task lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlatformTaskStatus {
    /// Created, not yet started
    Pending,
    /// Being worked on the platform
    InProgress,
    /// Terminal: confirmed on the platform
    Completed,
    /// Halted; the notes explain the blocker
    Blocked,
}

impl PlatformTaskStatus {
    /// Stable lowercase label
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
        }
    }

    /// States reachable from this one
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [PlatformTaskStatus] {
        match self {
            Self::Pending => &[Self::InProgress, Self::Blocked],
            Self::InProgress => &[Self::Completed, Self::Blocked],
            Self::Blocked => &[Self::InProgress],
            Self::Completed => &[],
        }
    }

    /// Whether the machine defines an edge to `to`
    #[must_use]
    pub fn can_transition(self, to: PlatformTaskStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }
}

impl std::fmt::Display for PlatformTaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One hand-off of an invoice to a third-party AP platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformTask {
    /// Identifier
    pub id: PlatformTaskId,
    /// The invoice being confirmed
    pub invoice_id: InvoiceId,
    /// Platform display name
    pub platform_name: String,
    /// Platform code
    pub platform_code: String,
    /// Lifecycle state
    pub status: PlatformTaskStatus,
    /// Advisory completion deadline
    pub sla_due_at: DateTime<Utc>,
    /// Completion time (populated by completion)
    pub completed_at: Option<DateTime<Utc>>,
    /// Opaque file-store reference to completion evidence
    pub evidence_reference: Option<String>,
    /// Operator notes (required to block; may substitute for evidence)
    pub notes: Option<String>,
    /// Creator
    pub created_by: ActorId,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl PlatformTask {
    /// Whether the platform confirmed this task
    #[inline]
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == PlatformTaskStatus::Completed
    }

    /// Whether the SLA is breached at `now`
    ///
    /// Derived on every read against the caller's clock; never stored.
    #[must_use]
    pub fn is_sla_breached(&self, now: DateTime<Utc>) -> bool {
        !self.is_completed() && now > self.sla_due_at
    }
}

impl Entity for PlatformTask {
    type Id = PlatformTaskId;
    const KIND: &'static str = "platform_task";

    fn id(&self) -> PlatformTaskId {
        self.id
    }

    fn status_label(&self) -> &'static str {
        self.status.as_str()
    }
}
