//! Intake ledger - inbound cost records
//!
//! An intake item is a vendor invoice or an official fee recorded against a
//! job. It owns the longest state machine in the engine:
//!
//! ```text
//! draft -> submitted -> pending_approval -> {approved | rejected | needs_info}
//! approved -> sent_to_accounting -> posted -> ready_to_bill -> billed
//! rejected -> archived            needs_info -> submitted (resubmission)
//! ```
//!
//! Corrections never mutate history: the ledger is append-only, and a
//! correction is a new compensating item.

pub mod ledger;
pub mod posting;

pub use ledger::{IntakeLedger, NewIntakeItem};
pub use posting::{PostingBridge, SapPosting};

use chrono::{DateTime, Utc};
use lexfin_compliance::{ComplianceStatus, UttaiStatus};
use lexfin_store::Entity;
use lexfin_types::{ActorId, IntakeItemId, JobId, Money, VendorId};
use serde::{Deserialize, Serialize};

/// What kind of cost an item records
///
/// The vendor reference exists exactly when the item is a vendor invoice;
/// official fees carry none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntakeKind {
    /// An invoice received from a vendor
    VendorInvoice {
        /// The issuing vendor
        vendor_id: VendorId,
    },
    /// An official/registry fee with no vendor
    OfficialFee,
}

impl IntakeKind {
    /// The vendor, when this is a vendor invoice
    #[inline]
    #[must_use]
    pub fn vendor_id(&self) -> Option<VendorId> {
        match self {
            Self::VendorInvoice { vendor_id } => Some(*vendor_id),
            Self::OfficialFee => None,
        }
    }

    /// Stable lowercase label
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VendorInvoice { .. } => "vendor_invoice",
            Self::OfficialFee => "official_fee",
        }
    }
}

/// Intake item lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntakeState {
    /// Being drafted; not yet in the ledger proper
    Draft,
    /// Submitted for review
    Submitted,
    /// Queued for an approver
    PendingApproval,
    /// Approved for accounting
    Approved,
    /// Rejected by an approver
    Rejected,
    /// Returned to the submitter for more information
    NeedsInfo,
    /// Handed to the external accounting system
    SentToAccounting,
    /// Acknowledged by the external accounting system
    Posted,
    /// Selected for billing on a client invoice
    ReadyToBill,
    /// Terminal: billed to the client
    Billed,
    /// Terminal: withdrawn after rejection
    Archived,
}

impl IntakeState {
    /// Stable lowercase label
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::NeedsInfo => "needs_info",
            Self::SentToAccounting => "sent_to_accounting",
            Self::Posted => "posted",
            Self::ReadyToBill => "ready_to_bill",
            Self::Billed => "billed",
            Self::Archived => "archived",
        }
    }

    /// States reachable from this one
    ///
    /// The `submitted`/`pending_approval -> archived` edges carry the
    /// second rejection of a resubmitted lineage; everything else is the
    /// plain forward machine.
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [IntakeState] {
        match self {
            Self::Draft => &[Self::Submitted],
            Self::Submitted => &[
                Self::PendingApproval,
                Self::Approved,
                Self::Rejected,
                Self::NeedsInfo,
                Self::Archived,
            ],
            Self::PendingApproval => &[
                Self::Approved,
                Self::Rejected,
                Self::NeedsInfo,
                Self::Archived,
            ],
            Self::Approved => &[Self::SentToAccounting],
            Self::SentToAccounting => &[Self::Posted],
            Self::Posted => &[Self::ReadyToBill],
            Self::ReadyToBill => &[Self::Billed],
            Self::Rejected => &[Self::Archived],
            Self::NeedsInfo => &[Self::Submitted],
            Self::Billed | Self::Archived => &[],
        }
    }

    /// Whether the machine defines an edge to `to`
    #[must_use]
    pub fn can_transition(self, to: IntakeState) -> bool {
        self.allowed_transitions().contains(&to)
    }

    /// Whether no further transition exists
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

impl std::fmt::Display for IntakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound cost record
///
/// The two compliance snapshots are evidence of what was known when the item
/// entered the ledger; they are captured at submission and never change
/// afterwards, independent of later compliance changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeItem {
    /// Identifier
    pub id: IntakeItemId,
    /// Owning job
    pub job_id: JobId,
    /// Cost kind (vendor reference iff vendor invoice)
    pub kind: IntakeKind,
    /// Vendor's invoice number (or fee reference), without revision suffix
    pub invoice_number: String,
    /// Strictly-positive, currency-tagged amount
    pub amount: Money,
    /// Free-text concept
    pub concept: String,
    /// Lifecycle state
    pub status: IntakeState,
    /// Resubmission count for this lineage
    pub revision: u32,
    /// Job clearance captured at submission
    pub uttai_status_snapshot: Option<UttaiStatus>,
    /// Vendor compliance captured at submission (vendor invoices only)
    pub vendor_compliance_snapshot: Option<ComplianceStatus>,
    /// Creator
    pub created_by: ActorId,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Submitter (populated by submission)
    pub submitted_by: Option<ActorId>,
    /// Submission time
    pub submitted_at: Option<DateTime<Utc>>,
    /// Approver (populated by approval)
    pub approved_by: Option<ActorId>,
    /// Approval time
    pub approved_at: Option<DateTime<Utc>>,
    /// Rejecter (populated by rejection)
    pub rejected_by: Option<ActorId>,
    /// Rejection time
    pub rejected_at: Option<DateTime<Utc>>,
    /// Rejection reason
    pub rejection_reason: Option<String>,
    /// Reviewer note attached when more information was requested
    pub review_note: Option<String>,
}

impl IntakeItem {
    /// Invoice number with the audit-trail revision suffix (`-R1`, `-R2`, ...)
    #[must_use]
    pub fn display_invoice_number(&self) -> String {
        if self.revision == 0 {
            self.invoice_number.clone()
        } else {
            format!("{}-R{}", self.invoice_number, self.revision)
        }
    }
}

impl Entity for IntakeItem {
    type Id = IntakeItemId;
    const KIND: &'static str = "intake_item";

    fn id(&self) -> IntakeItemId {
        self.id
    }

    fn status_label(&self) -> &'static str {
        self.status.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_machine_has_no_shortcuts() {
        assert!(IntakeState::Draft.can_transition(IntakeState::Submitted));
        assert!(!IntakeState::Draft.can_transition(IntakeState::Approved));
        assert!(!IntakeState::Approved.can_transition(IntakeState::Posted));
        assert!(!IntakeState::Posted.can_transition(IntakeState::Billed));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        assert!(IntakeState::Billed.is_terminal());
        assert!(IntakeState::Archived.is_terminal());
        assert!(!IntakeState::Rejected.is_terminal());
    }

    #[test]
    fn resubmission_loops_through_submitted() {
        assert!(IntakeState::NeedsInfo.can_transition(IntakeState::Submitted));
        assert!(!IntakeState::NeedsInfo.can_transition(IntakeState::Approved));
    }

    #[test]
    fn revision_suffix_convention() {
        let kind = IntakeKind::OfficialFee;
        let mut item = IntakeItem {
            id: IntakeItemId::new(),
            job_id: JobId::new(),
            kind,
            invoice_number: "FEE-77".into(),
            amount: Money::new(rust_decimal::Decimal::new(100, 0), lexfin_types::Currency::Eur)
                .unwrap(),
            concept: "registry fee".into(),
            status: IntakeState::Draft,
            revision: 0,
            uttai_status_snapshot: None,
            vendor_compliance_snapshot: None,
            created_by: ActorId::new(),
            created_at: Utc::now(),
            submitted_by: None,
            submitted_at: None,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            review_note: None,
        };
        assert_eq!(item.display_invoice_number(), "FEE-77");
        item.revision = 2;
        assert_eq!(item.display_invoice_number(), "FEE-77-R2");
    }
}
