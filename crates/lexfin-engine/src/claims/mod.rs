//! Collection claims
//!
//! A claim requests a payment reminder or escalation for an overdue client
//! invoice. The separation-of-duties guard (`approved_by != created_by`) is
//! a data-integrity invariant, not a UX nicety: the claim's fields are
//! private and every mutation goes through methods that enforce it, so any
//! write path - the workflow service or anything else holding the store -
//! is equally blocked.

pub mod workflow;

pub use workflow::ClaimWorkflow;

use chrono::{DateTime, Utc};
use lexfin_store::Entity;
use lexfin_types::{ActorId, ClaimId, EngineError, EngineResult, InvoiceId};
use serde::{Deserialize, Serialize};

/// Claim lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimState {
    /// Awaiting independent approval
    PendingApproval,
    /// Approved; may be sent
    Approved,
    /// Terminal: refused
    Rejected,
    /// Terminal: sent to the recipients
    Sent,
}

impl ClaimState {
    /// Stable lowercase label
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Sent => "sent",
        }
    }

    /// States reachable from this one
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [ClaimState] {
        match self {
            Self::PendingApproval => &[Self::Approved, Self::Rejected],
            Self::Approved => &[Self::Sent],
            Self::Rejected | Self::Sent => &[],
        }
    }

    /// Whether the machine defines an edge to `to`
    #[must_use]
    pub fn can_transition(self, to: ClaimState) -> bool {
        self.allowed_transitions().contains(&to)
    }
}

impl std::fmt::Display for ClaimState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to follow up on collection of an overdue invoice
///
/// # Invariants
/// - `approved_by` is never the creator (enforced by [`CollectionClaim::approve`])
/// - `approved`/`sent` states always carry their required identity and
///   timestamp fields: the mutation stamping them is the same one that
///   moves the state, so no persisted intermediate lacks them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionClaim {
    id: ClaimId,
    invoice_id: InvoiceId,
    reason: String,
    status: ClaimState,
    created_by: ActorId,
    created_at: DateTime<Utc>,
    approved_by: Option<ActorId>,
    approved_at: Option<DateTime<Utc>>,
    rejected_by: Option<ActorId>,
    rejected_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    sent_by: Option<ActorId>,
    sent_at: Option<DateTime<Utc>>,
    recipients: Vec<String>,
}

impl CollectionClaim {
    /// Create a pending claim
    ///
    /// Approver and sender identities are empty by construction.
    pub(crate) fn new(
        invoice_id: InvoiceId,
        reason: String,
        created_by: ActorId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ClaimId::new(),
            invoice_id,
            reason,
            status: ClaimState::PendingApproval,
            created_by,
            created_at,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            sent_by: None,
            sent_at: None,
            recipients: Vec::new(),
        }
    }

    /// Approve the claim
    ///
    /// The separation-of-duties guard lives here, in the only code that can
    /// write the field.
    ///
    /// # Errors
    /// `SeparationOfDuties` when the approver created the claim;
    /// `InvalidTransition` unless pending approval.
    pub(crate) fn approve(&mut self, approver: ActorId, at: DateTime<Utc>) -> EngineResult<()> {
        if approver == self.created_by {
            return Err(EngineError::SeparationOfDuties {
                actor: approver,
                action: "approve",
            });
        }
        self.ensure_edge(ClaimState::Approved)?;
        self.status = ClaimState::Approved;
        self.approved_by = Some(approver);
        self.approved_at = Some(at);
        Ok(())
    }

    /// Reject the claim
    ///
    /// Same guard as approval; the reason is required.
    ///
    /// # Errors
    /// `SeparationOfDuties`, `Validation` (empty reason),
    /// `InvalidTransition`.
    pub(crate) fn reject(
        &mut self,
        rejecter: ActorId,
        reason: String,
        at: DateTime<Utc>,
    ) -> EngineResult<()> {
        if rejecter == self.created_by {
            return Err(EngineError::SeparationOfDuties {
                actor: rejecter,
                action: "reject",
            });
        }
        if reason.trim().is_empty() {
            return Err(EngineError::validation("rejection reason must not be empty"));
        }
        self.ensure_edge(ClaimState::Rejected)?;
        self.status = ClaimState::Rejected;
        self.rejected_by = Some(rejecter);
        self.rejected_at = Some(at);
        self.rejection_reason = Some(reason);
        Ok(())
    }

    /// Send the approved claim
    ///
    /// The sender may be the creator; only approval is separation-gated.
    ///
    /// # Errors
    /// `Validation` (empty recipients), `InvalidTransition` unless approved.
    pub(crate) fn send(
        &mut self,
        sender: ActorId,
        recipients: Vec<String>,
        at: DateTime<Utc>,
    ) -> EngineResult<()> {
        if recipients.is_empty() || recipients.iter().any(|r| r.trim().is_empty()) {
            return Err(EngineError::validation(
                "sending a claim needs at least one non-empty recipient",
            ));
        }
        self.ensure_edge(ClaimState::Sent)?;
        self.status = ClaimState::Sent;
        self.sent_by = Some(sender);
        self.sent_at = Some(at);
        self.recipients = recipients;
        Ok(())
    }

    fn ensure_edge(&self, to: ClaimState) -> EngineResult<()> {
        if self.status.can_transition(to) {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                entity: Self::KIND,
                id: self.id.to_string(),
                from: self.status.to_string(),
                requested: to.to_string(),
            })
        }
    }

    // ---- read accessors ----

    /// Identifier
    #[inline]
    #[must_use]
    pub fn id(&self) -> ClaimId {
        self.id
    }

    /// The overdue invoice
    #[inline]
    #[must_use]
    pub fn invoice_id(&self) -> InvoiceId {
        self.invoice_id
    }

    /// Why collection is requested
    #[inline]
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Lifecycle state
    #[inline]
    #[must_use]
    pub fn status(&self) -> ClaimState {
        self.status
    }

    /// Creator
    #[inline]
    #[must_use]
    pub fn created_by(&self) -> ActorId {
        self.created_by
    }

    /// Creation time
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Approver (populated only by approval)
    #[inline]
    #[must_use]
    pub fn approved_by(&self) -> Option<ActorId> {
        self.approved_by
    }

    /// Approval time
    #[inline]
    #[must_use]
    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    /// Rejecter (populated only by rejection)
    #[inline]
    #[must_use]
    pub fn rejected_by(&self) -> Option<ActorId> {
        self.rejected_by
    }

    /// Rejection reason
    #[inline]
    #[must_use]
    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    /// Sender (populated only by sending)
    #[inline]
    #[must_use]
    pub fn sent_by(&self) -> Option<ActorId> {
        self.sent_by
    }

    /// Send time
    #[inline]
    #[must_use]
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    /// Recipients (populated only by sending)
    #[inline]
    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }
}

impl Entity for CollectionClaim {
    type Id = ClaimId;
    const KIND: &'static str = "collection_claim";

    fn id(&self) -> ClaimId {
        self.id
    }

    fn status_label(&self) -> &'static str {
        self.status.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(creator: ActorId) -> CollectionClaim {
        CollectionClaim::new(InvoiceId::new(), "60 days overdue".into(), creator, Utc::now())
    }

    #[test]
    fn creation_leaves_identity_fields_empty() {
        let c = claim(ActorId::new());
        assert_eq!(c.status(), ClaimState::PendingApproval);
        assert!(c.approved_by().is_none());
        assert!(c.sent_by().is_none());
        assert!(c.recipients().is_empty());
    }

    #[test]
    fn creator_cannot_approve_own_claim() {
        let creator = ActorId::new();
        let mut c = claim(creator);
        let err = c.approve(creator, Utc::now()).unwrap_err();
        assert!(matches!(err, EngineError::SeparationOfDuties { .. }));
        // The failed write left nothing behind
        assert_eq!(c.status(), ClaimState::PendingApproval);
        assert!(c.approved_by().is_none());
    }

    #[test]
    fn a_different_actor_approves() {
        let mut c = claim(ActorId::new());
        let approver = ActorId::new();
        c.approve(approver, Utc::now()).unwrap();
        assert_eq!(c.status(), ClaimState::Approved);
        assert_eq!(c.approved_by(), Some(approver));
        assert!(c.approved_at().is_some());
    }

    #[test]
    fn the_sender_may_be_the_creator() {
        let creator = ActorId::new();
        let mut c = claim(creator);
        c.approve(ActorId::new(), Utc::now()).unwrap();
        c.send(creator, vec!["billing@client.example".into()], Utc::now())
            .unwrap();
        assert_eq!(c.status(), ClaimState::Sent);
        assert_eq!(c.sent_by(), Some(creator));
    }

    #[test]
    fn sending_requires_recipients() {
        let mut c = claim(ActorId::new());
        c.approve(ActorId::new(), Utc::now()).unwrap();
        let err = c.send(ActorId::new(), vec![], Utc::now()).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(c.status(), ClaimState::Approved);
    }

    #[test]
    fn no_sending_before_approval() {
        let mut c = claim(ActorId::new());
        let err = c
            .send(ActorId::new(), vec!["a@b.example".into()], Utc::now())
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }
}
