//! Collection claim workflow
//!
//! Three states, two roles: any billing operator creates and sends, an
//! approver distinct from the creator approves or rejects. Each transition
//! is one atomic check-and-write through the claim's own guarded methods.

use crate::claims::{ClaimState, CollectionClaim};
use crate::shared::Shared;
use chrono::Utc;
use lexfin_store::Entity;
use lexfin_types::{Actor, ClaimId, EngineError, EngineResult, InvoiceId};
use std::sync::Arc;
use tracing::info;

/// The collection claim workflow service
#[derive(Debug, Clone)]
pub struct ClaimWorkflow {
    shared: Arc<Shared>,
}

impl ClaimWorkflow {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Create a claim for an invoice
    ///
    /// # Errors
    /// `PermissionDenied` for non-operators; `NotFound` for an unknown
    /// invoice; `Validation` for an empty reason.
    pub fn create(
        &self,
        actor: Actor,
        invoice_id: InvoiceId,
        reason: impl Into<String>,
    ) -> EngineResult<CollectionClaim> {
        if !actor.role.is_operator() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "create collection claim",
            });
        }
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(EngineError::validation("claim reason must not be empty"));
        }
        let _ = self.shared.invoices.try_get(invoice_id)?;
        let now = Utc::now();
        let claim = CollectionClaim::new(invoice_id, reason, actor.id, now);
        if self.shared.claims.insert_new(claim.clone()).is_err() {
            return Err(EngineError::validation("claim id collision"));
        }
        self.shared
            .audit
            .record(CollectionClaim::KIND, claim.id(), "-", claim.status_label(), actor.id, now);
        info!(
            target: "lexfin::claims",
            claim = %claim.id(),
            invoice = %invoice_id,
            "collection claim created"
        );
        Ok(claim)
    }

    /// Approve a claim
    ///
    /// The approver must differ from the creator; the guard is enforced
    /// inside the claim's own mutation, in the same atomic write that stamps
    /// the approver identity and timestamp.
    ///
    /// # Errors
    /// `PermissionDenied`, `SeparationOfDuties`, `InvalidTransition`,
    /// `StaleState`.
    pub fn approve(&self, actor: Actor, id: ClaimId) -> EngineResult<CollectionClaim> {
        if !actor.role.can_approve() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "approve collection claim",
            });
        }
        let observed = self.shared.claims.try_get(id)?;
        let approved = self.shared.claims.update_with(id, |claim| {
            if claim.status() != observed.status() {
                return Err(stale(id, observed.status(), claim.status()));
            }
            let now = Utc::now();
            claim.approve(actor.id, now)?;
            self.shared.audit.record(
                CollectionClaim::KIND,
                id,
                observed.status().as_str(),
                claim.status().as_str(),
                actor.id,
                now,
            );
            Ok(claim.clone())
        })?;
        info!(target: "lexfin::claims", claim = %id, approver = %actor.id, "collection claim approved");
        Ok(approved)
    }

    /// Reject a claim
    ///
    /// Same separation guard as approval; the reason is required before
    /// anything is persisted.
    ///
    /// # Errors
    /// `PermissionDenied`, `SeparationOfDuties`, `Validation`,
    /// `InvalidTransition`, `StaleState`.
    pub fn reject(
        &self,
        actor: Actor,
        id: ClaimId,
        reason: impl Into<String>,
    ) -> EngineResult<CollectionClaim> {
        if !actor.role.can_approve() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "reject collection claim",
            });
        }
        let reason = reason.into();
        let observed = self.shared.claims.try_get(id)?;
        self.shared.claims.update_with(id, |claim| {
            if claim.status() != observed.status() {
                return Err(stale(id, observed.status(), claim.status()));
            }
            let now = Utc::now();
            claim.reject(actor.id, reason.clone(), now)?;
            self.shared.audit.record(
                CollectionClaim::KIND,
                id,
                observed.status().as_str(),
                claim.status().as_str(),
                actor.id,
                now,
            );
            Ok(claim.clone())
        })
    }

    /// Send an approved claim
    ///
    /// The sender may be the creator; the recipient list must be non-empty.
    ///
    /// # Errors
    /// `PermissionDenied`, `Validation`, `InvalidTransition`, `StaleState`.
    pub fn send(
        &self,
        actor: Actor,
        id: ClaimId,
        recipients: Vec<String>,
    ) -> EngineResult<CollectionClaim> {
        if !actor.role.is_operator() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "send collection claim",
            });
        }
        let observed = self.shared.claims.try_get(id)?;
        let sent = self.shared.claims.update_with(id, |claim| {
            if claim.status() != observed.status() {
                return Err(stale(id, observed.status(), claim.status()));
            }
            let now = Utc::now();
            claim.send(actor.id, recipients.clone(), now)?;
            self.shared.audit.record(
                CollectionClaim::KIND,
                id,
                observed.status().as_str(),
                claim.status().as_str(),
                actor.id,
                now,
            );
            Ok(claim.clone())
        })?;
        info!(target: "lexfin::claims", claim = %id, "collection claim sent");
        Ok(sent)
    }

    /// Read a claim
    ///
    /// # Errors
    /// `NotFound` for an unknown id.
    pub fn claim(&self, id: ClaimId) -> EngineResult<CollectionClaim> {
        self.shared.claims.try_get(id)
    }

    /// All claims raised against an invoice
    #[must_use]
    pub fn claims_for(&self, invoice_id: InvoiceId) -> Vec<CollectionClaim> {
        self.shared
            .claims
            .values()
            .into_iter()
            .filter(|c| c.invoice_id() == invoice_id)
            .collect()
    }
}

fn stale(id: ClaimId, expected: ClaimState, found: ClaimState) -> EngineError {
    EngineError::StaleState {
        entity: CollectionClaim::KIND,
        id: id.to_string(),
        expected: expected.to_string(),
        found: found.to_string(),
    }
}
