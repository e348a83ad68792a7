//! Intake ledger transitions
//!
//! Every transition is a single atomic read-check-write: the caller's role
//! and the machine edge are validated against the observed state, then the
//! write re-checks that state under the entry lock and fails `StaleState`
//! if a concurrent operator moved the item first.
//!
//! The UTTAI gate: once an item is past `draft`, every transition fails
//! `ComplianceBlocked` while the owning job is blocked, except `reject` and
//! `archive`.

use crate::intake::{IntakeItem, IntakeKind, IntakeState};
use crate::shared::Shared;
use chrono::{DateTime, Utc};
use lexfin_compliance::{ComplianceView, JobCompliance, UttaiStatus};
use lexfin_store::Entity;
use lexfin_types::{
    Actor, EngineError, EngineResult, IntakeItemId, JobId, Money, Role,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Fields for drafting an intake item
#[derive(Debug, Clone)]
pub struct NewIntakeItem {
    /// Owning job
    pub job_id: JobId,
    /// Cost kind (vendor reference iff vendor invoice)
    pub kind: IntakeKind,
    /// Vendor's invoice number or fee reference
    pub invoice_number: String,
    /// Strictly-positive amount
    pub amount: Money,
    /// Free-text concept
    pub concept: String,
}

/// The intake ledger service
#[derive(Debug, Clone)]
pub struct IntakeLedger {
    shared: Arc<Shared>,
}

impl IntakeLedger {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Draft a new item
    ///
    /// # Errors
    /// `PermissionDenied` for non-operators; `Validation` for an empty
    /// invoice number or concept.
    pub fn create_draft(&self, actor: Actor, new: NewIntakeItem) -> EngineResult<IntakeItem> {
        if !actor.role.is_operator() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "create intake item",
            });
        }
        if new.invoice_number.trim().is_empty() {
            return Err(EngineError::validation("invoice number must not be empty"));
        }
        if new.concept.trim().is_empty() {
            return Err(EngineError::validation("concept must not be empty"));
        }
        let now = Utc::now();
        let item = IntakeItem {
            id: IntakeItemId::new(),
            job_id: new.job_id,
            kind: new.kind,
            invoice_number: new.invoice_number,
            amount: new.amount,
            concept: new.concept,
            status: IntakeState::Draft,
            revision: 0,
            uttai_status_snapshot: None,
            vendor_compliance_snapshot: None,
            created_by: actor.id,
            created_at: now,
            submitted_by: None,
            submitted_at: None,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            review_note: None,
        };
        if self.shared.items.insert_new(item.clone()).is_err() {
            return Err(EngineError::validation("intake item id collision"));
        }
        self.shared
            .audit
            .record(IntakeItem::KIND, item.id, "-", item.status_label(), actor.id, now);
        info!(
            target: "lexfin::intake",
            item = %item.id,
            job = %item.job_id,
            kind = item.kind.as_str(),
            "intake item drafted"
        );
        Ok(item)
    }

    /// Submit a draft, or resubmit after `needs_info`
    ///
    /// Only the creator or a BPO operator may submit. Both compliance
    /// snapshots are captured at this moment, not before. Resubmission keeps
    /// the item's identity, bumps the revision (`-R1`, `-R2`, ... suffix
    /// convention), and is subject to the policy ceiling.
    ///
    /// # Errors
    /// `PermissionDenied`, `InvalidTransition`, `NotFound` (unresolvable job
    /// or vendor), `ComplianceBlocked` (resubmission while blocked),
    /// `Validation` (ceiling reached), `StaleState`.
    pub fn submit(
        &self,
        actor: Actor,
        id: IntakeItemId,
        ctx: &dyn ComplianceView,
    ) -> EngineResult<IntakeItem> {
        let observed = self.shared.items.try_get(id)?;
        if actor.id != observed.created_by && actor.role != Role::Bpo {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "submit intake item",
            });
        }
        if !observed.status.can_transition(IntakeState::Submitted) {
            return Err(invalid_transition(&observed, IntakeState::Submitted));
        }
        let job = job_compliance(observed.job_id, ctx)?;
        let vendor_compliance = match observed.kind.vendor_id() {
            Some(vendor_id) => Some(
                ctx.vendor_compliance(vendor_id)
                    .ok_or_else(|| EngineError::not_found("vendor", vendor_id))?,
            ),
            None => None,
        };

        let resubmission = observed.status == IntakeState::NeedsInfo;
        if resubmission {
            // The resubmission edge sits past `submitted`, so it is gated
            if job.uttai_status == UttaiStatus::Blocked {
                return Err(EngineError::ComplianceBlocked {
                    job: observed.job_id,
                });
            }
            if let Some(limit) = self.shared.policy.resubmission_limit {
                if observed.revision >= limit {
                    return Err(EngineError::validation(format!(
                        "resubmission limit of {limit} reached for item {id}"
                    )));
                }
            }
        }

        let submitted = self.write(actor, id, observed.status, IntakeState::Submitted, |item, now| {
            if resubmission {
                item.revision += 1;
                item.review_note = None;
            }
            item.uttai_status_snapshot = Some(job.uttai_status);
            item.vendor_compliance_snapshot = vendor_compliance;
            item.submitted_by = Some(actor.id);
            item.submitted_at = Some(now);
        })?;
        info!(
            target: "lexfin::intake",
            item = %id,
            number = %submitted.display_invoice_number(),
            revision = submitted.revision,
            "intake item submitted"
        );
        Ok(submitted)
    }

    /// Queue a submitted item for an approver
    ///
    /// Idempotent: an item already queued is returned unchanged.
    ///
    /// # Errors
    /// `PermissionDenied`, `InvalidTransition`, `ComplianceBlocked`,
    /// `StaleState`.
    pub fn queue_for_approval(
        &self,
        actor: Actor,
        id: IntakeItemId,
        ctx: &dyn ComplianceView,
    ) -> EngineResult<IntakeItem> {
        let observed = self.shared.items.try_get(id)?;
        if !actor.role.is_operator() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "queue intake item for approval",
            });
        }
        if observed.status == IntakeState::PendingApproval {
            return Ok(observed);
        }
        if !observed.status.can_transition(IntakeState::PendingApproval) {
            return Err(invalid_transition(&observed, IntakeState::PendingApproval));
        }
        self.ensure_not_blocked(observed.job_id, ctx)?;
        self.write(actor, id, observed.status, IntakeState::PendingApproval, |_, _| {})
    }

    /// Approve an item for accounting
    ///
    /// # Errors
    /// `PermissionDenied` unless the caller holds approval authority;
    /// `InvalidTransition` unless submitted or pending approval;
    /// `ComplianceBlocked` while the job is blocked; `StaleState`.
    pub fn approve(
        &self,
        actor: Actor,
        id: IntakeItemId,
        ctx: &dyn ComplianceView,
    ) -> EngineResult<IntakeItem> {
        let observed = self.shared.items.try_get(id)?;
        if !actor.role.can_approve() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "approve intake item",
            });
        }
        if !observed.status.can_transition(IntakeState::Approved) {
            return Err(invalid_transition(&observed, IntakeState::Approved));
        }
        self.ensure_not_blocked(observed.job_id, ctx)?;
        let approved = self.write(actor, id, observed.status, IntakeState::Approved, |item, now| {
            item.approved_by = Some(actor.id);
            item.approved_at = Some(now);
        })?;
        info!(target: "lexfin::intake", item = %id, approver = %actor.id, "intake item approved");
        Ok(approved)
    }

    /// Reject an item
    ///
    /// A first rejection moves to `rejected`; rejecting a resubmitted
    /// lineage archives it instead of looping. Never compliance-gated.
    ///
    /// # Errors
    /// `PermissionDenied`, `Validation` (empty reason), `InvalidTransition`,
    /// `StaleState`.
    pub fn reject(
        &self,
        actor: Actor,
        id: IntakeItemId,
        reason: impl Into<String>,
    ) -> EngineResult<IntakeItem> {
        let reason = reason.into();
        let observed = self.shared.items.try_get(id)?;
        if !actor.role.can_approve() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "reject intake item",
            });
        }
        if reason.trim().is_empty() {
            return Err(EngineError::validation("rejection reason must not be empty"));
        }
        let target = if observed.revision > 0 {
            IntakeState::Archived
        } else {
            IntakeState::Rejected
        };
        if !observed.status.can_transition(target) {
            return Err(invalid_transition(&observed, target));
        }
        self.write(actor, id, observed.status, target, |item, now| {
            item.rejected_by = Some(actor.id);
            item.rejected_at = Some(now);
            item.rejection_reason = Some(reason);
        })
    }

    /// Return an item to its submitter for more information
    ///
    /// # Errors
    /// `PermissionDenied`, `Validation` (empty note), `InvalidTransition`,
    /// `ComplianceBlocked`, `StaleState`.
    pub fn request_info(
        &self,
        actor: Actor,
        id: IntakeItemId,
        note: impl Into<String>,
        ctx: &dyn ComplianceView,
    ) -> EngineResult<IntakeItem> {
        let note = note.into();
        let observed = self.shared.items.try_get(id)?;
        if !actor.role.can_approve() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "request information on intake item",
            });
        }
        if note.trim().is_empty() {
            return Err(EngineError::validation("reviewer note must not be empty"));
        }
        if !observed.status.can_transition(IntakeState::NeedsInfo) {
            return Err(invalid_transition(&observed, IntakeState::NeedsInfo));
        }
        self.ensure_not_blocked(observed.job_id, ctx)?;
        self.write(actor, id, observed.status, IntakeState::NeedsInfo, |item, _| {
            item.review_note = Some(note);
        })
    }

    /// Archive a rejected item
    ///
    /// Never compliance-gated.
    ///
    /// # Errors
    /// `PermissionDenied`, `InvalidTransition`, `StaleState`.
    pub fn archive(&self, actor: Actor, id: IntakeItemId) -> EngineResult<IntakeItem> {
        let observed = self.shared.items.try_get(id)?;
        if !actor.role.is_operator() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "archive intake item",
            });
        }
        if observed.status == IntakeState::Archived {
            return Ok(observed);
        }
        if observed.status != IntakeState::Rejected {
            return Err(invalid_transition(&observed, IntakeState::Archived));
        }
        self.write(actor, id, observed.status, IntakeState::Archived, |_, _| {})
    }

    /// Record the hand-off to the external accounting system
    ///
    /// One-way and idempotent.
    ///
    /// # Errors
    /// `InvalidTransition` if it would skip a state; `ComplianceBlocked`;
    /// `StaleState`.
    pub fn mark_sent_to_accounting(
        &self,
        actor: Actor,
        id: IntakeItemId,
        ctx: &dyn ComplianceView,
    ) -> EngineResult<IntakeItem> {
        self.one_way(actor, id, IntakeState::SentToAccounting, ctx)
    }

    /// Record the external accounting acknowledgment
    ///
    /// One-way and idempotent.
    ///
    /// # Errors
    /// As [`IntakeLedger::mark_sent_to_accounting`].
    pub fn mark_posted(
        &self,
        actor: Actor,
        id: IntakeItemId,
        ctx: &dyn ComplianceView,
    ) -> EngineResult<IntakeItem> {
        self.one_way(actor, id, IntakeState::Posted, ctx)
    }

    /// Record selection for billing
    ///
    /// One-way and idempotent.
    ///
    /// # Errors
    /// As [`IntakeLedger::mark_sent_to_accounting`].
    pub fn mark_ready_to_bill(
        &self,
        actor: Actor,
        id: IntakeItemId,
        ctx: &dyn ComplianceView,
    ) -> EngineResult<IntakeItem> {
        self.one_way(actor, id, IntakeState::ReadyToBill, ctx)
    }

    /// Record billing to the client
    ///
    /// One-way and idempotent.
    ///
    /// # Errors
    /// As [`IntakeLedger::mark_sent_to_accounting`].
    pub fn mark_billed(
        &self,
        actor: Actor,
        id: IntakeItemId,
        ctx: &dyn ComplianceView,
    ) -> EngineResult<IntakeItem> {
        self.one_way(actor, id, IntakeState::Billed, ctx)
    }

    /// Read an item
    ///
    /// # Errors
    /// `NotFound` for an unknown id.
    pub fn item(&self, id: IntakeItemId) -> EngineResult<IntakeItem> {
        self.shared.items.try_get(id)
    }

    /// All items recorded against a job
    #[must_use]
    pub fn items_for_job(&self, job_id: JobId) -> Vec<IntakeItem> {
        self.shared
            .items
            .values()
            .into_iter()
            .filter(|i| i.job_id == job_id)
            .collect()
    }

    // ---- internals ----

    fn one_way(
        &self,
        actor: Actor,
        id: IntakeItemId,
        target: IntakeState,
        ctx: &dyn ComplianceView,
    ) -> EngineResult<IntakeItem> {
        let observed = self.shared.items.try_get(id)?;
        if !actor.role.is_operator() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "advance intake item",
            });
        }
        // Reapplying is a no-op; skipping a state is rejected
        if observed.status == target {
            return Ok(observed);
        }
        if !observed.status.can_transition(target) {
            return Err(invalid_transition(&observed, target));
        }
        self.ensure_not_blocked(observed.job_id, ctx)?;
        let moved = self.write(actor, id, observed.status, target, |_, _| {})?;
        debug!(
            target: "lexfin::intake",
            item = %id,
            to = target.as_str(),
            "intake item advanced"
        );
        Ok(moved)
    }

    fn write(
        &self,
        actor: Actor,
        id: IntakeItemId,
        from: IntakeState,
        to: IntakeState,
        mutate: impl FnOnce(&mut IntakeItem, DateTime<Utc>),
    ) -> EngineResult<IntakeItem> {
        let now = Utc::now();
        self.shared.items.update_with(id, |item| {
            if item.status != from {
                return Err(EngineError::StaleState {
                    entity: IntakeItem::KIND,
                    id: id.to_string(),
                    expected: from.to_string(),
                    found: item.status.to_string(),
                });
            }
            item.status = to;
            mutate(item, now);
            self.shared
                .audit
                .record(IntakeItem::KIND, id, from.as_str(), to.as_str(), actor.id, now);
            Ok(item.clone())
        })
    }

    fn ensure_not_blocked(&self, job_id: JobId, ctx: &dyn ComplianceView) -> EngineResult<()> {
        let job = job_compliance(job_id, ctx)?;
        if job.uttai_status == UttaiStatus::Blocked {
            return Err(EngineError::ComplianceBlocked { job: job_id });
        }
        Ok(())
    }
}

fn invalid_transition(item: &IntakeItem, requested: IntakeState) -> EngineError {
    EngineError::InvalidTransition {
        entity: IntakeItem::KIND,
        id: item.id.to_string(),
        from: item.status.to_string(),
        requested: requested.to_string(),
    }
}

fn job_compliance(job_id: JobId, ctx: &dyn ComplianceView) -> EngineResult<JobCompliance> {
    ctx.job_compliance(job_id)
        .ok_or_else(|| EngineError::not_found("job", job_id))
}
