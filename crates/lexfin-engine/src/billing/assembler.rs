//! Batch assembly and advancement

use crate::billing::{BatchState, BillingBatch, BillingBatchItem, Decision};
use crate::intake::{IntakeItem, IntakeKind, IntakeState};
use crate::shared::Shared;
use chrono::{DateTime, Utc};
use lexfin_compliance::ComplianceView;
use lexfin_store::Entity;
use lexfin_types::{
    Actor, BatchId, BatchItemId, EngineError, EngineResult, IntakeItemId, JobId,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

/// Fields for assembling a batch
#[derive(Debug, Clone)]
pub struct NewBatch {
    /// Owning job
    pub job_id: JobId,
    /// Member items (all must be `posted` and belong to the job)
    pub item_ids: Vec<IntakeItemId>,
    /// Whether delivery routes through a third-party AP platform
    pub via_platform: bool,
}

/// The billing batch assembler service
#[derive(Debug, Clone)]
pub struct BatchAssembler {
    shared: Arc<Shared>,
}

impl BatchAssembler {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Assemble a batch from posted items of one job
    ///
    /// Member statuses are read and the totals computed under the assembly
    /// lock, so a batch can never include an item that left `posted`
    /// mid-assembly or that another open batch already claims. Totals are a
    /// frozen snapshot; they are never recomputed.
    ///
    /// # Errors
    /// `Validation` for an empty member list, a non-posted or foreign item,
    /// mixed currencies, or an item already claimed by another batch.
    pub fn create_batch(&self, actor: Actor, new: NewBatch) -> EngineResult<BillingBatch> {
        if !actor.role.is_operator() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "create billing batch",
            });
        }
        if new.item_ids.is_empty() {
            return Err(EngineError::validation("a batch needs at least one item"));
        }

        let _assembly = self.shared.batch_assembly.lock();

        let mut members: Vec<IntakeItem> = Vec::with_capacity(new.item_ids.len());
        for item_id in &new.item_ids {
            let item = self.shared.items.try_get(*item_id)?;
            if item.status != IntakeState::Posted {
                return Err(EngineError::validation(format!(
                    "item {item_id} is {} and cannot join a batch (must be posted)",
                    item.status
                )));
            }
            if item.job_id != new.job_id {
                return Err(EngineError::validation(format!(
                    "item {item_id} belongs to job {} not {}",
                    item.job_id, new.job_id
                )));
            }
            members.push(item);
        }

        let currency = members[0].amount.currency();
        if members.iter().any(|m| m.amount.currency() != currency) {
            return Err(EngineError::validation(
                "batch members must share one currency",
            ));
        }

        // An item still claimed by another batch (anything but a transfer)
        // cannot be claimed again
        for pairing in self.shared.batch_items.values() {
            if pairing.is_active_member() && new.item_ids.contains(&pairing.item_id) {
                return Err(EngineError::validation(format!(
                    "item {} is already claimed by batch {}",
                    pairing.item_id, pairing.batch_id
                )));
            }
        }

        let total_amount: Decimal = members.iter().map(|m| m.amount.amount()).sum();
        let total_fees: Decimal = members
            .iter()
            .filter(|m| matches!(m.kind, IntakeKind::OfficialFee))
            .map(|m| m.amount.amount())
            .sum();

        let now = Utc::now();
        let batch = BillingBatch {
            id: BatchId::new(),
            job_id: new.job_id,
            status: BatchState::PendingPartnerApproval,
            currency,
            total_amount,
            total_fees,
            via_platform: new.via_platform,
            invoice_id: None,
            created_by: actor.id,
            created_at: now,
            approved_by: None,
            approved_at: None,
        };
        if self.shared.batches.insert_new(batch.clone()).is_err() {
            return Err(EngineError::validation("batch id collision"));
        }
        self.shared
            .audit
            .record(BillingBatch::KIND, batch.id, "-", batch.status_label(), actor.id, now);

        for member in &members {
            let pairing = BillingBatchItem {
                id: BatchItemId::new(),
                batch_id: batch.id,
                item_id: member.id,
                decision: None,
                decided_by: None,
                decided_at: None,
            };
            if self.shared.batch_items.insert_new(pairing.clone()).is_err() {
                return Err(EngineError::validation("batch item id collision"));
            }
            self.shared.audit.record(
                BillingBatchItem::KIND,
                pairing.id,
                "-",
                pairing.status_label(),
                actor.id,
                now,
            );
        }
        info!(
            target: "lexfin::billing",
            batch = %batch.id,
            job = %batch.job_id,
            members = members.len(),
            total = %batch.total_amount,
            "billing batch assembled"
        );
        Ok(batch)
    }

    /// Record (or change) the decision for one batch member
    ///
    /// Decisions stay mutable exactly until the batch's derived invoice is
    /// issued.
    ///
    /// # Errors
    /// `Validation` once the invoice is issued; `NotFound` for an unknown
    /// pairing.
    pub fn decide(
        &self,
        actor: Actor,
        batch_item_id: BatchItemId,
        decision: Decision,
    ) -> EngineResult<BillingBatchItem> {
        if !actor.role.is_operator() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "decide on batch item",
            });
        }
        let observed = self.shared.batch_items.try_get(batch_item_id)?;
        let batch = self.shared.batches.try_get(observed.batch_id)?;
        if matches!(batch.status, BatchState::Issued | BatchState::Delivered) {
            return Err(EngineError::validation(format!(
                "decisions are frozen: batch {} already has an issued invoice",
                batch.id
            )));
        }
        let now = Utc::now();
        self.shared.batch_items.update_with(batch_item_id, |pairing| {
            let previous = pairing.status_label();
            pairing.decision = Some(decision);
            pairing.decided_by = Some(actor.id);
            pairing.decided_at = Some(now);
            self.shared.audit.record(
                BillingBatchItem::KIND,
                batch_item_id,
                previous,
                pairing.status_label(),
                actor.id,
                now,
            );
            debug!(
                target: "lexfin::billing",
                pairing = %batch_item_id,
                decision = decision.as_str(),
                "batch item decided"
            );
            Ok(pairing.clone())
        })
    }

    /// Move a batch forward one state
    ///
    /// The partner-approval edge requires approval authority, all members
    /// decided with at least one emit, and - when the four-eyes policy
    /// applies to the job - an approver distinct from the batch creator.
    /// The issue and delivery edges are driven by the derived invoice's
    /// lifecycle, not by `advance`.
    ///
    /// # Errors
    /// `PermissionDenied`, `SeparationOfDuties`, `Validation`,
    /// `InvalidTransition`, `StaleState`.
    pub fn advance(
        &self,
        actor: Actor,
        batch_id: BatchId,
        ctx: &dyn ComplianceView,
    ) -> EngineResult<BillingBatch> {
        let observed = self.shared.batches.try_get(batch_id)?;
        match observed.status {
            BatchState::PendingPartnerApproval => {
                if !actor.role.can_approve() {
                    return Err(EngineError::PermissionDenied {
                        role: actor.role,
                        action: "approve billing batch",
                    });
                }
                let job = ctx
                    .job_compliance(observed.job_id)
                    .ok_or_else(|| EngineError::not_found("job", observed.job_id))?;
                if self
                    .shared
                    .policy
                    .batch_four_eyes
                    .applies(job.subject_obliged)
                    && actor.id == observed.created_by
                {
                    return Err(EngineError::SeparationOfDuties {
                        actor: actor.id,
                        action: "approve",
                    });
                }
                let pairings = self.items_of(batch_id);
                if pairings.iter().any(|p| p.decision.is_none()) {
                    return Err(EngineError::validation(
                        "all batch items need a decision before approval",
                    ));
                }
                if !pairings.iter().any(|p| p.decision == Some(Decision::Emit)) {
                    return Err(EngineError::validation(
                        "a batch needs at least one emitted item to proceed",
                    ));
                }
                let advanced =
                    self.write(actor, batch_id, observed.status, BatchState::ReadyForSap, |b, now| {
                        b.approved_by = Some(actor.id);
                        b.approved_at = Some(now);
                    })?;
                info!(target: "lexfin::billing", batch = %batch_id, approver = %actor.id, "batch approved");
                Ok(advanced)
            }
            BatchState::ReadyForSap => {
                if !observed.via_platform {
                    return Err(EngineError::validation(
                        "a direct batch reaches issued by issuing its derived invoice",
                    ));
                }
                self.write(actor, batch_id, observed.status, BatchState::PlatformRequired, |_, _| {})
            }
            BatchState::PlatformRequired => {
                let invoice_id = observed.invoice_id.ok_or_else(|| {
                    EngineError::validation("derive the invoice before completing the platform gate")
                })?;
                let completed = self
                    .shared
                    .platform_tasks
                    .values()
                    .into_iter()
                    .any(|t| t.invoice_id == invoice_id && t.is_completed());
                if !completed {
                    return Err(EngineError::validation(
                        "at least one completed platform task is required",
                    ));
                }
                self.write(actor, batch_id, observed.status, BatchState::PlatformCompleted, |_, _| {})
            }
            BatchState::PlatformCompleted | BatchState::Issued => Err(EngineError::validation(
                "this edge is driven by the derived invoice's lifecycle",
            )),
            BatchState::Delivered => Err(EngineError::InvalidTransition {
                entity: BillingBatch::KIND,
                id: batch_id.to_string(),
                from: observed.status.to_string(),
                requested: "-".to_string(),
            }),
        }
    }

    /// Read a batch
    ///
    /// # Errors
    /// `NotFound` for an unknown id.
    pub fn batch(&self, id: BatchId) -> EngineResult<BillingBatch> {
        self.shared.batches.try_get(id)
    }

    /// All pairings of a batch
    #[must_use]
    pub fn items_of(&self, batch_id: BatchId) -> Vec<BillingBatchItem> {
        self.shared
            .batch_items
            .values()
            .into_iter()
            .filter(|p| p.batch_id == batch_id)
            .collect()
    }

    // ---- internals (driven by the invoice lifecycle) ----

    pub(crate) fn write(
        &self,
        actor: Actor,
        id: BatchId,
        from: BatchState,
        to: BatchState,
        mutate: impl FnOnce(&mut BillingBatch, DateTime<Utc>),
    ) -> EngineResult<BillingBatch> {
        if !from.can_transition(to) {
            return Err(EngineError::InvalidTransition {
                entity: BillingBatch::KIND,
                id: id.to_string(),
                from: from.to_string(),
                requested: to.to_string(),
            });
        }
        let now = Utc::now();
        self.shared.batches.update_with(id, |batch| {
            if batch.status != from {
                return Err(EngineError::StaleState {
                    entity: BillingBatch::KIND,
                    id: id.to_string(),
                    expected: from.to_string(),
                    found: batch.status.to_string(),
                });
            }
            batch.status = to;
            mutate(batch, now);
            self.shared
                .audit
                .record(BillingBatch::KIND, id, from.as_str(), to.as_str(), actor.id, now);
            Ok(batch.clone())
        })
    }
}
