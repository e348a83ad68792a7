//! Invoice lifecycle transitions
//!
//! Issuing is the pivot of the billing flow: it assigns the external
//! identifiers exactly once, moves the source batch to `issued`, and bills
//! the emitted intake items (`posted -> ready_to_bill -> billed`). Closing
//! an invoice requires delivery evidence - a sent delivery or a completed
//! platform task - never an empty delivery record.

use crate::billing::{BatchState, BillingBatch, Decision};
use crate::dispatch::DeliveryStatus;
use crate::intake::ledger::IntakeLedger;
use crate::intake::IntakeState;
use crate::invoice::{ClientInvoice, InvoiceOrigin, InvoiceState};
use crate::shared::Shared;
use chrono::{DateTime, NaiveDate, Utc};
use lexfin_compliance::{ComplianceView, UttaiStatus};
use lexfin_store::Entity;
use lexfin_types::{Actor, BatchId, EngineError, EngineResult, IntakeItemId, InvoiceId, JobId};
use std::sync::Arc;
use tracing::info;

/// The client invoice lifecycle service
#[derive(Debug, Clone)]
pub struct InvoiceLifecycle {
    shared: Arc<Shared>,
    ledger: IntakeLedger,
}

impl InvoiceLifecycle {
    pub(crate) fn new(shared: Arc<Shared>, ledger: IntakeLedger) -> Self {
        Self { shared, ledger }
    }

    /// Derive an invoice from a ready batch
    ///
    /// # Errors
    /// `Validation` unless the batch is `ready_for_sap` and not yet
    /// invoiced; `StaleState` if another invoice claims the batch first.
    pub fn create_from_batch(&self, actor: Actor, batch_id: BatchId) -> EngineResult<ClientInvoice> {
        if !actor.role.is_operator() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "create invoice",
            });
        }
        let batch = self.shared.batches.try_get(batch_id)?;
        if batch.status != BatchState::ReadyForSap {
            return Err(EngineError::validation(format!(
                "batch {batch_id} is {} and cannot derive an invoice (must be ready_for_sap)",
                batch.status
            )));
        }
        if batch.invoice_id.is_some() {
            return Err(EngineError::validation(format!(
                "batch {batch_id} already derived an invoice"
            )));
        }

        let now = Utc::now();
        let invoice = ClientInvoice {
            id: InvoiceId::new(),
            job_id: batch.job_id,
            origin: InvoiceOrigin::FromBatch(batch_id),
            status: InvoiceState::Draft,
            sap_invoice_number: None,
            sap_invoice_date: None,
            created_by: actor.id,
            created_at: now,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            issued_by: None,
            issued_at: None,
        };

        // Claim the batch first; losing a concurrent race surfaces here
        self.shared.batches.update_with(batch_id, |b| {
            if b.invoice_id.is_some() {
                return Err(EngineError::StaleState {
                    entity: BillingBatch::KIND,
                    id: batch_id.to_string(),
                    expected: "uninvoiced".to_string(),
                    found: "invoiced".to_string(),
                });
            }
            b.invoice_id = Some(invoice.id);
            Ok(())
        })?;

        if self.shared.invoices.insert_new(invoice.clone()).is_err() {
            return Err(EngineError::validation("invoice id collision"));
        }
        self.shared
            .audit
            .record(ClientInvoice::KIND, invoice.id, "-", invoice.status_label(), actor.id, now);
        info!(
            target: "lexfin::invoice",
            invoice = %invoice.id,
            batch = %batch_id,
            "invoice derived from batch"
        );
        Ok(invoice)
    }

    /// Create a standalone invoice (platform-only/manual flows)
    ///
    /// # Errors
    /// `NotFound` for an unknown job.
    pub fn create_manual(
        &self,
        actor: Actor,
        job_id: JobId,
        ctx: &dyn ComplianceView,
    ) -> EngineResult<ClientInvoice> {
        if !actor.role.is_operator() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "create invoice",
            });
        }
        if ctx.job_compliance(job_id).is_none() {
            return Err(EngineError::not_found("job", job_id));
        }
        let now = Utc::now();
        let invoice = ClientInvoice {
            id: InvoiceId::new(),
            job_id,
            origin: InvoiceOrigin::Manual,
            status: InvoiceState::Draft,
            sap_invoice_number: None,
            sap_invoice_date: None,
            created_by: actor.id,
            created_at: now,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            issued_by: None,
            issued_at: None,
        };
        if self.shared.invoices.insert_new(invoice.clone()).is_err() {
            return Err(EngineError::validation("invoice id collision"));
        }
        self.shared
            .audit
            .record(ClientInvoice::KIND, invoice.id, "-", invoice.status_label(), actor.id, now);
        Ok(invoice)
    }

    /// Put a draft invoice under partner approval
    ///
    /// Idempotent: an invoice already past draft is returned unchanged.
    ///
    /// # Errors
    /// `PermissionDenied`, `StaleState`.
    pub fn request_approval(&self, actor: Actor, id: InvoiceId) -> EngineResult<ClientInvoice> {
        if !actor.role.is_operator() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "request invoice approval",
            });
        }
        let observed = self.shared.invoices.try_get(id)?;
        if observed.status != InvoiceState::Draft {
            return Ok(observed);
        }
        self.write(actor, id, observed.status, InvoiceState::PendingPartnerApproval, |_, _| {})
    }

    /// Approve an invoice for issuing
    ///
    /// # Errors
    /// `PermissionDenied`, `InvalidTransition`, `StaleState`.
    pub fn approve(&self, actor: Actor, id: InvoiceId) -> EngineResult<ClientInvoice> {
        if !actor.role.can_approve() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "approve invoice",
            });
        }
        let observed = self.shared.invoices.try_get(id)?;
        self.write(actor, id, observed.status, InvoiceState::ReadyForSap, |invoice, now| {
            invoice.approved_by = Some(actor.id);
            invoice.approved_at = Some(now);
        })
    }

    /// Refuse approval and return the invoice to draft
    ///
    /// # Errors
    /// `PermissionDenied`, `Validation` (empty reason), `InvalidTransition`,
    /// `StaleState`.
    pub fn reject(
        &self,
        actor: Actor,
        id: InvoiceId,
        reason: impl Into<String>,
    ) -> EngineResult<ClientInvoice> {
        let reason = reason.into();
        if !actor.role.can_approve() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "reject invoice",
            });
        }
        if reason.trim().is_empty() {
            return Err(EngineError::validation("rejection reason must not be empty"));
        }
        let observed = self.shared.invoices.try_get(id)?;
        if observed.status != InvoiceState::PendingPartnerApproval {
            return Err(EngineError::InvalidTransition {
                entity: ClientInvoice::KIND,
                id: id.to_string(),
                from: observed.status.to_string(),
                requested: InvoiceState::Draft.to_string(),
            });
        }
        self.write(actor, id, observed.status, InvoiceState::Draft, |invoice, _| {
            invoice.rejection_reason = Some(reason);
        })
    }

    /// Issue the invoice, assigning its external identifiers exactly once
    ///
    /// For batch-derived invoices this also moves the batch to `issued` and
    /// bills every emitted member item. Re-issuing fails `AlreadyIssued`.
    ///
    /// # Errors
    /// `AlreadyIssued`, `InvalidTransition`, `Validation`,
    /// `ComplianceBlocked`, `StaleState`.
    pub fn issue(
        &self,
        actor: Actor,
        id: InvoiceId,
        sap_number: impl Into<String>,
        sap_date: NaiveDate,
        ctx: &dyn ComplianceView,
    ) -> EngineResult<ClientInvoice> {
        let sap_number = sap_number.into();
        if !actor.role.is_operator() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "issue invoice",
            });
        }
        if sap_number.trim().is_empty() {
            return Err(EngineError::validation("external invoice number must not be empty"));
        }
        let observed = self.shared.invoices.try_get(id)?;
        if let Some(existing) = &observed.sap_invoice_number {
            return Err(EngineError::AlreadyIssued {
                invoice: id,
                number: existing.clone(),
            });
        }
        if observed.status != InvoiceState::ReadyForSap {
            return Err(EngineError::InvalidTransition {
                entity: ClientInvoice::KIND,
                id: id.to_string(),
                from: observed.status.to_string(),
                requested: InvoiceState::Issued.to_string(),
            });
        }

        // Validate the whole side-effect chain before the first write
        let batch_context = match observed.origin {
            InvoiceOrigin::FromBatch(batch_id) => {
                let batch = self.shared.batches.try_get(batch_id)?;
                if !batch.status.can_transition(BatchState::Issued) {
                    return Err(EngineError::validation(format!(
                        "batch {batch_id} is {} and cannot be issued (complete the platform gate first)",
                        batch.status
                    )));
                }
                let job = ctx
                    .job_compliance(observed.job_id)
                    .ok_or_else(|| EngineError::not_found("job", observed.job_id))?;
                if job.uttai_status == UttaiStatus::Blocked {
                    return Err(EngineError::ComplianceBlocked {
                        job: observed.job_id,
                    });
                }
                let emitted: Vec<IntakeItemId> = self
                    .shared
                    .batch_items
                    .values()
                    .into_iter()
                    .filter(|p| p.batch_id == batch_id && p.decision == Some(Decision::Emit))
                    .map(|p| p.item_id)
                    .collect();
                for item_id in &emitted {
                    let item = self.shared.items.try_get(*item_id)?;
                    if !matches!(item.status, IntakeState::Posted | IntakeState::ReadyToBill) {
                        return Err(EngineError::validation(format!(
                            "emitted item {item_id} is {} and cannot be billed",
                            item.status
                        )));
                    }
                }
                Some((batch, emitted))
            }
            InvoiceOrigin::Manual => None,
        };

        // The invoice write is the atomic claim that makes issuing one-way
        let issued = self.write(actor, id, observed.status, InvoiceState::Issued, |invoice, now| {
            invoice.sap_invoice_number = Some(sap_number.clone());
            invoice.sap_invoice_date = Some(sap_date);
            invoice.issued_by = Some(actor.id);
            invoice.issued_at = Some(now);
        })?;

        if let Some((batch, emitted)) = batch_context {
            self.write_batch(actor, &batch, BatchState::Issued)?;
            for item_id in emitted {
                self.ledger.mark_ready_to_bill(actor, item_id, ctx)?;
                self.ledger.mark_billed(actor, item_id, ctx)?;
            }
        }
        info!(
            target: "lexfin::invoice",
            invoice = %id,
            number = %sap_number,
            "invoice issued"
        );
        Ok(issued)
    }

    /// Route an issued invoice through a third-party AP platform
    ///
    /// # Errors
    /// `PermissionDenied`, `InvalidTransition`, `StaleState`.
    pub fn route_via_platform(&self, actor: Actor, id: InvoiceId) -> EngineResult<ClientInvoice> {
        if !actor.role.is_operator() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "route invoice via platform",
            });
        }
        let observed = self.shared.invoices.try_get(id)?;
        self.write(actor, id, observed.status, InvoiceState::PlatformRequired, |_, _| {})
    }

    /// Close an invoice through its platform confirmation
    ///
    /// # Errors
    /// `Validation` without a completed platform task; `InvalidTransition`;
    /// `StaleState`.
    pub fn complete_platform(&self, actor: Actor, id: InvoiceId) -> EngineResult<ClientInvoice> {
        if !actor.role.is_operator() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "complete invoice platform gate",
            });
        }
        let observed = self.shared.invoices.try_get(id)?;
        if !self.has_completed_platform_task(id) {
            return Err(EngineError::validation(
                "at least one completed platform task is required",
            ));
        }
        self.write(actor, id, observed.status, InvoiceState::PlatformCompleted, |_, _| {})
    }

    /// Close an invoice as delivered
    ///
    /// Requires at least one sent delivery or one completed platform task;
    /// an invoice cannot be closed on an empty delivery record. Synchronizes
    /// the source batch.
    ///
    /// # Errors
    /// `Validation` without delivery evidence; `InvalidTransition`;
    /// `StaleState`.
    pub fn mark_delivered(&self, actor: Actor, id: InvoiceId) -> EngineResult<ClientInvoice> {
        if !actor.role.is_operator() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "mark invoice delivered",
            });
        }
        let observed = self.shared.invoices.try_get(id)?;
        let has_sent_delivery = self
            .shared
            .deliveries
            .values()
            .into_iter()
            .any(|d| d.invoice_id == id && d.status == DeliveryStatus::Sent);
        if !has_sent_delivery && !self.has_completed_platform_task(id) {
            return Err(EngineError::validation(
                "an invoice needs a sent delivery or a completed platform task to close",
            ));
        }
        let delivered = self.write(actor, id, observed.status, InvoiceState::Delivered, |_, _| {})?;

        if let InvoiceOrigin::FromBatch(batch_id) = observed.origin {
            let batch = self.shared.batches.try_get(batch_id)?;
            self.write_batch(actor, &batch, BatchState::Delivered)?;
        }
        info!(target: "lexfin::invoice", invoice = %id, "invoice delivered");
        Ok(delivered)
    }

    /// Read an invoice
    ///
    /// # Errors
    /// `NotFound` for an unknown id.
    pub fn invoice(&self, id: InvoiceId) -> EngineResult<ClientInvoice> {
        self.shared.invoices.try_get(id)
    }

    // ---- internals ----

    fn has_completed_platform_task(&self, id: InvoiceId) -> bool {
        self.shared
            .platform_tasks
            .values()
            .into_iter()
            .any(|t| t.invoice_id == id && t.is_completed())
    }

    fn write(
        &self,
        actor: Actor,
        id: InvoiceId,
        from: InvoiceState,
        to: InvoiceState,
        mutate: impl FnOnce(&mut ClientInvoice, DateTime<Utc>),
    ) -> EngineResult<ClientInvoice> {
        if !from.can_transition(to) {
            return Err(EngineError::InvalidTransition {
                entity: ClientInvoice::KIND,
                id: id.to_string(),
                from: from.to_string(),
                requested: to.to_string(),
            });
        }
        let now = Utc::now();
        self.shared.invoices.update_with(id, |invoice| {
            if invoice.status != from {
                return Err(EngineError::StaleState {
                    entity: ClientInvoice::KIND,
                    id: id.to_string(),
                    expected: from.to_string(),
                    found: invoice.status.to_string(),
                });
            }
            invoice.status = to;
            mutate(invoice, now);
            self.shared
                .audit
                .record(ClientInvoice::KIND, id, from.as_str(), to.as_str(), actor.id, now);
            Ok(invoice.clone())
        })
    }

    fn write_batch(
        &self,
        actor: Actor,
        batch: &BillingBatch,
        to: BatchState,
    ) -> EngineResult<()> {
        let now = Utc::now();
        let from = batch.status;
        if !from.can_transition(to) {
            return Err(EngineError::InvalidTransition {
                entity: BillingBatch::KIND,
                id: batch.id.to_string(),
                from: from.to_string(),
                requested: to.to_string(),
            });
        }
        self.shared.batches.update_with(batch.id, |b| {
            if b.status != from {
                return Err(EngineError::StaleState {
                    entity: BillingBatch::KIND,
                    id: batch.id.to_string(),
                    expected: from.to_string(),
                    found: b.status.to_string(),
                });
            }
            b.status = to;
            self.shared
                .audit
                .record(BillingBatch::KIND, batch.id, from.as_str(), to.as_str(), actor.id, now);
            Ok(())
        })
    }
}
