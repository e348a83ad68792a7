//! Dispatch transitions

use crate::dispatch::{
    Delivery, DeliveryKind, DeliveryStatus, PlatformTask, PlatformTaskStatus,
};
use crate::shared::Shared;
use chrono::{DateTime, Utc};
use lexfin_store::Entity;
use lexfin_types::{
    Actor, DeliveryId, EngineError, EngineResult, InvoiceId, PlatformTaskId,
};
use std::sync::Arc;
use tracing::info;

/// The delivery & platform dispatcher service
#[derive(Debug, Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    // ---- deliveries ----

    /// Prepare a delivery for an invoice
    ///
    /// # Errors
    /// `NotFound` for an unknown invoice.
    pub fn create_delivery(
        &self,
        actor: Actor,
        invoice_id: InvoiceId,
        kind: DeliveryKind,
        recipients: Vec<String>,
    ) -> EngineResult<Delivery> {
        if !actor.role.is_operator() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "create delivery",
            });
        }
        let _ = self.shared.invoices.try_get(invoice_id)?;
        let now = Utc::now();
        let delivery = Delivery {
            id: DeliveryId::new(),
            invoice_id,
            kind,
            recipients,
            status: DeliveryStatus::Pending,
            created_by: actor.id,
            created_at: now,
            sent_by: None,
            sent_at: None,
        };
        if self.shared.deliveries.insert_new(delivery.clone()).is_err() {
            return Err(EngineError::validation("delivery id collision"));
        }
        self.shared
            .audit
            .record(Delivery::KIND, delivery.id, "-", delivery.status_label(), actor.id, now);
        Ok(delivery)
    }

    /// Send a delivery
    ///
    /// Requires at least one recipient with a plausible email address.
    /// Idempotent once sent; a re-send is a new delivery record.
    ///
    /// # Errors
    /// `Validation` for an empty or malformed recipient list; `StaleState`.
    pub fn send(&self, actor: Actor, id: DeliveryId) -> EngineResult<Delivery> {
        if !actor.role.is_operator() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "send delivery",
            });
        }
        let observed = self.shared.deliveries.try_get(id)?;
        if observed.status == DeliveryStatus::Sent {
            return Ok(observed);
        }
        if observed.recipients.is_empty() {
            return Err(EngineError::validation(
                "a delivery needs at least one recipient",
            ));
        }
        if observed
            .recipients
            .iter()
            .any(|r| r.trim().is_empty() || !r.contains('@'))
        {
            return Err(EngineError::validation(
                "every recipient needs a non-empty email address",
            ));
        }
        let now = Utc::now();
        let sent = self.shared.deliveries.update_with(id, |delivery| {
            if delivery.status != DeliveryStatus::Pending {
                return Err(EngineError::StaleState {
                    entity: Delivery::KIND,
                    id: id.to_string(),
                    expected: DeliveryStatus::Pending.as_str().to_string(),
                    found: delivery.status.as_str().to_string(),
                });
            }
            delivery.status = DeliveryStatus::Sent;
            delivery.sent_by = Some(actor.id);
            delivery.sent_at = Some(now);
            self.shared.audit.record(
                Delivery::KIND,
                id,
                DeliveryStatus::Pending.as_str(),
                DeliveryStatus::Sent.as_str(),
                actor.id,
                now,
            );
            Ok(delivery.clone())
        })?;
        info!(
            target: "lexfin::dispatch",
            delivery = %id,
            invoice = %sent.invoice_id,
            recipients = sent.recipients.len(),
            "delivery sent"
        );
        Ok(sent)
    }

    /// Read a delivery
    ///
    /// # Errors
    /// `NotFound` for an unknown id.
    pub fn delivery(&self, id: DeliveryId) -> EngineResult<Delivery> {
        self.shared.deliveries.try_get(id)
    }

    /// All deliveries of an invoice
    #[must_use]
    pub fn deliveries_for(&self, invoice_id: InvoiceId) -> Vec<Delivery> {
        self.shared
            .deliveries
            .values()
            .into_iter()
            .filter(|d| d.invoice_id == invoice_id)
            .collect()
    }

    // ---- platform tasks ----

    /// Open a platform task for an invoice
    ///
    /// # Errors
    /// `NotFound` for an unknown invoice; `Validation` for an empty platform
    /// name.
    pub fn create_platform_task(
        &self,
        actor: Actor,
        invoice_id: InvoiceId,
        platform_name: impl Into<String>,
        platform_code: impl Into<String>,
        sla_due_at: DateTime<Utc>,
    ) -> EngineResult<PlatformTask> {
        if !actor.role.is_operator() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "create platform task",
            });
        }
        let platform_name = platform_name.into();
        if platform_name.trim().is_empty() {
            return Err(EngineError::validation("platform name must not be empty"));
        }
        let _ = self.shared.invoices.try_get(invoice_id)?;
        let now = Utc::now();
        let task = PlatformTask {
            id: PlatformTaskId::new(),
            invoice_id,
            platform_name,
            platform_code: platform_code.into(),
            status: PlatformTaskStatus::Pending,
            sla_due_at,
            completed_at: None,
            evidence_reference: None,
            notes: None,
            created_by: actor.id,
            created_at: now,
        };
        if self.shared.platform_tasks.insert_new(task.clone()).is_err() {
            return Err(EngineError::validation("platform task id collision"));
        }
        self.shared
            .audit
            .record(PlatformTask::KIND, task.id, "-", task.status_label(), actor.id, now);
        Ok(task)
    }

    /// Start working a platform task
    ///
    /// # Errors
    /// `InvalidTransition`, `StaleState`.
    pub fn start_platform_task(&self, actor: Actor, id: PlatformTaskId) -> EngineResult<PlatformTask> {
        self.task_transition(actor, id, PlatformTaskStatus::InProgress, |_, _| {})
    }

    /// Record the platform's confirmation
    ///
    /// Requires an evidence reference or explicit notes.
    ///
    /// # Errors
    /// `Validation` without evidence or notes; `InvalidTransition`;
    /// `StaleState`.
    pub fn complete_platform_task(
        &self,
        actor: Actor,
        id: PlatformTaskId,
        evidence_reference: Option<String>,
        notes: Option<String>,
    ) -> EngineResult<PlatformTask> {
        let has_evidence = evidence_reference
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty());
        let has_notes = notes.as_deref().is_some_and(|n| !n.trim().is_empty());
        if !has_evidence && !has_notes {
            return Err(EngineError::validation(
                "completing a platform task needs an evidence reference or notes",
            ));
        }
        self.task_transition(actor, id, PlatformTaskStatus::Completed, move |task, now| {
            task.completed_at = Some(now);
            if has_evidence {
                task.evidence_reference = evidence_reference;
            }
            if has_notes {
                task.notes = notes;
            }
        })
    }

    /// Halt a platform task
    ///
    /// The notes must explain the blocker.
    ///
    /// # Errors
    /// `Validation` for empty notes; `InvalidTransition`; `StaleState`.
    pub fn block_platform_task(
        &self,
        actor: Actor,
        id: PlatformTaskId,
        notes: impl Into<String>,
    ) -> EngineResult<PlatformTask> {
        let notes = notes.into();
        if notes.trim().is_empty() {
            return Err(EngineError::validation(
                "blocking a platform task needs notes explaining the blocker",
            ));
        }
        self.task_transition(actor, id, PlatformTaskStatus::Blocked, move |task, _| {
            task.notes = Some(notes);
        })
    }

    /// Resume a blocked platform task
    ///
    /// # Errors
    /// `InvalidTransition`, `StaleState`.
    pub fn resume_platform_task(&self, actor: Actor, id: PlatformTaskId) -> EngineResult<PlatformTask> {
        self.task_transition(actor, id, PlatformTaskStatus::InProgress, |_, _| {})
    }

    /// Read a platform task
    ///
    /// # Errors
    /// `NotFound` for an unknown id.
    pub fn platform_task(&self, id: PlatformTaskId) -> EngineResult<PlatformTask> {
        self.shared.platform_tasks.try_get(id)
    }

    /// All platform tasks of an invoice
    #[must_use]
    pub fn platform_tasks_for(&self, invoice_id: InvoiceId) -> Vec<PlatformTask> {
        self.shared
            .platform_tasks
            .values()
            .into_iter()
            .filter(|t| t.invoice_id == invoice_id)
            .collect()
    }

    /// Platform tasks of an invoice whose SLA is breached at `now`
    #[must_use]
    pub fn breached_platform_tasks(
        &self,
        invoice_id: InvoiceId,
        now: DateTime<Utc>,
    ) -> Vec<PlatformTask> {
        self.platform_tasks_for(invoice_id)
            .into_iter()
            .filter(|t| t.is_sla_breached(now))
            .collect()
    }

    // ---- internals ----

    fn task_transition(
        &self,
        actor: Actor,
        id: PlatformTaskId,
        to: PlatformTaskStatus,
        mutate: impl FnOnce(&mut PlatformTask, DateTime<Utc>),
    ) -> EngineResult<PlatformTask> {
        if !actor.role.is_operator() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "advance platform task",
            });
        }
        let observed = self.shared.platform_tasks.try_get(id)?;
        if !observed.status.can_transition(to) {
            return Err(EngineError::InvalidTransition {
                entity: PlatformTask::KIND,
                id: id.to_string(),
                from: observed.status.to_string(),
                requested: to.to_string(),
            });
        }
        let now = Utc::now();
        self.shared.platform_tasks.update_with(id, |task| {
            if task.status != observed.status {
                return Err(EngineError::StaleState {
                    entity: PlatformTask::KIND,
                    id: id.to_string(),
                    expected: observed.status.to_string(),
                    found: task.status.to_string(),
                });
            }
            let from = task.status;
            task.status = to;
            mutate(task, now);
            self.shared
                .audit
                .record(PlatformTask::KIND, id, from.as_str(), to.as_str(), actor.id, now);
            Ok(task.clone())
        })
    }
}
