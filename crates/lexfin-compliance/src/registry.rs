//! Compliance registry
//!
//! Owns jobs, vendors, documents, and UTTAI requests, and produces the
//! point-in-time snapshots intake consumes. The registry is the only writer
//! of clearance fields; the engine reads them through [`ComplianceView`],
//! passed in as per-request context.

use crate::job::{Job, UttaiStatus};
use crate::uttai::{UttaiOutcome, UttaiRequest, UttaiRequestStatus};
use crate::vendor::{derive_status, ComplianceStatus, DocumentKind, Vendor, VendorDocument};
use chrono::{DateTime, Utc};
use lexfin_store::{AuditLog, Entity, EntityStore};
use lexfin_types::{
    Actor, DocumentId, EngineError, EnginePolicy, EngineResult, JobId, UttaiRequestId, VendorId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Clearance fields of one job, as read context for the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCompliance {
    /// Current clearance
    pub uttai_status: UttaiStatus,
    /// Tri-state obliged flag
    pub subject_obliged: Option<bool>,
}

/// Read-only compliance context supplied to every engine transition
///
/// Reference data is passed in per request, never fetched via hidden
/// global state.
pub trait ComplianceView: Send + Sync {
    /// Clearance fields for a job, if it exists
    fn job_compliance(&self, job: JobId) -> Option<JobCompliance>;

    /// Derived compliance status for a vendor, if it exists
    fn vendor_compliance(&self, vendor: VendorId) -> Option<ComplianceStatus>;
}

/// Point-in-time evidence of what was known when an item entered the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceSnapshot {
    /// Job clearance at capture time
    pub uttai_status: UttaiStatus,
    /// Vendor status at capture time (absent for official fees)
    pub vendor_compliance: Option<ComplianceStatus>,
    /// Capture time
    pub taken_at: DateTime<Utc>,
}

/// Fields for registering a job
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Internal job code
    pub job_code: String,
    /// Client code
    pub client_code: String,
    /// Client display name
    pub client_name: String,
}

/// Fields for registering a vendor
#[derive(Debug, Clone)]
pub struct NewVendor {
    /// Legal name
    pub name: String,
    /// Tax identifier
    pub tax_id: String,
    /// Country code
    pub country: String,
}

/// The compliance registry service
#[derive(Debug)]
pub struct ComplianceRegistry {
    jobs: EntityStore<Job>,
    vendors: EntityStore<Vendor>,
    documents: EntityStore<VendorDocument>,
    requests: EntityStore<UttaiRequest>,
    audit: Arc<AuditLog>,
    policy: EnginePolicy,
}

impl ComplianceRegistry {
    /// Create a registry writing to the given audit log
    #[must_use]
    pub fn new(policy: EnginePolicy, audit: Arc<AuditLog>) -> Self {
        Self {
            jobs: EntityStore::new(),
            vendors: EntityStore::new(),
            documents: EntityStore::new(),
            requests: EntityStore::new(),
            audit,
            policy,
        }
    }

    // ---- jobs ----

    /// Register a job
    ///
    /// New jobs start clear; clearance changes only through the UTTAI flow.
    ///
    /// # Errors
    /// Returns `Validation` if the job code is empty.
    pub fn register_job(&self, actor: Actor, new: NewJob) -> EngineResult<Job> {
        if new.job_code.trim().is_empty() {
            return Err(EngineError::validation("job code must not be empty"));
        }
        let now = Utc::now();
        let job = Job {
            id: JobId::new(),
            job_code: new.job_code,
            client_code: new.client_code,
            client_name: new.client_name,
            uttai_status: UttaiStatus::Clear,
            uttai_subject_obliged: None,
            created_by: actor.id,
            created_at: now,
        };
        if self.jobs.insert_new(job.clone()).is_err() {
            return Err(EngineError::validation("job id collision"));
        }
        self.audit
            .record(Job::KIND, job.id, "-", job.status_label(), actor.id, now);
        info!(target: "lexfin::compliance", job = %job.id, code = %job.job_code, "job registered");
        Ok(job)
    }

    /// Read a job
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown id.
    pub fn job(&self, id: JobId) -> EngineResult<Job> {
        self.jobs.try_get(id)
    }

    // ---- vendors & documents ----

    /// Register a vendor
    ///
    /// Starts non-compliant until documents are filed.
    ///
    /// # Errors
    /// Returns `Validation` if name or tax id is empty.
    pub fn register_vendor(&self, actor: Actor, new: NewVendor) -> EngineResult<Vendor> {
        if new.name.trim().is_empty() || new.tax_id.trim().is_empty() {
            return Err(EngineError::validation(
                "vendor name and tax id must not be empty",
            ));
        }
        let now = Utc::now();
        let vendor = Vendor {
            id: VendorId::new(),
            name: new.name,
            tax_id: new.tax_id,
            country: new.country,
            compliance_status: ComplianceStatus::NonCompliant,
            created_by: actor.id,
            created_at: now,
        };
        if self.vendors.insert_new(vendor.clone()).is_err() {
            return Err(EngineError::validation("vendor id collision"));
        }
        self.audit
            .record(Vendor::KIND, vendor.id, "-", vendor.status_label(), actor.id, now);
        Ok(vendor)
    }

    /// Read a vendor
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown id.
    pub fn vendor(&self, id: VendorId) -> EngineResult<Vendor> {
        self.vendors.try_get(id)
    }

    /// File a compliance document for a vendor and re-derive its status
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown vendor, `Validation` for an empty
    /// file reference.
    pub fn record_document(
        &self,
        actor: Actor,
        vendor_id: VendorId,
        kind: DocumentKind,
        reference: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> EngineResult<VendorDocument> {
        let reference = reference.into();
        if reference.trim().is_empty() {
            return Err(EngineError::validation("document reference must not be empty"));
        }
        // Existence check before the insert
        let _ = self.vendors.try_get(vendor_id)?;
        let now = Utc::now();
        let document = VendorDocument {
            id: DocumentId::new(),
            vendor_id,
            kind,
            reference,
            expires_at,
            uploaded_by: actor.id,
            uploaded_at: now,
        };
        if self.documents.insert_new(document.clone()).is_err() {
            return Err(EngineError::validation("document id collision"));
        }
        self.refresh_vendor_compliance(actor, vendor_id, now)?;
        Ok(document)
    }

    /// Re-derive one vendor's compliance status from its documents
    ///
    /// Called by the document-expiry sweep (a collaborator process) and
    /// after each filing. Writes an audit row only when the status changes.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown vendor.
    pub fn refresh_vendor_compliance(
        &self,
        actor: Actor,
        vendor_id: VendorId,
        now: DateTime<Utc>,
    ) -> EngineResult<ComplianceStatus> {
        let documents: Vec<VendorDocument> = self
            .documents
            .values()
            .into_iter()
            .filter(|d| d.vendor_id == vendor_id)
            .collect();
        let derived = derive_status(&documents, now, self.policy.expiring_window_days);

        self.vendors.update_with(vendor_id, |vendor| {
            let previous = vendor.compliance_status;
            if previous != derived {
                vendor.compliance_status = derived;
                self.audit.record(
                    Vendor::KIND,
                    vendor.id,
                    previous.as_str(),
                    derived.as_str(),
                    actor.id,
                    now,
                );
                debug!(
                    target: "lexfin::compliance",
                    vendor = %vendor.id,
                    from = previous.as_str(),
                    to = derived.as_str(),
                    "vendor compliance re-derived"
                );
            }
            Ok(derived)
        })
    }

    /// Re-derive every vendor's compliance status
    ///
    /// # Errors
    /// Propagates the first failure.
    pub fn refresh_all_vendors(&self, actor: Actor, now: DateTime<Utc>) -> EngineResult<()> {
        for vendor in self.vendors.values() {
            self.refresh_vendor_compliance(actor, vendor.id, now)?;
        }
        Ok(())
    }

    // ---- uttai ----

    /// Open a clearance review for a job
    ///
    /// Marks the job `pending_review` while the request is open.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown job.
    pub fn open_uttai_request(&self, actor: Actor, job_id: JobId) -> EngineResult<UttaiRequest> {
        let _ = self.jobs.try_get(job_id)?;
        let now = Utc::now();
        let request = UttaiRequest {
            id: UttaiRequestId::new(),
            job_id,
            status: UttaiRequestStatus::Pending,
            opened_by: actor.id,
            opened_at: now,
            resolved_by: None,
            resolved_at: None,
            outcome: None,
        };
        if self.requests.insert_new(request.clone()).is_err() {
            return Err(EngineError::validation("uttai request id collision"));
        }
        self.audit
            .record(UttaiRequest::KIND, request.id, "-", request.status_label(), actor.id, now);

        self.jobs.update_with(job_id, |job| {
            let previous = job.uttai_status;
            if previous != UttaiStatus::PendingReview {
                job.uttai_status = UttaiStatus::PendingReview;
                self.audit.record(
                    Job::KIND,
                    job.id,
                    previous.as_str(),
                    job.uttai_status.as_str(),
                    actor.id,
                    now,
                );
            }
            Ok(())
        })?;
        info!(target: "lexfin::compliance", request = %request.id, job = %job_id, "uttai review opened");
        Ok(request)
    }

    /// Pick a request up for review
    ///
    /// # Errors
    /// `NotFound` for an unknown request; `InvalidTransition` unless pending;
    /// `StaleState` on a concurrent move.
    pub fn begin_uttai_review(
        &self,
        actor: Actor,
        request_id: UttaiRequestId,
    ) -> EngineResult<UttaiRequest> {
        let observed = self.requests.try_get(request_id)?;
        if observed.status != UttaiRequestStatus::Pending {
            return Err(EngineError::InvalidTransition {
                entity: UttaiRequest::KIND,
                id: request_id.to_string(),
                from: observed.status.to_string(),
                requested: UttaiRequestStatus::InProgress.to_string(),
            });
        }
        let now = Utc::now();
        self.requests.update_with(request_id, |request| {
            if request.status != observed.status {
                return Err(EngineError::StaleState {
                    entity: UttaiRequest::KIND,
                    id: request_id.to_string(),
                    expected: observed.status.to_string(),
                    found: request.status.to_string(),
                });
            }
            request.status = UttaiRequestStatus::InProgress;
            self.audit.record(
                UttaiRequest::KIND,
                request.id,
                observed.status.as_str(),
                request.status.as_str(),
                actor.id,
                now,
            );
            Ok(request.clone())
        })
    }

    /// Resolve a request and write the job's clearance
    ///
    /// Resolver identity and time are stamped in the same atomic write that
    /// moves the request to `resolved`.
    ///
    /// # Errors
    /// `PermissionDenied` without approval authority; `InvalidTransition`
    /// unless in progress; `StaleState` on a concurrent move.
    pub fn resolve_uttai(
        &self,
        actor: Actor,
        request_id: UttaiRequestId,
        outcome: UttaiOutcome,
        subject_obliged: Option<bool>,
    ) -> EngineResult<UttaiRequest> {
        if !actor.role.can_approve() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "resolve uttai request",
            });
        }
        let observed = self.requests.try_get(request_id)?;
        if observed.status != UttaiRequestStatus::InProgress {
            return Err(EngineError::InvalidTransition {
                entity: UttaiRequest::KIND,
                id: request_id.to_string(),
                from: observed.status.to_string(),
                requested: UttaiRequestStatus::Resolved.to_string(),
            });
        }
        let now = Utc::now();
        let resolved = self.requests.update_with(request_id, |request| {
            if request.status != observed.status {
                return Err(EngineError::StaleState {
                    entity: UttaiRequest::KIND,
                    id: request_id.to_string(),
                    expected: observed.status.to_string(),
                    found: request.status.to_string(),
                });
            }
            request.status = UttaiRequestStatus::Resolved;
            request.resolved_by = Some(actor.id);
            request.resolved_at = Some(now);
            request.outcome = Some(outcome);
            self.audit.record(
                UttaiRequest::KIND,
                request.id,
                observed.status.as_str(),
                request.status.as_str(),
                actor.id,
                now,
            );
            Ok(request.clone())
        })?;

        self.jobs.update_with(resolved.job_id, |job| {
            let previous = job.uttai_status;
            job.uttai_status = match outcome {
                UttaiOutcome::Cleared => UttaiStatus::Clear,
                UttaiOutcome::Blocked => UttaiStatus::Blocked,
            };
            job.uttai_subject_obliged = subject_obliged;
            if previous != job.uttai_status {
                self.audit.record(
                    Job::KIND,
                    job.id,
                    previous.as_str(),
                    job.uttai_status.as_str(),
                    actor.id,
                    now,
                );
            }
            Ok(())
        })?;
        info!(
            target: "lexfin::compliance",
            request = %request_id,
            job = %resolved.job_id,
            outcome = ?outcome,
            "uttai review resolved"
        );
        Ok(resolved)
    }

    /// Read a request
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown id.
    pub fn uttai_request(&self, id: UttaiRequestId) -> EngineResult<UttaiRequest> {
        self.requests.try_get(id)
    }

    // ---- snapshots ----

    /// Capture the point-in-time snapshot intake stores on submission
    ///
    /// # Errors
    /// `NotFound` if the job (or given vendor) does not exist.
    pub fn snapshot(
        &self,
        job_id: JobId,
        vendor_id: Option<VendorId>,
    ) -> EngineResult<ComplianceSnapshot> {
        let job = self.jobs.try_get(job_id)?;
        let vendor_compliance = match vendor_id {
            Some(id) => Some(self.vendors.try_get(id)?.compliance_status),
            None => None,
        };
        Ok(ComplianceSnapshot {
            uttai_status: job.uttai_status,
            vendor_compliance,
            taken_at: Utc::now(),
        })
    }
}

impl ComplianceView for ComplianceRegistry {
    fn job_compliance(&self, job: JobId) -> Option<JobCompliance> {
        self.jobs.get(job).map(|j| JobCompliance {
            uttai_status: j.uttai_status,
            subject_obliged: j.uttai_subject_obliged,
        })
    }

    fn vendor_compliance(&self, vendor: VendorId) -> Option<ComplianceStatus> {
        self.vendors.get(vendor).map(|v| v.compliance_status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use lexfin_types::{ActorId, Role};

    fn operator() -> Actor {
        Actor::new(ActorId::new(), Role::BillingOperator)
    }

    fn partner() -> Actor {
        Actor::new(ActorId::new(), Role::Partner)
    }

    fn registry() -> ComplianceRegistry {
        ComplianceRegistry::new(EnginePolicy::default(), Arc::new(AuditLog::new()))
    }

    fn new_job() -> NewJob {
        NewJob {
            job_code: "J-1001".into(),
            client_code: "ACME".into(),
            client_name: "Acme Corp".into(),
        }
    }

    #[test]
    fn registered_jobs_start_clear() {
        let registry = registry();
        let job = registry.register_job(operator(), new_job()).unwrap();
        assert_eq!(job.uttai_status, UttaiStatus::Clear);
        assert_eq!(job.uttai_subject_obliged, None);
    }

    #[test]
    fn uttai_resolution_writes_the_job() {
        let registry = registry();
        let job = registry.register_job(operator(), new_job()).unwrap();
        let request = registry.open_uttai_request(operator(), job.id).unwrap();
        assert_eq!(
            registry.job(job.id).unwrap().uttai_status,
            UttaiStatus::PendingReview
        );

        registry.begin_uttai_review(operator(), request.id).unwrap();
        let resolver = partner();
        let resolved = registry
            .resolve_uttai(resolver, request.id, UttaiOutcome::Blocked, Some(true))
            .unwrap();
        assert_eq!(resolved.status, UttaiRequestStatus::Resolved);
        assert_eq!(resolved.resolved_by, Some(resolver.id));
        assert!(resolved.resolved_at.is_some());

        let job = registry.job(job.id).unwrap();
        assert_eq!(job.uttai_status, UttaiStatus::Blocked);
        assert_eq!(job.uttai_subject_obliged, Some(true));
    }

    #[test]
    fn resolution_requires_approval_authority() {
        let registry = registry();
        let job = registry.register_job(operator(), new_job()).unwrap();
        let request = registry.open_uttai_request(operator(), job.id).unwrap();
        registry.begin_uttai_review(operator(), request.id).unwrap();

        let err = registry
            .resolve_uttai(operator(), request.id, UttaiOutcome::Cleared, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::PermissionDenied { .. }));
    }

    #[test]
    fn resolution_cannot_skip_review() {
        let registry = registry();
        let job = registry.register_job(operator(), new_job()).unwrap();
        let request = registry.open_uttai_request(operator(), job.id).unwrap();

        let err = registry
            .resolve_uttai(partner(), request.id, UttaiOutcome::Cleared, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[test]
    fn filing_documents_flips_the_derived_status() {
        let registry = registry();
        let vendor = registry
            .register_vendor(
                operator(),
                NewVendor {
                    name: "Legal Translations SL".into(),
                    tax_id: "B-123".into(),
                    country: "ES".into(),
                },
            )
            .unwrap();
        assert_eq!(vendor.compliance_status, ComplianceStatus::NonCompliant);

        registry
            .record_document(
                operator(),
                vendor.id,
                DocumentKind::TaxCertificate,
                "file-1",
                Utc::now() + Duration::days(365),
            )
            .unwrap();
        assert_eq!(
            registry.vendor(vendor.id).unwrap().compliance_status,
            ComplianceStatus::Compliant
        );
    }

    #[test]
    fn snapshot_captures_both_dimensions() {
        let registry = registry();
        let job = registry.register_job(operator(), new_job()).unwrap();
        let vendor = registry
            .register_vendor(
                operator(),
                NewVendor {
                    name: "V".into(),
                    tax_id: "T".into(),
                    country: "ES".into(),
                },
            )
            .unwrap();

        let snapshot = registry.snapshot(job.id, Some(vendor.id)).unwrap();
        assert_eq!(snapshot.uttai_status, UttaiStatus::Clear);
        assert_eq!(snapshot.vendor_compliance, Some(ComplianceStatus::NonCompliant));

        let fee_snapshot = registry.snapshot(job.id, None).unwrap();
        assert_eq!(fee_snapshot.vendor_compliance, None);
    }
}
