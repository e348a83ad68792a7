//! Testing utilities for the Lexfin workspace
//!
//! A [`TestWorld`] wires an engine and a compliance registry to one audit
//! log, seeds a clear job and a compliant vendor, and offers helpers that
//! drive items through the common flows. Panicking on setup failure is fine
//! here; these helpers only run under test.

use chrono::{Duration, NaiveDate, Utc};
use lexfin_compliance::{
    ComplianceRegistry, DocumentKind, Job, NewJob, NewVendor, UttaiOutcome, Vendor,
};
use lexfin_engine::{
    BillingBatch, ClientInvoice, Engine, IntakeItem, IntakeKind, NewBatch, NewIntakeItem,
};
use lexfin_store::AuditLog;
use lexfin_types::{Actor, ActorId, Currency, EnginePolicy, Money, Role};
use rust_decimal::Decimal;
use std::sync::Arc;

/// A strictly-positive EUR amount from cents
///
/// # Panics
/// Panics on a non-positive amount.
#[must_use]
pub fn eur(cents: i64) -> Money {
    Money::new(Decimal::new(cents, 2), Currency::Eur).expect("test amount must be positive")
}

/// Install the test log subscriber, honoring `RUST_LOG`
///
/// Safe to call from every test; only the first call wins.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An engine, a registry, a shared audit log, and seeded reference data
#[derive(Debug)]
pub struct TestWorld {
    /// The engine under test
    pub engine: Engine,
    /// The compliance registry (also the engine's `ComplianceView`)
    pub registry: ComplianceRegistry,
    /// A billing operator
    pub operator: Actor,
    /// A second billing operator
    pub second_operator: Actor,
    /// A partner with approval authority
    pub partner: Actor,
    /// A second partner
    pub second_partner: Actor,
    /// A seeded job, clear by default
    pub job: Job,
    /// A seeded vendor with a valid tax certificate
    pub vendor: Vendor,
}

impl TestWorld {
    /// A world with the default policy
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(EnginePolicy::default())
    }

    /// A world with a custom policy
    ///
    /// # Panics
    /// Panics if seeding the reference data fails.
    #[must_use]
    pub fn with_policy(policy: EnginePolicy) -> Self {
        init_logging();
        let audit = Arc::new(AuditLog::new());
        let registry = ComplianceRegistry::new(policy.clone(), Arc::clone(&audit));
        let engine = Engine::with_audit(policy, audit);

        let operator = Actor::new(ActorId::new(), Role::BillingOperator);
        let second_operator = Actor::new(ActorId::new(), Role::BillingOperator);
        let partner = Actor::new(ActorId::new(), Role::Partner);
        let second_partner = Actor::new(ActorId::new(), Role::Partner);

        let job = registry
            .register_job(
                operator,
                NewJob {
                    job_code: "J-1001".into(),
                    client_code: "ACME".into(),
                    client_name: "Acme Corp".into(),
                },
            )
            .expect("seed job");
        let vendor = registry
            .register_vendor(
                operator,
                NewVendor {
                    name: "Legal Translations SL".into(),
                    tax_id: "B-46112233".into(),
                    country: "ES".into(),
                },
            )
            .expect("seed vendor");
        registry
            .record_document(
                operator,
                vendor.id,
                DocumentKind::TaxCertificate,
                "filestore://tax-cert-1",
                Utc::now() + Duration::days(365),
            )
            .expect("seed vendor document");

        Self {
            engine,
            registry,
            operator,
            second_operator,
            partner,
            second_partner,
            job,
            vendor,
        }
    }

    /// Resolve a UTTAI review for the seeded job
    ///
    /// # Panics
    /// Panics if the review flow fails.
    pub fn resolve_uttai(&self, outcome: UttaiOutcome, subject_obliged: Option<bool>) {
        let request = self
            .registry
            .open_uttai_request(self.operator, self.job.id)
            .expect("open uttai request");
        self.registry
            .begin_uttai_review(self.operator, request.id)
            .expect("begin uttai review");
        self.registry
            .resolve_uttai(self.partner, request.id, outcome, subject_obliged)
            .expect("resolve uttai review");
    }

    /// Block the seeded job
    pub fn block_job(&self) {
        self.resolve_uttai(UttaiOutcome::Blocked, None);
    }

    /// A drafted vendor-invoice item on the seeded job
    ///
    /// # Panics
    /// Panics if drafting fails.
    #[must_use]
    pub fn drafted_item(&self, invoice_number: &str, cents: i64) -> IntakeItem {
        self.engine
            .intake()
            .create_draft(
                self.operator,
                NewIntakeItem {
                    job_id: self.job.id,
                    kind: IntakeKind::VendorInvoice {
                        vendor_id: self.vendor.id,
                    },
                    invoice_number: invoice_number.into(),
                    amount: eur(cents),
                    concept: "translation of company deeds".into(),
                },
            )
            .expect("draft item")
    }

    /// An item driven to `posted` with the given external reference
    ///
    /// # Panics
    /// Panics if any step of the flow fails.
    #[must_use]
    pub fn posted_item(&self, invoice_number: &str, cents: i64, reference: &str) -> IntakeItem {
        let item = self.drafted_item(invoice_number, cents);
        self.engine
            .intake()
            .submit(self.operator, item.id, &self.registry)
            .expect("submit item");
        self.engine
            .intake()
            .approve(self.partner, item.id, &self.registry)
            .expect("approve item");
        self.engine
            .posting()
            .post(self.operator, item.id, reference, &self.registry)
            .expect("post item");
        self.engine.intake().item(item.id).expect("read item")
    }

    /// A batch of posted items, every member emitted, advanced to
    /// `ready_for_sap`
    ///
    /// # Panics
    /// Panics if any step of the flow fails.
    #[must_use]
    pub fn ready_batch(&self, items: &[IntakeItem]) -> BillingBatch {
        let batch = self
            .engine
            .billing()
            .create_batch(
                self.operator,
                NewBatch {
                    job_id: self.job.id,
                    item_ids: items.iter().map(|i| i.id).collect(),
                    via_platform: false,
                },
            )
            .expect("create batch");
        for pairing in self.engine.billing().items_of(batch.id) {
            self.engine
                .billing()
                .decide(self.operator, pairing.id, lexfin_engine::Decision::Emit)
                .expect("decide emit");
        }
        self.engine
            .billing()
            .advance(self.partner, batch.id, &self.registry)
            .expect("advance batch")
    }

    /// An issued invoice derived from a fresh posted item
    ///
    /// # Panics
    /// Panics if any step of the flow fails.
    #[must_use]
    pub fn issued_invoice(&self, invoice_number: &str, reference: &str) -> ClientInvoice {
        let item = self.posted_item(invoice_number, 150_000, reference);
        let batch = self.ready_batch(std::slice::from_ref(&item));
        let invoice = self
            .engine
            .invoicing()
            .create_from_batch(self.operator, batch.id)
            .expect("derive invoice");
        self.engine
            .invoicing()
            .request_approval(self.operator, invoice.id)
            .expect("request approval");
        self.engine
            .invoicing()
            .approve(self.partner, invoice.id)
            .expect("approve invoice");
        self.engine
            .invoicing()
            .issue(
                self.operator,
                invoice.id,
                format!("F-{invoice_number}"),
                NaiveDate::from_ymd_opt(2024, 6, 30).expect("valid date"),
                &self.registry,
            )
            .expect("issue invoice")
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}
