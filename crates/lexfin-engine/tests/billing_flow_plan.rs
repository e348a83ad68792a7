//! Functional tests for the end-to-end billing flow.
//!
//! These tests exercise the full pipeline described in the intake, posting,
//! billing, invoice, and dispatch components:
//! - A vendor invoice travels draft -> submitted -> approved -> posted ->
//!   batched -> invoiced -> issued -> delivered, finishing `billed`.
//! - Batch totals are a frozen snapshot of creation time.
//! - Closing an invoice requires delivery evidence.
//! - The audit history replays exactly the machines' edges.

use lexfin_engine::{
    BatchState, DeliveryKind, IntakeState, InvoiceState, NewBatch,
};
use lexfin_store::Entity;
use lexfin_test_utils::TestWorld;
use lexfin_types::EngineError;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;

/// Tenet: the reference scenario runs end to end and both terminal states
/// land where the pipeline promises: item `billed`, invoice `delivered`.
#[test]
fn vendor_invoice_reaches_billed_and_invoice_delivered() {
    let world = TestWorld::new();

    let item = world.posted_item("VND-1", 150_000, "SAP-001");
    assert_eq!(item.status, IntakeState::Posted);

    let batch = world.ready_batch(std::slice::from_ref(&item));
    assert_eq!(batch.status, BatchState::ReadyForSap);

    let invoice = world
        .engine
        .invoicing()
        .create_from_batch(world.operator, batch.id)
        .unwrap();
    assert_eq!(invoice.status, InvoiceState::Draft);
    assert!(invoice.sap_invoice_number.is_none());

    world
        .engine
        .invoicing()
        .request_approval(world.operator, invoice.id)
        .unwrap();
    world
        .engine
        .invoicing()
        .approve(world.partner, invoice.id)
        .unwrap();
    let issued = world
        .engine
        .invoicing()
        .issue(
            world.operator,
            invoice.id,
            "F-001",
            chrono::NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
            &world.registry,
        )
        .unwrap();
    assert_eq!(issued.status, InvoiceState::Issued);
    assert_eq!(issued.sap_invoice_number.as_deref(), Some("F-001"));

    // Issuing billed the emitted item and synchronized the batch
    assert_eq!(
        world.engine.intake().item(item.id).unwrap().status,
        IntakeState::Billed
    );
    assert_eq!(
        world.engine.billing().batch(batch.id).unwrap().status,
        BatchState::Issued
    );

    let delivery = world
        .engine
        .dispatch()
        .create_delivery(
            world.operator,
            invoice.id,
            DeliveryKind::Email,
            vec!["billing@acme.example".into()],
        )
        .unwrap();
    world.engine.dispatch().send(world.operator, delivery.id).unwrap();

    let delivered = world
        .engine
        .invoicing()
        .mark_delivered(world.operator, invoice.id)
        .unwrap();
    assert_eq!(delivered.status, InvoiceState::Delivered);
    assert_eq!(
        world.engine.billing().batch(batch.id).unwrap().status,
        BatchState::Delivered
    );
}

/// Tenet: submission captures both compliance snapshots as point-in-time
/// evidence, and they survive later compliance changes untouched.
#[test]
fn submission_snapshots_are_immutable_evidence() {
    let world = TestWorld::new();
    let item = world.drafted_item("VND-2", 50_000);
    assert!(item.uttai_status_snapshot.is_none());

    let submitted = world
        .engine
        .intake()
        .submit(world.operator, item.id, &world.registry)
        .unwrap();
    assert_eq!(
        submitted.uttai_status_snapshot,
        Some(lexfin_compliance::UttaiStatus::Clear)
    );
    assert_eq!(
        submitted.vendor_compliance_snapshot,
        Some(lexfin_compliance::ComplianceStatus::Compliant)
    );

    // Later blocking does not rewrite the captured evidence
    world.block_job();
    let after = world.engine.intake().item(item.id).unwrap();
    assert_eq!(
        after.uttai_status_snapshot,
        Some(lexfin_compliance::UttaiStatus::Clear)
    );
}

/// Tenet: queuing a submitted item for an approver is an explicit,
/// idempotent step, and approval works from either side of it.
#[test]
fn queueing_for_approval_is_idempotent() {
    let world = TestWorld::new();
    let item = world.drafted_item("VND-Q", 10_000);
    world
        .engine
        .intake()
        .submit(world.operator, item.id, &world.registry)
        .unwrap();

    let queued = world
        .engine
        .intake()
        .queue_for_approval(world.operator, item.id, &world.registry)
        .unwrap();
    assert_eq!(queued.status, IntakeState::PendingApproval);

    // Re-queuing returns the record unchanged
    let again = world
        .engine
        .intake()
        .queue_for_approval(world.operator, item.id, &world.registry)
        .unwrap();
    assert_eq!(again.status, IntakeState::PendingApproval);

    let approved = world
        .engine
        .intake()
        .approve(world.partner, item.id, &world.registry)
        .unwrap();
    assert_eq!(approved.status, IntakeState::Approved);
}

/// Tenet: batch totals are computed once at creation and recorded as a
/// frozen snapshot equal to the member sum.
#[test]
fn batch_totals_are_a_frozen_creation_time_snapshot() {
    let world = TestWorld::new();
    let a = world.posted_item("VND-3", 100_000, "SAP-003");
    let b = world.posted_item("VND-4", 25_050, "SAP-004");

    let batch = world
        .engine
        .billing()
        .create_batch(
            world.operator,
            NewBatch {
                job_id: world.job.id,
                item_ids: vec![a.id, b.id],
                via_platform: false,
            },
        )
        .unwrap();
    assert_eq!(batch.total_amount, Decimal::new(125_050, 2));
    assert_eq!(batch.total_fees, Decimal::ZERO);

    // Drive the flow to the end; the recorded totals never move
    for pairing in world.engine.billing().items_of(batch.id) {
        world
            .engine
            .billing()
            .decide(world.operator, pairing.id, lexfin_engine::Decision::Emit)
            .unwrap();
    }
    world
        .engine
        .billing()
        .advance(world.partner, batch.id, &world.registry)
        .unwrap();
    let final_batch = world.engine.billing().batch(batch.id).unwrap();
    assert_eq!(final_batch.total_amount, Decimal::new(125_050, 2));
}

/// Tenet: an invoice cannot be closed on an empty delivery record.
#[test]
fn mark_delivered_requires_delivery_evidence() {
    let world = TestWorld::new();
    let invoice = world.issued_invoice("VND-5", "SAP-005");

    let err = world
        .engine
        .invoicing()
        .mark_delivered(world.operator, invoice.id)
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    // A pending (unsent) delivery is still not evidence
    let delivery = world
        .engine
        .dispatch()
        .create_delivery(
            world.operator,
            invoice.id,
            DeliveryKind::Email,
            vec!["billing@acme.example".into()],
        )
        .unwrap();
    let err = world
        .engine
        .invoicing()
        .mark_delivered(world.operator, invoice.id)
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    world.engine.dispatch().send(world.operator, delivery.id).unwrap();
    world
        .engine
        .invoicing()
        .mark_delivered(world.operator, invoice.id)
        .unwrap();
}

/// Tenet: the audit chain verifies end to end after a full flow, and every
/// recorded intake transition is an edge of the intake machine.
#[test]
fn audit_history_replays_the_machine() {
    let world = TestWorld::new();
    let invoice = world.issued_invoice("VND-6", "SAP-006");
    let delivery = world
        .engine
        .dispatch()
        .create_delivery(
            world.operator,
            invoice.id,
            DeliveryKind::Email,
            vec!["billing@acme.example".into()],
        )
        .unwrap();
    world.engine.dispatch().send(world.operator, delivery.id).unwrap();
    world
        .engine
        .invoicing()
        .mark_delivered(world.operator, invoice.id)
        .unwrap();

    world.engine.audit().verify_integrity().unwrap();

    // The per-entity history replays the invoice's exact path
    let history = world
        .engine
        .history_for(lexfin_engine::ClientInvoice::KIND, &invoice.id.to_string());
    let path: Vec<&str> = history.iter().map(|r| r.to_state.as_str()).collect();
    assert_eq!(
        path,
        [
            "invoice_draft",
            "pending_partner_approval",
            "ready_for_sap",
            "issued",
            "delivered",
        ]
    );

    let states: &[IntakeState] = &[
        IntakeState::Draft,
        IntakeState::Submitted,
        IntakeState::PendingApproval,
        IntakeState::Approved,
        IntakeState::Rejected,
        IntakeState::NeedsInfo,
        IntakeState::SentToAccounting,
        IntakeState::Posted,
        IntakeState::ReadyToBill,
        IntakeState::Billed,
        IntakeState::Archived,
    ];
    let parse = |label: &str| states.iter().copied().find(|s| s.as_str() == label);

    let records = world.engine.audit().records();
    for record in records
        .iter()
        .filter(|r| r.entity_kind == lexfin_engine::IntakeItem::KIND)
    {
        let to = parse(&record.to_state).expect("state outside the enumeration");
        if record.from_state == "-" {
            assert_eq!(to, IntakeState::Draft, "items enter the ledger as drafts");
        } else {
            let from = parse(&record.from_state).expect("state outside the enumeration");
            assert!(
                from.can_transition(to),
                "audited transition {from} -> {to} is not a machine edge"
            );
        }
    }
}
