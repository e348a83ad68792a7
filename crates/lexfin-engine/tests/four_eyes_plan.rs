//! Functional tests for separation-of-duties enforcement.
//!
//! Collection claims always require an approver distinct from the creator,
//! enforced inside the entity's own mutation so every write path is equally
//! blocked. Batch approval applies the same rule conditionally, governed by
//! the configurable `FourEyesRule` policy.

use lexfin_compliance::UttaiOutcome;
use lexfin_engine::{ClaimState, Decision, NewBatch};
use lexfin_test_utils::TestWorld;
use lexfin_types::{Actor, ActorId, EngineError, EnginePolicy, FourEyesRule, Role};

/// Tenet: the claim creator cannot approve their own claim; a different
/// approver succeeds - the reference scenario.
#[test]
fn claim_approval_requires_a_second_pair_of_eyes() {
    let world = TestWorld::new();
    let invoice = world.issued_invoice("VND-1", "SAP-001");

    // Created by a partner so the creator also holds approval authority:
    // the guard, not the role check, must do the blocking
    let claim = world
        .engine
        .claims()
        .create(world.partner, invoice.id, "45 days overdue")
        .unwrap();

    let err = world
        .engine
        .claims()
        .approve(world.partner, claim.id())
        .unwrap_err();
    assert!(matches!(err, EngineError::SeparationOfDuties { .. }));
    // The failed write persisted nothing
    let unchanged = world.engine.claims().claim(claim.id()).unwrap();
    assert_eq!(unchanged.status(), ClaimState::PendingApproval);
    assert!(unchanged.approved_by().is_none());

    let approved = world
        .engine
        .claims()
        .approve(world.second_partner, claim.id())
        .unwrap();
    assert_eq!(approved.status(), ClaimState::Approved);
    assert_eq!(approved.approved_by(), Some(world.second_partner.id));
}

/// Tenet: rejection carries the same guard and requires a reason before
/// anything is persisted.
#[test]
fn claim_rejection_is_guarded_and_needs_a_reason() {
    let world = TestWorld::new();
    let invoice = world.issued_invoice("VND-2", "SAP-002");
    let claim = world
        .engine
        .claims()
        .create(world.partner, invoice.id, "60 days overdue")
        .unwrap();

    let err = world
        .engine
        .claims()
        .reject(world.partner, claim.id(), "duplicate claim")
        .unwrap_err();
    assert!(matches!(err, EngineError::SeparationOfDuties { .. }));

    let err = world
        .engine
        .claims()
        .reject(world.second_partner, claim.id(), "   ")
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let rejected = world
        .engine
        .claims()
        .reject(world.second_partner, claim.id(), "duplicate claim")
        .unwrap();
    assert_eq!(rejected.status(), ClaimState::Rejected);
    assert_eq!(rejected.rejection_reason(), Some("duplicate claim"));
}

/// Tenet: only approval is separation-gated; the creator may send the
/// approved claim, but never without recipients.
#[test]
fn the_creator_sends_but_only_with_recipients() {
    let world = TestWorld::new();
    let invoice = world.issued_invoice("VND-3", "SAP-003");
    let claim = world
        .engine
        .claims()
        .create(world.operator, invoice.id, "90 days overdue")
        .unwrap();
    world
        .engine
        .claims()
        .approve(world.partner, claim.id())
        .unwrap();

    let err = world
        .engine
        .claims()
        .send(world.operator, claim.id(), vec![])
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let sent = world
        .engine
        .claims()
        .send(
            world.operator,
            claim.id(),
            vec!["accounts@acme.example".into()],
        )
        .unwrap();
    assert_eq!(sent.status(), ClaimState::Sent);
    assert_eq!(sent.sent_by(), Some(world.operator.id));
    assert_eq!(sent.recipients().len(), 1);
}

/// Tenet: a billing operator without approval authority is refused before
/// the guard even runs.
#[test]
fn claim_approval_is_role_gated_first() {
    let world = TestWorld::new();
    let invoice = world.issued_invoice("VND-4", "SAP-004");
    let claim = world
        .engine
        .claims()
        .create(world.operator, invoice.id, "30 days overdue")
        .unwrap();

    let err = world
        .engine
        .claims()
        .approve(world.second_operator, claim.id())
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::PermissionDenied {
            role: Role::BillingOperator,
            ..
        }
    ));
}

fn partner_creates_batch(world: &TestWorld, creator: Actor) -> lexfin_engine::BillingBatch {
    let item = world.posted_item("VND-B", 70_000, "SAP-B");
    let batch = world
        .engine
        .billing()
        .create_batch(
            creator,
            NewBatch {
                job_id: world.job.id,
                item_ids: vec![item.id],
                via_platform: false,
            },
        )
        .unwrap();
    for pairing in world.engine.billing().items_of(batch.id) {
        world
            .engine
            .billing()
            .decide(creator, pairing.id, Decision::Emit)
            .unwrap();
    }
    batch
}

/// Tenet: under the default policy the batch gate applies exactly when the
/// job's UTTAI subject is obliged.
#[test]
fn batch_four_eyes_follows_the_subject_obliged_flag() {
    let world = TestWorld::new();
    world.resolve_uttai(UttaiOutcome::Cleared, Some(true));

    let batch = partner_creates_batch(&world, world.partner);
    let err = world
        .engine
        .billing()
        .advance(world.partner, batch.id, &world.registry)
        .unwrap_err();
    assert!(matches!(err, EngineError::SeparationOfDuties { .. }));

    world
        .engine
        .billing()
        .advance(world.second_partner, batch.id, &world.registry)
        .unwrap();
}

/// Tenet: with `FourEyesRule::Never` the creator approves their own batch;
/// with `Always` the gate applies even on an unresolved obliged flag.
#[test]
fn batch_four_eyes_is_policy_configurable() {
    let lax = TestWorld::with_policy(
        EnginePolicy::default().with_batch_four_eyes(FourEyesRule::Never),
    );
    lax.resolve_uttai(UttaiOutcome::Cleared, Some(true));
    let batch = partner_creates_batch(&lax, lax.partner);
    lax.engine
        .billing()
        .advance(lax.partner, batch.id, &lax.registry)
        .unwrap();

    let strict = TestWorld::with_policy(
        EnginePolicy::default().with_batch_four_eyes(FourEyesRule::Always),
    );
    // Obliged flag never resolved: Always still applies the gate
    let batch = partner_creates_batch(&strict, strict.partner);
    let err = strict
        .engine
        .billing()
        .advance(strict.partner, batch.id, &strict.registry)
        .unwrap_err();
    assert!(matches!(err, EngineError::SeparationOfDuties { .. }));
}

/// Tenet: a claim persisted in `approved` or `sent` always satisfies the
/// invariant `approved_by != created_by`.
#[test]
fn persisted_claims_never_violate_the_invariant() {
    let world = TestWorld::new();
    let invoice = world.issued_invoice("VND-5", "SAP-005");

    for n in 0..5 {
        let claim = world
            .engine
            .claims()
            .create(world.operator, invoice.id, format!("cycle {n}"))
            .unwrap();
        // One self-approval attempt, then a legitimate one
        let _ = world.engine.claims().approve(world.partner, claim.id());
        let _ = world
            .engine
            .claims()
            .approve(world.second_partner, claim.id());
        let _ = world.engine.claims().send(
            world.operator,
            claim.id(),
            vec!["accounts@acme.example".into()],
        );
    }

    for claim in world.engine.claims().claims_for(invoice.id) {
        if matches!(claim.status(), ClaimState::Approved | ClaimState::Sent) {
            let approver = claim.approved_by().expect("approved claims carry an approver");
            assert_ne!(approver, claim.created_by());
        }
        if claim.status() == ClaimState::Sent {
            assert!(claim.sent_at().is_some());
            assert!(!claim.recipients().is_empty());
        }
    }
}
