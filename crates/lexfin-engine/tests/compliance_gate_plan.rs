//! Functional tests for the UTTAI compliance gate.
//!
//! Once an item is in the ledger, a blocked job halts every forward
//! transition with `ComplianceBlocked`; only rejection and archiving stay
//! open so reviewers can close out bad items. Resolving the block reopens
//! the pipeline.

use lexfin_compliance::UttaiOutcome;
use lexfin_engine::IntakeState;
use lexfin_test_utils::TestWorld;
use lexfin_types::EngineError;

/// Tenet: approving an item on a blocked job fails `ComplianceBlocked`,
/// matching the reference scenario.
#[test]
fn approve_fails_compliance_blocked_on_a_blocked_job() {
    let world = TestWorld::new();
    let item = world.drafted_item("VND-1", 150_000);
    world
        .engine
        .intake()
        .submit(world.operator, item.id, &world.registry)
        .unwrap();

    world.block_job();

    let err = world
        .engine
        .intake()
        .approve(world.partner, item.id, &world.registry)
        .unwrap_err();
    assert!(matches!(err, EngineError::ComplianceBlocked { job } if job == world.job.id));
    assert_eq!(
        world.engine.intake().item(item.id).unwrap().status,
        IntakeState::Submitted
    );
}

/// Tenet: rejection and archiving stay open while the job is blocked.
#[test]
fn reject_and_archive_bypass_the_gate() {
    let world = TestWorld::new();
    let item = world.drafted_item("VND-2", 80_000);
    world
        .engine
        .intake()
        .submit(world.operator, item.id, &world.registry)
        .unwrap();

    world.block_job();

    world
        .engine
        .intake()
        .reject(world.partner, item.id, "job failed uttai review")
        .unwrap();
    let archived = world.engine.intake().archive(world.operator, item.id).unwrap();
    assert_eq!(archived.status, IntakeState::Archived);
}

/// Tenet: the posting bridge is gated too; posting an approved item on a
/// blocked job fails before anything is written.
#[test]
fn posting_is_blocked_while_the_job_is_blocked() {
    let world = TestWorld::new();
    let item = world.drafted_item("VND-3", 60_000);
    world
        .engine
        .intake()
        .submit(world.operator, item.id, &world.registry)
        .unwrap();
    world
        .engine
        .intake()
        .approve(world.partner, item.id, &world.registry)
        .unwrap();

    world.block_job();

    let err = world
        .engine
        .posting()
        .post(world.operator, item.id, "SAP-010", &world.registry)
        .unwrap_err();
    assert!(matches!(err, EngineError::ComplianceBlocked { .. }));
    // The gate ran before the 1:1 claim: no posting row exists
    assert!(world.engine.posting().posting_for(item.id).is_none());
    assert_eq!(
        world.engine.intake().item(item.id).unwrap().status,
        IntakeState::Approved
    );
}

/// Tenet: clearing the block reopens the pipeline where it stopped.
#[test]
fn clearing_the_block_reopens_the_pipeline() {
    let world = TestWorld::new();
    let item = world.drafted_item("VND-4", 40_000);
    world
        .engine
        .intake()
        .submit(world.operator, item.id, &world.registry)
        .unwrap();

    world.block_job();
    assert!(world
        .engine
        .intake()
        .approve(world.partner, item.id, &world.registry)
        .is_err());

    world.resolve_uttai(UttaiOutcome::Cleared, Some(false));
    let approved = world
        .engine
        .intake()
        .approve(world.partner, item.id, &world.registry)
        .unwrap();
    assert_eq!(approved.status, IntakeState::Approved);
}

/// Tenet: resubmission after `needs_info` keeps the item's identity, bumps
/// the revision suffix, and respects the policy ceiling.
#[test]
fn resubmission_bumps_the_revision_suffix() {
    let world = TestWorld::new();
    let item = world.drafted_item("VND-5", 30_000);
    world
        .engine
        .intake()
        .submit(world.operator, item.id, &world.registry)
        .unwrap();
    world
        .engine
        .intake()
        .request_info(world.partner, item.id, "missing cost breakdown", &world.registry)
        .unwrap();

    let resubmitted = world
        .engine
        .intake()
        .submit(world.operator, item.id, &world.registry)
        .unwrap();
    assert_eq!(resubmitted.id, item.id);
    assert_eq!(resubmitted.revision, 1);
    assert_eq!(resubmitted.display_invoice_number(), "VND-5-R1");
}

/// Tenet: a second rejection of a resubmitted lineage archives instead of
/// looping.
#[test]
fn second_rejection_archives_the_lineage() {
    let world = TestWorld::new();
    let item = world.drafted_item("VND-6", 30_000);
    world
        .engine
        .intake()
        .submit(world.operator, item.id, &world.registry)
        .unwrap();
    world
        .engine
        .intake()
        .request_info(world.partner, item.id, "wrong vendor reference", &world.registry)
        .unwrap();
    world
        .engine
        .intake()
        .submit(world.operator, item.id, &world.registry)
        .unwrap();

    let rejected = world
        .engine
        .intake()
        .reject(world.partner, item.id, "still the wrong vendor")
        .unwrap();
    assert_eq!(rejected.status, IntakeState::Archived);
}

/// Tenet: the resubmission ceiling is a policy parameter, not a hard-coded
/// constant.
#[test]
fn resubmission_ceiling_comes_from_policy() {
    let world = TestWorld::with_policy(
        lexfin_types::EnginePolicy::default().with_resubmission_limit(Some(1)),
    );
    let item = world.drafted_item("VND-7", 30_000);
    world
        .engine
        .intake()
        .submit(world.operator, item.id, &world.registry)
        .unwrap();
    world
        .engine
        .intake()
        .request_info(world.partner, item.id, "first pass", &world.registry)
        .unwrap();
    world
        .engine
        .intake()
        .submit(world.operator, item.id, &world.registry)
        .unwrap();
    world
        .engine
        .intake()
        .request_info(world.partner, item.id, "second pass", &world.registry)
        .unwrap();

    let err = world
        .engine
        .intake()
        .submit(world.operator, item.id, &world.registry)
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}
