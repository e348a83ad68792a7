//! Posting bridge - external accounting acknowledgments
//!
//! One-way and append-only: an approved item is posted exactly once, and
//! corrections are new compensating intake items, never reversals. The 1:1
//! pairing is enforced by keying postings on the item id, so a duplicate
//! insert is rejected atomically.

use crate::intake::ledger::IntakeLedger;
use crate::intake::{IntakeItem, IntakeState};
use crate::shared::Shared;
use chrono::{DateTime, Utc};
use lexfin_compliance::{ComplianceView, UttaiStatus};
use lexfin_store::Entity;
use lexfin_types::{Actor, ActorId, EngineError, EngineResult, IntakeItemId, PostingId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// The external accounting system's acknowledgment for one item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SapPosting {
    /// Identifier
    pub id: PostingId,
    /// The posted item (exactly one posting per item)
    pub item_id: IntakeItemId,
    /// External reference string
    pub external_reference: String,
    /// Poster identity
    pub posted_by: ActorId,
    /// Posting time
    pub posted_at: DateTime<Utc>,
}

impl Entity for SapPosting {
    // Keyed by the item, which is what makes the pairing 1:1
    type Id = IntakeItemId;
    const KIND: &'static str = "sap_posting";

    fn id(&self) -> IntakeItemId {
        self.item_id
    }

    fn status_label(&self) -> &'static str {
        "posted"
    }
}

/// The posting bridge service
#[derive(Debug, Clone)]
pub struct PostingBridge {
    shared: Arc<Shared>,
    ledger: IntakeLedger,
}

impl PostingBridge {
    pub(crate) fn new(shared: Arc<Shared>, ledger: IntakeLedger) -> Self {
        Self { shared, ledger }
    }

    /// Record the external acknowledgment for an approved item
    ///
    /// Requires the item in `approved` or `sent_to_accounting`; walks it to
    /// `posted` without skipping a state. A second call for the same item
    /// fails `AlreadyPosted` - an idempotent read, not an idempotent write,
    /// so callers retrying network failures must check
    /// [`PostingBridge::posting_for`] first.
    ///
    /// # Errors
    /// `Validation` (empty reference), `InvalidTransition`,
    /// `ComplianceBlocked`, `AlreadyPosted`, `StaleState`.
    pub fn post(
        &self,
        actor: Actor,
        item_id: IntakeItemId,
        external_reference: impl Into<String>,
        ctx: &dyn ComplianceView,
    ) -> EngineResult<SapPosting> {
        let external_reference = external_reference.into();
        if !actor.role.is_operator() {
            return Err(EngineError::PermissionDenied {
                role: actor.role,
                action: "post intake item",
            });
        }
        if external_reference.trim().is_empty() {
            return Err(EngineError::validation("external reference must not be empty"));
        }
        let observed = self.shared.items.try_get(item_id)?;
        // A duplicate surfaces as the conflict, not as a transition error
        if let Some(existing) = self.shared.postings.get(item_id) {
            return Err(EngineError::AlreadyPosted {
                item: item_id,
                reference: existing.external_reference,
            });
        }
        if !matches!(
            observed.status,
            IntakeState::Approved | IntakeState::SentToAccounting
        ) {
            return Err(EngineError::InvalidTransition {
                entity: IntakeItem::KIND,
                id: item_id.to_string(),
                from: observed.status.to_string(),
                requested: IntakeState::Posted.to_string(),
            });
        }
        // Gate before the 1:1 claim so a blocked job leaves no posting row
        let job = ctx
            .job_compliance(observed.job_id)
            .ok_or_else(|| EngineError::not_found("job", observed.job_id))?;
        if job.uttai_status == UttaiStatus::Blocked {
            return Err(EngineError::ComplianceBlocked {
                job: observed.job_id,
            });
        }

        let now = Utc::now();
        let posting = SapPosting {
            id: PostingId::new(),
            item_id,
            external_reference,
            posted_by: actor.id,
            posted_at: now,
        };
        // The insert is the atomic claim on the 1:1 pairing
        if let Err(existing) = self.shared.postings.insert_new(posting.clone()) {
            return Err(EngineError::AlreadyPosted {
                item: item_id,
                reference: existing.external_reference,
            });
        }
        self.shared
            .audit
            .record(SapPosting::KIND, item_id, "-", "posted", actor.id, now);

        // Walk the item forward; both marks are idempotent under concurrency
        if observed.status == IntakeState::Approved {
            self.ledger.mark_sent_to_accounting(actor, item_id, ctx)?;
        }
        self.ledger.mark_posted(actor, item_id, ctx)?;
        info!(
            target: "lexfin::posting",
            item = %item_id,
            reference = %posting.external_reference,
            "item posted to accounting"
        );
        Ok(posting)
    }

    /// The existing posting for an item, if any
    ///
    /// The idempotent read callers use before retrying `post`.
    #[must_use]
    pub fn posting_for(&self, item_id: IntakeItemId) -> Option<SapPosting> {
        self.shared.postings.get(item_id)
    }
}
