//! Jobs (client matters) and their UTTAI clearance state

use chrono::{DateTime, Utc};
use lexfin_store::Entity;
use lexfin_types::{ActorId, JobId};
use serde::{Deserialize, Serialize};

/// UTTAI (beneficial-owner/source-of-funds) clearance of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UttaiStatus {
    /// Financial items may proceed
    Clear,
    /// Clearance is under review; items may still proceed
    PendingReview,
    /// Financial items are blocked until a request is resolved
    Blocked,
}

impl UttaiStatus {
    /// Stable lowercase label
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::PendingReview => "pending_review",
            Self::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for UttaiStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The client matter/engagement that costs and invoices are grouped under
///
/// The clearance fields are mutated only by the registry's UTTAI resolution
/// flow; the engine reads them as per-request context and never writes them
/// inside a transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Identifier
    pub id: JobId,
    /// Internal job code
    pub job_code: String,
    /// Client code
    pub client_code: String,
    /// Client display name
    pub client_name: String,
    /// Current clearance
    pub uttai_status: UttaiStatus,
    /// Tri-state: whether the UTTAI subject is obliged (unknown until resolved)
    pub uttai_subject_obliged: Option<bool>,
    /// Creator
    pub created_by: ActorId,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Entity for Job {
    type Id = JobId;
    const KIND: &'static str = "job";

    fn id(&self) -> JobId {
        self.id
    }

    fn status_label(&self) -> &'static str {
        self.uttai_status.as_str()
    }
}
