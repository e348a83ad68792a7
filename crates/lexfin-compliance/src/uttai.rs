//! UTTAI clearance requests
//!
//! A request tracks the review of one job's beneficial-owner/source-of-funds
//! clearance. Resolving it writes the job's clearance fields.

use chrono::{DateTime, Utc};
use lexfin_store::Entity;
use lexfin_types::{ActorId, JobId, UttaiRequestId};
use serde::{Deserialize, Serialize};

/// Request lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UttaiRequestStatus {
    /// Opened, not yet picked up
    Pending,
    /// Under review
    InProgress,
    /// Terminal: outcome recorded
    Resolved,
}

impl UttaiRequestStatus {
    /// Stable lowercase label
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
        }
    }

    /// States reachable from this one
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [UttaiRequestStatus] {
        match self {
            Self::Pending => &[Self::InProgress],
            Self::InProgress => &[Self::Resolved],
            Self::Resolved => &[],
        }
    }
}

impl std::fmt::Display for UttaiRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a resolved request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UttaiOutcome {
    /// Job cleared; financial items may proceed
    Cleared,
    /// Job blocked; financial items halt until a new request clears it
    Blocked,
}

/// One clearance review for one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UttaiRequest {
    /// Identifier
    pub id: UttaiRequestId,
    /// The job under review
    pub job_id: JobId,
    /// Lifecycle state
    pub status: UttaiRequestStatus,
    /// Opener
    pub opened_by: ActorId,
    /// Open time
    pub opened_at: DateTime<Utc>,
    /// Resolver (populated only by resolution)
    pub resolved_by: Option<ActorId>,
    /// Resolution time (populated only by resolution)
    pub resolved_at: Option<DateTime<Utc>>,
    /// Recorded outcome (populated only by resolution)
    pub outcome: Option<UttaiOutcome>,
}

impl Entity for UttaiRequest {
    type Id = UttaiRequestId;
    const KIND: &'static str = "uttai_request";

    fn id(&self) -> UttaiRequestId {
        self.id
    }

    fn status_label(&self) -> &'static str {
        self.status.as_str()
    }
}
