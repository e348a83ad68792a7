//! Error taxonomy for the lifecycle engine
//!
//! Every transition returns a typed result. Nothing is auto-retried inside
//! the engine; `StaleState` callers are expected to re-read and retry at
//! most once (a calling-layer policy).

use crate::actor::Role;
use crate::ids::{ActorId, IntakeItemId, InvoiceId, JobId};

/// Typed failure returned by every transition function
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Requested transition is not defined from the entity's current state
    #[error("invalid transition for {entity} {id}: {from} -> {requested}")]
    InvalidTransition {
        /// Entity kind label
        entity: &'static str,
        /// Entity identifier
        id: String,
        /// Current persisted state
        from: String,
        /// Requested target state
        requested: String,
    },

    /// Actor's role does not hold the transition
    #[error("permission denied: role {role} cannot {action}")]
    PermissionDenied {
        /// The caller's role claim
        role: Role,
        /// The attempted action
        action: &'static str,
    },

    /// Required fields for the target state are missing or malformed
    #[error("validation failed: {0}")]
    Validation(String),

    /// Owning job is UTTAI-blocked
    #[error("job {job} is blocked pending uttai resolution")]
    ComplianceBlocked {
        /// The blocked job
        job: JobId,
    },

    /// Optimistic-concurrency conflict: entity moved since it was read
    #[error("stale state for {entity} {id}: expected {expected}, found {found}")]
    StaleState {
        /// Entity kind label
        entity: &'static str,
        /// Entity identifier
        id: String,
        /// State the caller expected
        expected: String,
        /// State actually persisted
        found: String,
    },

    /// Duplicate of the one-way posting operation
    #[error("intake item {item} already posted under reference {reference}")]
    AlreadyPosted {
        /// The already-posted item
        item: IntakeItemId,
        /// The existing external reference
        reference: String,
    },

    /// Duplicate of the one-way issue operation
    #[error("invoice {invoice} already issued as {number}")]
    AlreadyIssued {
        /// The already-issued invoice
        invoice: InvoiceId,
        /// The existing external invoice number
        number: String,
    },

    /// Separation-of-duties guard: the creator cannot also approve
    #[error("separation of duties: actor {actor} cannot {action} a record they created")]
    SeparationOfDuties {
        /// The offending actor
        actor: ActorId,
        /// The attempted action
        action: &'static str,
    },

    /// Referenced entity does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind label
        entity: &'static str,
        /// The missing identifier
        id: String,
    },
}

impl EngineError {
    /// Shorthand for a validation failure
    #[inline]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Shorthand for a missing entity
    #[inline]
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the caller may retry after a fresh read
    ///
    /// Only `StaleState` qualifies; everything else requires caller action.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StaleState { .. })
    }

    /// Whether this is a visible duplicate/conflict of a one-way operation
    #[inline]
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::AlreadyPosted { .. } | Self::AlreadyIssued { .. } | Self::StaleState { .. }
        )
    }
}

/// Result alias used across the engine
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_state_is_the_only_retryable_error() {
        let stale = EngineError::StaleState {
            entity: "intake_item",
            id: "x".into(),
            expected: "posted".into(),
            found: "billed".into(),
        };
        assert!(stale.is_retryable());
        assert!(!EngineError::validation("empty recipients").is_retryable());
        assert!(
            !EngineError::PermissionDenied {
                role: Role::Bpo,
                action: "approve intake item",
            }
            .is_retryable()
        );
    }

    #[test]
    fn duplicate_one_way_operations_are_conflicts() {
        let err = EngineError::AlreadyPosted {
            item: IntakeItemId::new(),
            reference: "SAP-001".into(),
        };
        assert!(err.is_conflict());
        assert!(err.to_string().contains("already posted"));
    }

    #[test]
    fn display_is_lowercase_and_specific() {
        let err = EngineError::InvalidTransition {
            entity: "claim",
            id: "c1".into(),
            from: "sent".into(),
            requested: "approved".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid transition for claim c1: sent -> approved"
        );
    }
}
