//! Append-only audit trail
//!
//! Every successful transition appends one record (entity, from-state,
//! to-state, actor, timestamp). Records are hash-chained so the history is
//! tamper-evident and replayable for audit display.

use chrono::{DateTime, Utc};
use lexfin_types::ActorId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One audited transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Entity kind label
    pub entity_kind: String,
    /// Entity identifier
    pub entity_id: String,
    /// State before the transition ("-" for creation)
    pub from_state: String,
    /// State after the transition
    pub to_state: String,
    /// The actor that performed the transition
    pub actor: ActorId,
    /// When the transition was persisted
    pub at: DateTime<Utc>,
    /// Hash of the previous record (zeroes for the first)
    pub prev_hash: [u8; 32],
    /// Hash of this record
    pub hash: [u8; 32],
}

/// Raised when the audit chain fails verification
#[derive(Debug, thiserror::Error)]
#[error("audit chain integrity violation at record {index}")]
pub struct AuditIntegrityError {
    /// Index of the first broken record
    pub index: usize,
}

/// Hash-chained append-only transition log
#[derive(Debug, Default)]
pub struct AuditLog {
    inner: Mutex<Vec<AuditRecord>>,
}

impl AuditLog {
    /// Create an empty log
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one transition record
    pub fn record(
        &self,
        entity_kind: &str,
        entity_id: impl std::fmt::Display,
        from_state: &str,
        to_state: &str,
        actor: ActorId,
        at: DateTime<Utc>,
    ) {
        let mut guard = self.inner.lock();
        let prev_hash = guard.last().map(|r| r.hash).unwrap_or([0u8; 32]);
        let mut record = AuditRecord {
            entity_kind: entity_kind.to_string(),
            entity_id: entity_id.to_string(),
            from_state: from_state.to_string(),
            to_state: to_state.to_string(),
            actor,
            at,
            prev_hash,
            hash: [0u8; 32],
        };
        record.hash = compute_hash(&record);
        guard.push(record);
    }

    /// All records, in append order
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.inner.lock().clone()
    }

    /// Transition history for one entity, in append order
    #[must_use]
    pub fn history_for(&self, entity_kind: &str, entity_id: &str) -> Vec<AuditRecord> {
        self.inner
            .lock()
            .iter()
            .filter(|r| r.entity_kind == entity_kind && r.entity_id == entity_id)
            .cloned()
            .collect()
    }

    /// Verify the hash chain end to end
    ///
    /// # Errors
    /// Returns the index of the first record whose chain link or content
    /// hash does not verify.
    pub fn verify_integrity(&self) -> Result<(), AuditIntegrityError> {
        let guard = self.inner.lock();
        let mut prev = [0u8; 32];
        for (index, record) in guard.iter().enumerate() {
            if record.prev_hash != prev {
                return Err(AuditIntegrityError { index });
            }
            if compute_hash(record) != record.hash {
                return Err(AuditIntegrityError { index });
            }
            prev = record.hash;
        }
        Ok(())
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

fn compute_hash(record: &AuditRecord) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(record.entity_kind.as_bytes());
    hasher.update(record.entity_id.as_bytes());
    hasher.update(record.from_state.as_bytes());
    hasher.update(record.to_state.as_bytes());
    hasher.update(record.actor.to_string().as_bytes());
    hasher.update(record.at.to_rfc3339().as_bytes());
    hasher.update(record.prev_hash);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append_probe(log: &AuditLog, from: &str, to: &str) {
        log.record("claim", "c1", from, to, ActorId::new(), Utc::now());
    }

    #[test]
    fn chain_links_each_record_to_the_previous() {
        let log = AuditLog::new();
        append_probe(&log, "-", "pending_approval");
        append_probe(&log, "pending_approval", "approved");
        append_probe(&log, "approved", "sent");

        let records = log.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].prev_hash, [0u8; 32]);
        assert_eq!(records[1].prev_hash, records[0].hash);
        assert_eq!(records[2].prev_hash, records[1].hash);
        log.verify_integrity().unwrap();
    }

    #[test]
    fn history_filters_by_entity() {
        let log = AuditLog::new();
        log.record("claim", "c1", "-", "pending_approval", ActorId::new(), Utc::now());
        log.record("invoice", "i1", "-", "invoice_draft", ActorId::new(), Utc::now());
        log.record("claim", "c1", "pending_approval", "approved", ActorId::new(), Utc::now());

        let history = log.history_for("claim", "c1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].to_state, "approved");
    }

    #[test]
    fn tampering_is_detected() {
        let log = AuditLog::new();
        append_probe(&log, "-", "pending_approval");
        append_probe(&log, "pending_approval", "approved");

        // Forge a record in the middle of the chain
        {
            let mut guard = log.inner.lock();
            guard[0].to_state = "sent".to_string();
        }
        let err = log.verify_integrity().unwrap_err();
        assert_eq!(err.index, 0);
    }
}
