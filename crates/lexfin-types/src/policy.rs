//! Engine policy configuration
//!
//! Policy knobs the product has not fixed yet live here rather than being
//! hard-coded in transitions: the conditional batch-level four-eyes rule and
//! the resubmission ceiling are both flagged open questions upstream.

use serde::{Deserialize, Serialize};

/// When the separation-of-duties gate applies to batch approval
///
/// Collection claims always require it; batch approval is configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FourEyesRule {
    /// Approver must always differ from the creator
    Always,
    /// Approver must differ only when the job's UTTAI subject is obliged
    WhenSubjectObliged,
    /// No separation required
    Never,
}

impl FourEyesRule {
    /// Whether the gate applies given the job's tri-state obliged flag
    #[inline]
    #[must_use]
    pub fn applies(self, subject_obliged: Option<bool>) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::WhenSubjectObliged => subject_obliged == Some(true),
        }
    }
}

/// Engine-wide policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnginePolicy {
    /// Separation-of-duties rule for batch approval
    pub batch_four_eyes: FourEyesRule,
    /// Maximum resubmissions per item lineage (`None` = unlimited)
    pub resubmission_limit: Option<u32>,
    /// Days before expiry at which a vendor document counts as expiring soon
    pub expiring_window_days: i64,
}

impl EnginePolicy {
    /// Create the default policy
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With a batch four-eyes rule
    #[inline]
    #[must_use]
    pub fn with_batch_four_eyes(mut self, rule: FourEyesRule) -> Self {
        self.batch_four_eyes = rule;
        self
    }

    /// With a resubmission ceiling
    #[inline]
    #[must_use]
    pub fn with_resubmission_limit(mut self, limit: Option<u32>) -> Self {
        self.resubmission_limit = limit;
        self
    }

    /// With an expiring-soon window
    #[inline]
    #[must_use]
    pub fn with_expiring_window_days(mut self, days: i64) -> Self {
        self.expiring_window_days = days;
        self
    }
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            batch_four_eyes: FourEyesRule::WhenSubjectObliged,
            resubmission_limit: None,
            expiring_window_days: 30,
        }
    }
}
