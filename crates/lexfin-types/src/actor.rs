//! Actors and roles
//!
//! Role claims come from a verified token supplied by the identity provider.
//! The engine trusts them as authoritative per-request context and never
//! caches them across requests.

use crate::ids::ActorId;
use serde::{Deserialize, Serialize};

/// Operator roles recognized by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Billing operator - creates intake items, invoices, claims
    BillingOperator,
    /// Business-process-outsourcing operator - may submit on behalf of creators
    Bpo,
    /// Partner - holds approval authority
    Partner,
    /// Administrator - holds approval authority plus configuration rights
    Admin,
}

impl Role {
    /// Whether this role holds approval authority
    #[inline]
    #[must_use]
    pub fn can_approve(self) -> bool {
        matches!(self, Self::Partner | Self::Admin)
    }

    /// Whether this role may operate the billing surfaces
    #[inline]
    #[must_use]
    pub fn is_operator(self) -> bool {
        matches!(
            self,
            Self::BillingOperator | Self::Bpo | Self::Partner | Self::Admin
        )
    }

    /// Stable lowercase label
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BillingOperator => "billing_operator",
            Self::Bpo => "bpo",
            Self::Partner => "partner",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller of a transition: identity plus verified role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Operator identity
    pub id: ActorId,
    /// Role claim for this request
    pub role: Role,
}

impl Actor {
    /// Create an actor context
    #[inline]
    #[must_use]
    pub fn new(id: ActorId, role: Role) -> Self {
        Self { id, role }
    }
}
