//! Vendors and their compliance documents
//!
//! A vendor's compliance status is derived from its document expiry dates
//! and never set by hand. Document contents live in the external file store;
//! only opaque references are kept here.

use chrono::{DateTime, Duration, Utc};
use lexfin_store::Entity;
use lexfin_types::{ActorId, DocumentId, VendorId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Derived per-vendor document compliance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplianceStatus {
    /// All documents valid and outside the expiry window
    Compliant,
    /// At least one document expires within the policy window
    ExpiringSoon,
    /// Missing documents, or at least one expired
    NonCompliant,
}

impl ComplianceStatus {
    /// Stable lowercase label
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compliant => "compliant",
            Self::ExpiringSoon => "expiring_soon",
            Self::NonCompliant => "non_compliant",
        }
    }
}

impl std::fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of compliance documents a vendor files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    /// Tax residency/withholding certificate
    TaxCertificate,
    /// Professional liability insurance certificate
    InsuranceCertificate,
    /// Bank account ownership certificate
    BankOwnership,
}

/// A filed vendor document (reference only; contents stay in the file store)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorDocument {
    /// Identifier
    pub id: DocumentId,
    /// Owning vendor
    pub vendor_id: VendorId,
    /// Document kind
    pub kind: DocumentKind,
    /// Opaque file-store reference
    pub reference: String,
    /// Expiry date
    pub expires_at: DateTime<Utc>,
    /// Uploader
    pub uploaded_by: ActorId,
    /// Upload time
    pub uploaded_at: DateTime<Utc>,
}

impl Entity for VendorDocument {
    type Id = DocumentId;
    const KIND: &'static str = "vendor_document";

    fn id(&self) -> DocumentId {
        self.id
    }

    fn status_label(&self) -> &'static str {
        "filed"
    }
}

/// A cost-side supplier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    /// Identifier
    pub id: VendorId,
    /// Legal name
    pub name: String,
    /// Tax identifier
    pub tax_id: String,
    /// Country code
    pub country: String,
    /// Derived document compliance (expiry-driven, never set by hand)
    pub compliance_status: ComplianceStatus,
    /// Creator
    pub created_by: ActorId,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Entity for Vendor {
    type Id = VendorId;
    const KIND: &'static str = "vendor";

    fn id(&self) -> VendorId {
        self.id
    }

    fn status_label(&self) -> &'static str {
        self.compliance_status.as_str()
    }
}

/// Derive a vendor's compliance status from its documents
///
/// Only the latest document of each kind counts (renewals supersede).
/// A vendor with no documents is non-compliant.
#[must_use]
pub fn derive_status(
    documents: &[VendorDocument],
    now: DateTime<Utc>,
    expiring_window_days: i64,
) -> ComplianceStatus {
    if documents.is_empty() {
        return ComplianceStatus::NonCompliant;
    }

    // Latest expiry per kind supersedes older filings
    let mut latest: HashMap<DocumentKind, DateTime<Utc>> = HashMap::new();
    for doc in documents {
        let entry = latest.entry(doc.kind).or_insert(doc.expires_at);
        if doc.expires_at > *entry {
            *entry = doc.expires_at;
        }
    }

    let window = Duration::days(expiring_window_days);
    let mut expiring_soon = false;
    for expires_at in latest.values() {
        if *expires_at <= now {
            return ComplianceStatus::NonCompliant;
        }
        if *expires_at <= now + window {
            expiring_soon = true;
        }
    }
    if expiring_soon {
        ComplianceStatus::ExpiringSoon
    } else {
        ComplianceStatus::Compliant
    }
}
