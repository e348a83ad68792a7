//! Typed entity identifiers
//!
//! Every entity is keyed by its own ULID newtype (sortable, serde-enabled).
//! Identifiers are immutable - an entity is never re-keyed.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub Ulid);

        impl $name {
            /// Generate a new identifier
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Job (client matter/engagement) identifier
    JobId
);
define_id!(
    /// Vendor identifier
    VendorId
);
define_id!(
    /// Vendor compliance document identifier
    DocumentId
);
define_id!(
    /// UTTAI clearance request identifier
    UttaiRequestId
);
define_id!(
    /// Intake item (inbound cost record) identifier
    IntakeItemId
);
define_id!(
    /// External accounting posting identifier
    PostingId
);
define_id!(
    /// Billing batch identifier
    BatchId
);
define_id!(
    /// Billing batch member identifier
    BatchItemId
);
define_id!(
    /// Client invoice identifier
    InvoiceId
);
define_id!(
    /// Delivery record identifier
    DeliveryId
);
define_id!(
    /// AP platform task identifier
    PlatformTaskId
);
define_id!(
    /// Collection claim identifier
    ClaimId
);
define_id!(
    /// Actor (operator) identifier
    ActorId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = IntakeItemId::new();
        let b = IntakeItemId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn id_display_roundtrip() {
        let id = JobId::new();
        let text = id.to_string();
        assert_eq!(text.len(), 26);
    }

    #[test]
    fn id_serde_roundtrip() {
        let id = ClaimId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: ClaimId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
