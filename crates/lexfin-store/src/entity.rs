//! Entity trait for stored lifecycle records

use std::fmt::{Debug, Display};
use std::hash::Hash;

/// A stored record with immutable identity and a closed status enumeration
///
/// # Contract
/// - `id()` never changes for the lifetime of the record
/// - `status_label()` returns the stable lowercase label of the current
///   state, used in audit rows and error messages
pub trait Entity: Clone + Send + Sync + 'static {
    /// Typed identifier
    type Id: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static;

    /// Stable entity kind label (lowercase, underscores)
    const KIND: &'static str;

    /// The record's identifier
    fn id(&self) -> Self::Id;

    /// Stable label of the current status
    fn status_label(&self) -> &'static str;
}
