//! Concurrent entity store with atomic per-entity writes
//!
//! Transitions on the same entity are serialized by the map's entry lock:
//! every mutation runs as a closure under that lock, so a check-and-write
//! is a single atomic operation. Transitions on different entities carry no
//! ordering guarantee relative to each other.

use crate::entity::Entity;
use dashmap::DashMap;
use lexfin_types::{EngineError, EngineResult};

/// Row-per-record table keyed by a stable typed identifier
#[derive(Debug)]
pub struct EntityStore<T: Entity> {
    map: DashMap<T::Id, T>,
}

impl<T: Entity> EntityStore<T> {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    /// Insert a record that must not already exist
    ///
    /// # Errors
    /// Returns the already-present record when the key is taken; the caller
    /// maps this to its domain conflict (e.g. `AlreadyPosted`).
    pub fn insert_new(&self, entity: T) -> Result<(), T> {
        match self.map.entry(entity.id()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => Err(existing.get().clone()),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(entity);
                Ok(())
            }
        }
    }

    /// Read a record by id
    #[must_use]
    pub fn get(&self, id: T::Id) -> Option<T> {
        self.map.get(&id).map(|r| r.value().clone())
    }

    /// Read a record by id, failing with `NotFound`
    ///
    /// # Errors
    /// Returns `EngineError::NotFound` if no record exists under `id`.
    pub fn try_get(&self, id: T::Id) -> EngineResult<T> {
        self.get(id).ok_or_else(|| EngineError::not_found(T::KIND, id))
    }

    /// Mutate a record under its entry lock
    ///
    /// The closure performs the read-check-write atomically: it observes the
    /// current persisted record, validates the expected pre-state, and
    /// mutates in place. Returning an error leaves the record untouched
    /// (closures must not mutate before all checks pass).
    ///
    /// # Errors
    /// Returns `EngineError::NotFound` if no record exists under `id`, or
    /// whatever the closure returns.
    pub fn update_with<R>(
        &self,
        id: T::Id,
        f: impl FnOnce(&mut T) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let mut entry = self
            .map
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found(T::KIND, id))?;
        f(entry.value_mut())
    }

    /// Whether a record exists under `id`
    #[must_use]
    pub fn contains(&self, id: T::Id) -> bool {
        self.map.contains_key(&id)
    }

    /// Snapshot of all records
    ///
    /// Iteration order is unspecified.
    #[must_use]
    pub fn values(&self) -> Vec<T> {
        self.map.iter().map(|r| r.value().clone()).collect()
    }

    /// Number of stored records
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<T: Entity> Default for EntityStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
