//! Normalized entity storage.
//!
//! An [`EntityState`] keeps an ordered list of ids next to an id-keyed map of
//! `Arc`-wrapped entities. Every operation returns a new table and leaves the
//! receiver untouched; entities that an operation does not name keep their
//! exact `Arc`, so consumers can detect "unchanged" with [`Arc::ptr_eq`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A value that can live in an [`EntityState`].
pub trait Entity {
    /// Partial update merged into an existing entity.
    type Patch;

    fn id(&self) -> &str;

    /// Produce the entity with `patch` shallow-merged over it.
    fn merge(&self, patch: &Self::Patch) -> Self;
}

/// A partial update addressed to one entity.
#[derive(Debug, Clone)]
pub struct EntityUpdate<P> {
    pub id: String,
    pub changes: P,
}

impl<P> EntityUpdate<P> {
    pub fn new(id: impl Into<String>, changes: P) -> Self {
        Self {
            id: id.into(),
            changes,
        }
    }
}

/// Ordered ids plus an id-keyed map.
///
/// Invariant: `ids` holds exactly the keys of `entities`, without duplicates,
/// in insertion order.
pub struct EntityState<T> {
    ids: Vec<String>,
    entities: HashMap<String, Arc<T>>,
}

impl<T> Clone for EntityState<T> {
    fn clone(&self) -> Self {
        Self {
            ids: self.ids.clone(),
            entities: self.entities.clone(),
        }
    }
}

impl<T> Default for EntityState<T> {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            entities: HashMap::new(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for EntityState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.ids.iter().filter_map(|id| self.entities.get(id)))
            .finish()
    }
}

impl<T: Entity> EntityState<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from entities, in order.
    pub fn from_entities(entities: impl IntoIterator<Item = T>) -> Self {
        Self::new().add_many(entities)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn get(&self, id: &str) -> Option<&Arc<T>> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Entities in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.ids.iter().filter_map(|id| self.entities.get(id))
    }

    pub fn add_one(&self, entity: T) -> Self {
        self.add_many(std::iter::once(entity))
    }

    /// Append entities in order.
    ///
    /// Adding an id that is already present replaces the stored entity in
    /// place and keeps its original position, so `ids` never holds duplicates.
    pub fn add_many(&self, entities: impl IntoIterator<Item = T>) -> Self {
        let mut next = self.clone();
        for entity in entities {
            let id = entity.id().to_string();
            if !next.entities.contains_key(&id) {
                next.ids.push(id.clone());
            }
            next.entities.insert(id, Arc::new(entity));
        }
        next
    }

    /// Replace the whole table.
    pub fn set_all(entities: impl IntoIterator<Item = T>) -> Self {
        Self::from_entities(entities)
    }

    pub fn update_one(&self, update: &EntityUpdate<T::Patch>) -> Self {
        self.update_many(std::slice::from_ref(update))
    }

    /// Shallow-merge each update into its entity. Updates naming an unknown
    /// id are ignored.
    pub fn update_many(&self, updates: &[EntityUpdate<T::Patch>]) -> Self {
        let mut next = self.clone();
        for update in updates {
            if let Some(existing) = next.entities.get(&update.id) {
                let merged = existing.merge(&update.changes);
                next.entities.insert(update.id.clone(), Arc::new(merged));
            }
        }
        next
    }

    pub fn remove_one(&self, id: &str) -> Self {
        self.remove_many(&[id])
    }

    /// Drop the named ids; every other id stays in place.
    pub fn remove_many<S: AsRef<str>>(&self, ids: &[S]) -> Self {
        let mut next = self.clone();
        for id in ids {
            next.entities.remove(id.as_ref());
        }
        next.ids
            .retain(|existing| ids.iter().all(|removed| removed.as_ref() != existing));
        next
    }
}
