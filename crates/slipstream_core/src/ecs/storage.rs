//! # Component Storage
//!
//! Sparse-set storage, one per component type.
//!
//! The storage uses a sparse/dense split:
//! - `sparse[entity index]` holds the position in the dense arrays
//! - `dense` and `owners` are packed, so iteration touches only live data
//! - Removal is swap-remove, O(1)

use std::any::Any;

use super::component::Component;
use super::entity::EntityId;

/// Sentinel for "no dense slot" in the sparse array.
const EMPTY: u32 = u32::MAX;

/// Sparse-set storage for a single component type.
///
/// # Type Parameters
///
/// * `C` - The component type to store
///
/// # Example
///
/// ```rust,ignore
/// let mut storage: ComponentStorage<Fuel> = ComponentStorage::new();
/// storage.insert(id, Fuel(1.0));
/// ```
pub struct ComponentStorage<C: Component> {
    /// Entity index -> dense index (or `EMPTY`).
    sparse: Vec<u32>,
    /// Packed component values.
    dense: Vec<C>,
    /// Owner of each dense slot, parallel to `dense`.
    owners: Vec<EntityId>,
}

impl<C: Component> ComponentStorage<C> {
    /// Creates an empty storage.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sparse: Vec::new(),
            dense: Vec::new(),
            owners: Vec::new(),
        }
    }

    /// Returns the number of stored components.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    /// Returns true if nothing is stored.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    #[inline]
    fn dense_index(&self, id: EntityId) -> Option<usize> {
        let slot = *self.sparse.get(id.index() as usize)?;
        if slot == EMPTY {
            return None;
        }
        let slot = slot as usize;
        // The slot index may have been recycled; the owner check catches it.
        (self.owners[slot] == id).then_some(slot)
    }

    /// Returns true if `id` has a component in this storage.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.dense_index(id).is_some()
    }

    /// Gets a component by entity.
    #[inline]
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&C> {
        self.dense_index(id).map(|slot| &self.dense[slot])
    }

    /// Gets a mutable component by entity.
    #[inline]
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut C> {
        let slot = self.dense_index(id)?;
        Some(&mut self.dense[slot])
    }

    /// Inserts or overwrites the component for `id`.
    ///
    /// Returns the previous value if there was one.
    pub fn insert(&mut self, id: EntityId, component: C) -> Option<C> {
        if let Some(slot) = self.dense_index(id) {
            return Some(std::mem::replace(&mut self.dense[slot], component));
        }

        let index = id.index() as usize;
        if index >= self.sparse.len() {
            self.sparse.resize(index + 1, EMPTY);
        }
        self.sparse[index] = self.dense.len() as u32;
        self.dense.push(component);
        self.owners.push(id);
        None
    }

    /// Removes the component for `id`, returning it.
    pub fn remove(&mut self, id: EntityId) -> Option<C> {
        let slot = self.dense_index(id)?;
        let last = self.dense.len() - 1;

        self.dense.swap(slot, last);
        self.owners.swap(slot, last);
        if slot != last {
            let moved = self.owners[slot];
            self.sparse[moved.index() as usize] = slot as u32;
        }
        self.sparse[id.index() as usize] = EMPTY;
        self.owners.pop();
        self.dense.pop()
    }

    /// Owners of every stored component, in dense order.
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &[EntityId] {
        &self.owners
    }

    /// Iterates over `(owner, component)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &C)> {
        self.owners.iter().copied().zip(self.dense.iter())
    }

    /// Iterates mutably over `(owner, component)` pairs.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut C)> {
        self.owners.iter().copied().zip(self.dense.iter_mut())
    }

    /// Removes every component.
    pub fn clear(&mut self) {
        self.sparse.clear();
        self.dense.clear();
        self.owners.clear();
    }
}

impl<C: Component> Default for ComponentStorage<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased view of a [`ComponentStorage`], used by the world to run
/// per-entity cleanup without knowing the component type.
pub trait AnyStorage: Send + Sync {
    /// Drops the component owned by `id`, if any.
    fn remove_entity(&mut self, id: EntityId);
    /// Returns true if `id` owns a component here.
    fn contains_entity(&self, id: EntityId) -> bool;
    /// Owners of every stored component.
    fn owners(&self) -> &[EntityId];
    /// Upcast for downcasting to the concrete storage.
    fn as_any(&self) -> &dyn Any;
    /// Mutable upcast for downcasting to the concrete storage.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<C: Component> AnyStorage for ComponentStorage<C> {
    fn remove_entity(&mut self, id: EntityId) {
        self.remove(id);
    }

    fn contains_entity(&self, id: EntityId) -> bool {
        self.contains(id)
    }

    fn owners(&self) -> &[EntityId] {
        self.entities()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
