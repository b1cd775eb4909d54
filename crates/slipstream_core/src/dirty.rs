//! # Dirty Tracking
//!
//! Records which entities had networked components change this tick, which
//! of their components changed, and which entities were destroyed, so the
//! snapshot encoder only sends what moved.
//!
//! ## Contract
//!
//! Gameplay systems call [`DirtyTracker::mark_component`] after mutating one
//! networked component, or [`DirtyTracker::mark_dirty`] when the whole entity
//! should be resent. The server drains both sets exactly once per tick,
//! after every system ran and before any snapshot is encoded.

use std::any::TypeId;

use crate::ecs::{Component, EntityId, World};
use crate::registry::EntityTypeId;

/// An entity destroyed this tick, kept until the delete is broadcast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeletedEntity {
    /// Handle the entity had on the server.
    pub id: EntityId,
    /// Its entity type, so receivers can log what vanished.
    pub entity_type: EntityTypeId,
}

/// Which components of a dirty entity changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Changed {
    /// The entity as a whole was marked; every component counts as changed.
    All,
    /// Only these component types, in marking order.
    Components(Vec<TypeId>),
}

impl Changed {
    fn from_mark(component: Option<TypeId>) -> Self {
        component.map_or(Self::All, |type_id| Self::Components(vec![type_id]))
    }

    fn add(&mut self, component: Option<TypeId>) {
        match (self, component) {
            (Self::All, _) => {}
            (this, None) => *this = Self::All,
            (Self::Components(list), Some(type_id)) => {
                if !list.contains(&type_id) {
                    list.push(type_id);
                }
            }
        }
    }

    /// Returns true if the component with `type_id` changed.
    #[inline]
    #[must_use]
    pub fn includes(&self, type_id: TypeId) -> bool {
        match self {
            Self::All => true,
            Self::Components(list) => list.contains(&type_id),
        }
    }
}

/// One drained dirty entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirtyEntity {
    /// The changed entity.
    pub id: EntityId,
    /// What changed on it.
    pub changed: Changed,
}

/// Per-tick dirty and deleted sets.
///
/// Dirty membership is a bitset keyed by slot index (64 slots per word), with
/// a parallel list that keeps handles in marking order for deterministic
/// payloads.
#[derive(Debug, Default)]
pub struct DirtyTracker {
    /// Bitset: 1 = pending, 0 = clean.
    bits: Vec<u64>,
    /// Pending entries in marking order. At most one per slot.
    pending: Vec<DirtyEntity>,
    /// Destroyed entities awaiting broadcast.
    deleted: Vec<DeletedEntity>,
}

impl DirtyTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracker sized for `capacity` slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bits: vec![0u64; capacity.div_ceil(64)],
            pending: Vec::with_capacity(capacity),
            deleted: Vec::new(),
        }
    }

    #[inline]
    fn locate(id: EntityId) -> (usize, u64) {
        let index = id.index() as usize;
        (index / 64, 1u64 << (index % 64))
    }

    /// Marks every component of `id` as changed. Marking twice in one tick
    /// has no extra effect.
    #[inline]
    pub fn mark_dirty(&mut self, id: EntityId) {
        self.mark(id, None);
    }

    /// Marks component `C` of `id` as changed.
    #[inline]
    pub fn mark_component<C: Component>(&mut self, id: EntityId) {
        self.mark(id, Some(TypeId::of::<C>()));
    }

    /// Marks the component with `type_id` of `id` as changed.
    #[inline]
    pub fn mark_component_type(&mut self, id: EntityId, type_id: TypeId) {
        self.mark(id, Some(type_id));
    }

    fn mark(&mut self, id: EntityId, component: Option<TypeId>) {
        let (word, mask) = Self::locate(id);
        if word >= self.bits.len() {
            self.bits.resize(word + 1, 0);
        }

        if self.bits[word] & mask == 0 {
            self.bits[word] |= mask;
            self.pending.push(DirtyEntity {
                id,
                changed: Changed::from_mark(component),
            });
            return;
        }

        if let Some(entry) = self.pending.iter_mut().find(|p| p.id.index() == id.index()) {
            if entry.id == id {
                entry.changed.add(component);
            } else {
                // Recycled slot: the old handle's changes are moot.
                entry.id = id;
                entry.changed = Changed::from_mark(component);
            }
        }
    }

    /// Records a destruction that must reach clients.
    ///
    /// Also drops `id` from the pending dirty set: there is nothing left to
    /// update. A pending entry for another generation of the same slot is
    /// left alone.
    pub fn mark_deleted(&mut self, id: EntityId, entity_type: EntityTypeId) {
        if let Some(position) = self.pending.iter().position(|p| p.id == id) {
            self.pending.remove(position);
            self.clear_bit(id);
        }
        self.deleted.push(DeletedEntity { id, entity_type });
    }

    fn clear_bit(&mut self, id: EntityId) {
        let (word, mask) = Self::locate(id);
        if let Some(bits) = self.bits.get_mut(word) {
            *bits &= !mask;
        }
    }

    /// Checks if `id` is pending.
    #[inline]
    #[must_use]
    pub fn is_dirty(&self, id: EntityId) -> bool {
        let (word, mask) = Self::locate(id);
        self.bits.get(word).is_some_and(|bits| bits & mask != 0)
            && self.pending.iter().any(|p| p.id == id)
    }

    /// What changed on `id` so far this tick.
    #[must_use]
    pub fn changes(&self, id: EntityId) -> Option<&Changed> {
        self.pending.iter().find(|p| p.id == id).map(|p| &p.changed)
    }

    /// Number of pending dirty entities.
    #[inline]
    #[must_use]
    pub fn dirty_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of pending deleted records.
    #[inline]
    #[must_use]
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    /// Returns and clears the dirty set, with what changed on each entity.
    ///
    /// A second call without an intervening mark returns an empty set.
    pub fn drain_changes(&mut self) -> Vec<DirtyEntity> {
        for word in &mut self.bits {
            *word = 0;
        }
        std::mem::take(&mut self.pending)
    }

    /// Returns and clears the dirty set, handles only.
    pub fn drain_dirty(&mut self) -> Vec<EntityId> {
        self.drain_changes().into_iter().map(|p| p.id).collect()
    }

    /// Returns and clears the deleted records.
    pub fn drain_deleted(&mut self) -> Vec<DeletedEntity> {
        std::mem::take(&mut self.deleted)
    }
}

/// Destroys `id` and records the delete in one step.
///
/// Only typed entities are recorded: an entity that never came from a
/// blueprint was never replicated. Returns `false` for dead or stale handles.
pub fn despawn_tracked(world: &mut World, tracker: &mut DirtyTracker, id: EntityId) -> bool {
    let entity_type = world.entity_type(id);
    if !world.despawn(id) {
        return false;
    }
    if let Some(entity_type) = entity_type {
        tracker.mark_deleted(id, entity_type);
    }
    true
}
