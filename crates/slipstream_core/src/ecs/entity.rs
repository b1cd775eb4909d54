//! # Entity Management
//!
//! Entities are lightweight identifiers consisting of:
//! - An index into the entity slot table and the sparse arrays
//! - A generation counter for safe reuse

use crate::registry::EntityTypeId;

/// Number of index bits kept when a handle is packed for the wire.
pub const WIRE_INDEX_BITS: u32 = 24;

/// Largest slot index that still fits a wire handle.
pub const MAX_WIRE_INDEX: u32 = (1 << WIRE_INDEX_BITS) - 1;

/// Unique identifier for an entity.
///
/// The ID is split into two parts:
/// - Lower 32 bits: Index into the entity slot table
/// - Upper 32 bits: Generation counter for detecting stale references
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates a new entity ID from index and generation.
    ///
    /// # Arguments
    ///
    /// * `index` - The slot index (0 to 2^32-1)
    /// * `generation` - The generation counter (0 to 2^32-1)
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the index portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Null/invalid entity ID.
    pub const NULL: Self = Self(u64::MAX);

    /// Checks if this entity ID is null/invalid.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }

    /// Packs the handle into the 32-bit form used on the wire.
    ///
    /// Lower 24 bits carry the index, upper 8 bits the low byte of the
    /// generation. Two handles for the same slot only collide after 256
    /// recycles, long after any delete for the older one has been broadcast.
    #[inline]
    #[must_use]
    pub const fn to_wire(self) -> u32 {
        (self.index() & MAX_WIRE_INDEX) | ((self.generation() & 0xFF) << WIRE_INDEX_BITS)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{}v{}", self.index(), self.generation())
        }
    }
}

/// One slot of the entity table.
///
/// A dead slot keeps its last ID so the next spawn can bump the generation.
#[derive(Clone, Copy, Debug)]
pub struct Entity {
    /// The identifier currently (or last) issued for this slot.
    pub id: EntityId,
    /// Entity type recorded at instantiation, if the entity came from a blueprint.
    pub entity_type: Option<EntityTypeId>,
    /// Whether this entity slot is currently alive.
    pub alive: bool,
}

impl Entity {
    /// Creates a live entity slot.
    #[inline]
    #[must_use]
    pub const fn new(id: EntityId) -> Self {
        Self {
            id,
            entity_type: None,
            alive: true,
        }
    }

    /// Creates a dead/empty entity slot.
    #[inline]
    #[must_use]
    pub const fn dead() -> Self {
        Self {
            id: EntityId::NULL,
            entity_type: None,
            alive: false,
        }
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::dead()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_roundtrip() {
        let id = EntityId::new(12345, 67890);
        assert_eq!(id.index(), 12345);
        assert_eq!(id.generation(), 67890);
    }

    #[test]
    fn test_wire_packing_keeps_index_and_low_generation() {
        let id = EntityId::new(42, 3);
        assert_eq!(id.to_wire(), 42 | (3 << 24));

        let wrapped = EntityId::new(42, 256 + 3);
        assert_eq!(wrapped.to_wire(), id.to_wire());
    }

    #[test]
    fn test_null_display() {
        assert_eq!(EntityId::NULL.to_string(), "null");
        assert_eq!(EntityId::new(7, 1).to_string(), "7v1");
    }
}
