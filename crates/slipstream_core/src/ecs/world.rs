//! # ECS World
//!
//! The Entity Store: owns every entity slot and every component storage.
//!
//! Storages are created lazily, one sparse set per component type, keyed by
//! `TypeId`. Systems declare the exact set of types they operate on through
//! [`World::view`].

use std::any::TypeId;
use std::collections::HashMap;

use super::component::Component;
use super::entity::{Entity, EntityId, MAX_WIRE_INDEX};
use super::storage::{AnyStorage, ComponentStorage};
use super::view::{ComponentSet, View};
use crate::registry::EntityTypeId;

/// The ECS World - container for all game state.
///
/// # Handles
///
/// Slots are recycled through a free list. Every recycle bumps the slot's
/// generation, so a handle kept past `despawn` is detected as stale instead
/// of silently aliasing the new occupant.
///
/// # Example
///
/// ```rust,ignore
/// let mut world = World::new();
///
/// let car = world.spawn();
/// world.insert(car, Position(Vec3::ZERO));
/// assert!(world.has::<Position>(car));
/// ```
pub struct World {
    /// All entity slots, dead or alive.
    entities: Vec<Entity>,
    /// Free list of entity indices for reuse.
    free_indices: Vec<u32>,
    /// Number of currently alive entities.
    alive_count: usize,

    // =========================================================================
    // Component Storages - one sparse set per type, created on first insert
    // =========================================================================
    storages: HashMap<TypeId, Box<dyn AnyStorage>>,
}

impl World {
    /// Creates an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty world with room for `capacity` entity slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entities: Vec::with_capacity(capacity),
            free_indices: Vec::new(),
            alive_count: 0,
            storages: HashMap::new(),
        }
    }

    /// Returns the number of currently alive entities.
    #[inline]
    #[must_use]
    pub const fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Spawns a new entity, returning its ID.
    ///
    /// Reuses a freed slot when one is available, otherwise appends.
    ///
    /// # Panics
    ///
    /// Panics if the table would outgrow the wire-addressable index range.
    pub fn spawn(&mut self) -> EntityId {
        if let Some(index) = self.free_indices.pop() {
            let entity = &mut self.entities[index as usize];

            // Increment generation to invalidate old references
            let generation = entity.id.generation().wrapping_add(1);
            let new_id = EntityId::new(index, generation);

            *entity = Entity::new(new_id);
            self.alive_count += 1;
            return new_id;
        }

        let index = self.entities.len();
        assert!(
            index <= MAX_WIRE_INDEX as usize,
            "entity table exceeds {MAX_WIRE_INDEX} slots"
        );
        let new_id = EntityId::new(index as u32, 0);
        self.entities.push(Entity::new(new_id));
        self.alive_count += 1;
        new_id
    }

    /// Despawns an entity, freeing its slot for reuse.
    ///
    /// Every component attached to the entity is dropped before the slot goes
    /// back on the free list.
    ///
    /// # Returns
    ///
    /// `true` if the entity was despawned, `false` if it was already dead
    /// or the ID was invalid/stale.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }

        for storage in self.storages.values_mut() {
            storage.remove_entity(id);
        }

        let entity = &mut self.entities[id.index() as usize];
        entity.alive = false;
        entity.entity_type = None;
        self.alive_count -= 1;
        self.free_indices.push(id.index());

        true
    }

    /// Checks if an entity is alive.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        if id.is_null() {
            return false;
        }
        self.entities
            .get(id.index() as usize)
            .is_some_and(|entity| entity.alive && entity.id == id)
    }

    /// Returns the entity type recorded when the entity was instantiated.
    #[must_use]
    pub fn entity_type(&self, id: EntityId) -> Option<EntityTypeId> {
        if !self.is_alive(id) {
            return None;
        }
        self.entities[id.index() as usize].entity_type
    }

    /// Records the entity type. Done once, by the type registry.
    pub(crate) fn set_entity_type(&mut self, id: EntityId, entity_type: EntityTypeId) {
        assert!(self.is_alive(id), "cannot tag dead entity {id}");
        let slot = &mut self.entities[id.index() as usize];
        debug_assert!(slot.entity_type.is_none(), "entity type is immutable");
        slot.entity_type = Some(entity_type);
    }

    /// Iterates over all alive entity IDs.
    pub fn iter_alive(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter().filter(|e| e.alive).map(|e| e.id)
    }

    /// Attaches `component` to `id`, overwriting any existing value.
    ///
    /// # Panics
    ///
    /// Panics if `id` is dead or stale.
    pub fn insert<C: Component>(&mut self, id: EntityId, component: C) {
        assert!(
            self.is_alive(id),
            "attach {} to dead entity {id}",
            std::any::type_name::<C>()
        );
        self.storage_mut::<C>().insert(id, component);
    }

    /// Returns the component of type `C` on `id`.
    ///
    /// # Panics
    ///
    /// Panics if the component is not attached. Call [`World::has`] first
    /// when unsure.
    #[must_use]
    pub fn get<C: Component>(&self, id: EntityId) -> &C {
        match self.try_get(id) {
            Some(component) => component,
            None => panic!(
                "entity {id} has no {} component",
                std::any::type_name::<C>()
            ),
        }
    }

    /// Returns the component of type `C` on `id` mutably.
    ///
    /// # Panics
    ///
    /// Panics if the component is not attached.
    pub fn get_mut<C: Component>(&mut self, id: EntityId) -> &mut C {
        match self.try_get_mut(id) {
            Some(component) => component,
            None => panic!(
                "entity {id} has no {} component",
                std::any::type_name::<C>()
            ),
        }
    }

    /// Returns the component if attached.
    #[must_use]
    pub fn try_get<C: Component>(&self, id: EntityId) -> Option<&C> {
        self.storage::<C>()?.get(id)
    }

    /// Returns the component mutably if attached.
    pub fn try_get_mut<C: Component>(&mut self, id: EntityId) -> Option<&mut C> {
        self.storages
            .get_mut(&TypeId::of::<C>())?
            .as_any_mut()
            .downcast_mut::<ComponentStorage<C>>()?
            .get_mut(id)
    }

    /// Returns true if `id` has a component of type `C`.
    #[must_use]
    pub fn has<C: Component>(&self, id: EntityId) -> bool {
        self.storage::<C>().is_some_and(|s| s.contains(id))
    }

    /// [`has`](Self::has) for a component type only known at runtime.
    #[must_use]
    pub fn has_type_id(&self, id: EntityId, type_id: TypeId) -> bool {
        self.storages
            .get(&type_id)
            .is_some_and(|s| s.contains_entity(id))
    }

    /// Component types `id` currently carries, in `TypeId` order.
    #[must_use]
    pub fn component_type_ids(&self, id: EntityId) -> Vec<TypeId> {
        let mut type_ids: Vec<TypeId> = self
            .storages
            .iter()
            .filter(|(_, storage)| storage.contains_entity(id))
            .map(|(type_id, _)| *type_id)
            .collect();
        type_ids.sort_unstable();
        type_ids
    }

    /// Detaches and returns the component of type `C`.
    pub fn remove<C: Component>(&mut self, id: EntityId) -> Option<C> {
        self.storages
            .get_mut(&TypeId::of::<C>())?
            .as_any_mut()
            .downcast_mut::<ComponentStorage<C>>()?
            .remove(id)
    }

    /// Returns the storage for `C`, if any entity ever had one.
    #[must_use]
    pub fn storage<C: Component>(&self) -> Option<&ComponentStorage<C>> {
        self.storages
            .get(&TypeId::of::<C>())?
            .as_any()
            .downcast_ref::<ComponentStorage<C>>()
    }

    fn storage_mut<C: Component>(&mut self) -> &mut ComponentStorage<C> {
        self.storages
            .entry(TypeId::of::<C>())
            .or_insert_with(|| Box::new(ComponentStorage::<C>::new()))
            .as_any_mut()
            .downcast_mut::<ComponentStorage<C>>()
            .unwrap_or_else(|| unreachable!("storage keyed by its own TypeId"))
    }

    /// Type-erased storage lookup, used by views.
    pub(crate) fn erased_storage(&self, type_id: TypeId) -> Option<&dyn AnyStorage> {
        self.storages.get(&type_id).map(|s| &**s)
    }

    /// Returns the entities that carry every component in `Q`.
    ///
    /// The view is lazy and restartable: iterate it as many times as needed.
    /// The store cannot be mutated while a view is alive.
    ///
    /// ```rust,ignore
    /// for id in &world.view::<(Position, Velocity)>() {
    ///     // ...
    /// }
    /// ```
    #[must_use]
    pub fn view<Q: ComponentSet>(&self) -> View<'_> {
        View::new(self, &Q::type_ids())
    }

    /// [`view`](Self::view) over a component list only known at runtime,
    /// such as a replication group.
    #[must_use]
    pub fn view_by_type_ids(&self, type_ids: &[TypeId]) -> View<'_> {
        View::new(self, type_ids)
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
