//! # Entity Type Registry
//!
//! Maps symbolic entity-type names (`RACE_CAR`, `WORLD_CHUNK`, ...) to
//! blueprints: ordered lists of component factories.
//!
//! The same registry contents are built on the server and on every client,
//! so an entity type hash received over the wire reconstructs an entity of
//! the right shape.
//!
//! Registration runs each blueprint once on a scratch store to learn which
//! component types it declares. Decoders use that set to refuse data for
//! components an entity type does not have.
//!
//! ## Ownership
//!
//! The registry is a plain object built at startup and passed by reference.
//! There is no process-wide instance.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use crate::ecs::{Component, EntityId, World};

/// 32-bit FNV-1a hash of a symbolic name.
///
/// Used for entity types, component names and enum variants on the wire, so
/// both ends agree on identity without sharing numeric discriminants.
#[must_use]
pub const fn symbol_hash(name: &str) -> u32 {
    const OFFSET: u32 = 0x811C_9DC5;
    const PRIME: u32 = 0x0100_0193;

    let bytes = name.as_bytes();
    let mut hash = OFFSET;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u32;
        hash = hash.wrapping_mul(PRIME);
        i += 1;
    }
    hash
}

/// Identifier of an entity type: the [`symbol_hash`] of its name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EntityTypeId(pub u32);

impl EntityTypeId {
    /// Derives the ID from a symbolic name.
    #[inline]
    #[must_use]
    pub const fn of(name: &str) -> Self {
        Self(symbol_hash(name))
    }

    /// Raw hash value, as written on the wire.
    #[inline]
    #[must_use]
    pub const fn hash(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EntityTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Builds one component on a freshly spawned entity.
pub type ComponentFactory = Box<dyn Fn(&mut World, EntityId) + Send + Sync>;

/// An entity type's name plus the factories run when it is instantiated.
pub struct Blueprint {
    name: String,
    factories: Vec<ComponentFactory>,
    /// Component types the factories attach. Filled in on registration.
    declared: Vec<TypeId>,
}

impl Blueprint {
    /// Starts an empty blueprint.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            factories: Vec::new(),
            declared: Vec::new(),
        }
    }

    /// Adds a factory that attaches a clone of `value`.
    #[must_use]
    pub fn with<C: Component + Clone>(self, value: C) -> Self {
        self.with_factory(move |world, id| world.insert(id, value.clone()))
    }

    /// Adds an arbitrary factory.
    #[must_use]
    pub fn with_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&mut World, EntityId) + Send + Sync + 'static,
    {
        self.factories.push(Box::new(factory));
        self
    }

    /// Appends already boxed factories, in order.
    #[must_use]
    pub fn with_factories(mut self, factories: impl IntoIterator<Item = ComponentFactory>) -> Self {
        self.factories.extend(factories);
        self
    }

    /// The symbolic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type ID derived from the name.
    #[must_use]
    pub fn type_id(&self) -> EntityTypeId {
        EntityTypeId::of(&self.name)
    }

    /// Number of component factories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// True if the blueprint attaches nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for Blueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blueprint")
            .field("name", &self.name)
            .field("factories", &self.factories.len())
            .finish()
    }
}

/// Registry of entity types known to this process.
#[derive(Default)]
pub struct EntityTypeRegistry {
    types: HashMap<EntityTypeId, Blueprint>,
}

impl EntityTypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `name` with an ordered list of component factories.
    ///
    /// # Panics
    ///
    /// Panics if a different name already hashes to the same ID, or the name
    /// is registered twice.
    pub fn register_type(
        &mut self,
        name: &str,
        factories: impl IntoIterator<Item = ComponentFactory>,
    ) -> EntityTypeId {
        self.register(Blueprint::new(name).with_factories(factories))
    }

    /// Registers a pre-built blueprint.
    ///
    /// # Panics
    ///
    /// Panics on duplicate or colliding names.
    pub fn register(&mut self, mut blueprint: Blueprint) -> EntityTypeId {
        let type_id = blueprint.type_id();
        if let Some(existing) = self.types.get(&type_id) {
            panic!(
                "entity type {:?} collides with already registered {:?}",
                blueprint.name, existing.name
            );
        }

        let mut scratch = World::with_capacity(1);
        let id = scratch.spawn();
        for factory in &blueprint.factories {
            factory(&mut scratch, id);
        }
        blueprint.declared = scratch.component_type_ids(id);

        tracing::debug!(
            entity_type = %blueprint.name,
            hash = %type_id,
            components = blueprint.len(),
            "registered entity type"
        );
        self.types.insert(type_id, blueprint);
        type_id
    }

    /// Returns true if `type_id` is registered.
    #[must_use]
    pub fn contains(&self, type_id: EntityTypeId) -> bool {
        self.types.contains_key(&type_id)
    }

    /// Symbolic name for a registered type.
    #[must_use]
    pub fn name_of(&self, type_id: EntityTypeId) -> Option<&str> {
        self.types.get(&type_id).map(Blueprint::name)
    }

    /// Component types instances of `type_id` are built with.
    #[must_use]
    pub fn declared_components(&self, type_id: EntityTypeId) -> Option<&[TypeId]> {
        self.types.get(&type_id).map(|b| b.declared.as_slice())
    }

    /// Returns true if `type_id` is registered and declares `component`.
    #[must_use]
    pub fn declares(&self, type_id: EntityTypeId, component: TypeId) -> bool {
        self.declared_components(type_id)
            .is_some_and(|declared| declared.binary_search(&component).is_ok())
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Spawns an entity of `type_id`, records its type and runs every
    /// factory in registration order.
    ///
    /// # Panics
    ///
    /// Panics if the type was never registered: that is a configuration bug.
    pub fn instantiate(&self, world: &mut World, type_id: EntityTypeId) -> EntityId {
        let Some(blueprint) = self.types.get(&type_id) else {
            panic!("entity type {type_id} is not registered");
        };

        let id = world.spawn();
        world.set_entity_type(id, type_id);
        for factory in &blueprint.factories {
            factory(world, id);
        }

        tracing::trace!(entity = %id, entity_type = %blueprint.name, "instantiated");
        id
    }

    /// [`instantiate`](Self::instantiate) by symbolic name.
    pub fn instantiate_named(&self, world: &mut World, name: &str) -> EntityId {
        self.instantiate(world, EntityTypeId::of(name))
    }
}

impl fmt::Debug for EntityTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.types.values()).finish()
    }
}
