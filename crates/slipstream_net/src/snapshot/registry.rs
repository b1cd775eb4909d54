//! # Networked Component Registry
//!
//! Type-erased codecs for every component that crosses the wire, keyed by
//! the hash of the component's name, plus replication groups (the component
//! lists a snapshot is built from).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use slipstream_core::{symbol_hash, Component, EntityId, World};

use crate::error::{ProtocolError, ProtocolResult};
use crate::protocol::{WireReader, WireWriter};

/// A component with a fixed, documented wire layout.
///
/// Implementations write fields in declaration order. `decode` must read
/// exactly what `encode` wrote.
pub trait NetComponent: Component + Sized {
    /// Symbolic name; its hash identifies the component on the wire.
    const NAME: &'static str;

    /// Writes the fields.
    fn encode(&self, writer: &mut WireWriter);

    /// Reads the fields.
    fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self>;
}

/// Decoded but not yet applied component value.
pub(crate) type DecodedValue = Box<dyn Any + Send>;

/// Erased operations for one registered component type.
#[derive(Clone, Copy)]
pub(crate) struct ComponentCodec {
    pub(crate) name: &'static str,
    pub(crate) type_id: TypeId,
    pub(crate) encode: fn(&World, EntityId, &mut WireWriter),
    pub(crate) decode: fn(&mut WireReader<'_>) -> ProtocolResult<DecodedValue>,
    pub(crate) apply: fn(&mut World, EntityId, DecodedValue),
}

fn encode_erased<C: NetComponent>(world: &World, id: EntityId, writer: &mut WireWriter) {
    world.get::<C>(id).encode(writer);
}

fn decode_erased<C: NetComponent>(reader: &mut WireReader<'_>) -> ProtocolResult<DecodedValue> {
    Ok(Box::new(C::decode(reader)?))
}

fn apply_erased<C: NetComponent>(world: &mut World, id: EntityId, value: DecodedValue) {
    match value.downcast::<C>() {
        Ok(value) => world.insert(id, *value),
        Err(_) => unreachable!("decoded value keyed by its own component hash"),
    }
}

/// Name hash of a networked component.
#[must_use]
pub fn component_hash<C: NetComponent>() -> u32 {
    symbol_hash(C::NAME)
}

/// Registry of networked components.
///
/// Built identically on server and client at startup.
#[derive(Default)]
pub struct ComponentRegistry {
    codecs: HashMap<u32, ComponentCodec>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `C`, returning its name hash.
    ///
    /// # Panics
    ///
    /// Panics if another component already uses the same name hash.
    pub fn register<C: NetComponent>(&mut self) -> u32 {
        let hash = component_hash::<C>();
        if let Some(existing) = self.codecs.get(&hash) {
            assert!(
                existing.type_id == TypeId::of::<C>(),
                "component {} collides with {}",
                C::NAME,
                existing.name
            );
            return hash;
        }

        self.codecs.insert(
            hash,
            ComponentCodec {
                name: C::NAME,
                type_id: TypeId::of::<C>(),
                encode: encode_erased::<C>,
                decode: decode_erased::<C>,
                apply: apply_erased::<C>,
            },
        );
        tracing::debug!(component = C::NAME, hash, "registered component");
        hash
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with<C: NetComponent>(mut self) -> Self {
        self.register::<C>();
        self
    }

    /// Returns true if the hash names a registered component.
    #[must_use]
    pub fn contains(&self, hash: u32) -> bool {
        self.codecs.contains_key(&hash)
    }

    /// Component name for a hash.
    #[must_use]
    pub fn name_of(&self, hash: u32) -> Option<&'static str> {
        self.codecs.get(&hash).map(|c| c.name)
    }

    /// Number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    /// True if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    pub(crate) fn codec(&self, hash: u32) -> ProtocolResult<&ComponentCodec> {
        self.codecs
            .get(&hash)
            .ok_or(ProtocolError::UnknownComponent(hash))
    }

    /// Resolves component hashes to store type IDs.
    ///
    /// # Panics
    ///
    /// Panics if a hash is unregistered: groups are built from registered
    /// components at startup.
    pub(crate) fn type_ids(&self, hashes: &[u32]) -> Vec<TypeId> {
        hashes
            .iter()
            .map(|&hash| match self.codecs.get(&hash) {
                Some(codec) => codec.type_id,
                None => panic!("replication group uses unregistered component {hash:#010x}"),
            })
            .collect()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.codecs.values().map(|c| c.name))
            .finish()
    }
}

/// A named set of components replicated together.
///
/// `creation` components select the group's entities and are all sent when
/// an entity is first delivered. `updates` is the subset re-sent when the
/// entity is dirty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicationGroup {
    name: String,
    creation: Vec<u32>,
    updates: Vec<u32>,
}

impl ReplicationGroup {
    /// Starts an empty group.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            creation: Vec::new(),
            updates: Vec::new(),
        }
    }

    /// Adds a component sent at creation and on every update.
    #[must_use]
    pub fn replicate<C: NetComponent>(mut self) -> Self {
        let hash = component_hash::<C>();
        self.push_creation(hash);
        if !self.updates.contains(&hash) {
            self.updates.push(hash);
        }
        self
    }

    /// Adds a component sent at creation only.
    #[must_use]
    pub fn create_only<C: NetComponent>(mut self) -> Self {
        self.push_creation(component_hash::<C>());
        self
    }

    fn push_creation(&mut self, hash: u32) {
        if !self.creation.contains(&hash) {
            self.creation.push(hash);
        }
    }

    /// Group name, for logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Components written into creation snapshots, in order.
    #[must_use]
    pub fn creation_components(&self) -> &[u32] {
        &self.creation
    }

    /// Components written into update snapshots, in order.
    #[must_use]
    pub fn update_components(&self) -> &[u32] {
        &self.updates
    }

    /// Entities carrying every creation component and a recorded entity
    /// type, in store order.
    #[must_use]
    pub fn matching(&self, world: &World, components: &ComponentRegistry) -> Vec<EntityId> {
        let type_ids = components.type_ids(&self.creation);
        world
            .view_by_type_ids(&type_ids)
            .iter()
            .filter(|&id| world.entity_type(id).is_some())
            .collect()
    }

    /// Returns true if `id` is alive and carries every creation component.
    #[must_use]
    pub fn contains(&self, world: &World, components: &ComponentRegistry, id: EntityId) -> bool {
        world.entity_type(id).is_some()
            && components
                .type_ids(&self.creation)
                .into_iter()
                .all(|type_id| world.has_type_id(id, type_id))
    }
}
