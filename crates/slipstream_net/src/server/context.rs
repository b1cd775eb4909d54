//! What gameplay systems see during a server tick.

use slipstream_core::{
    despawn_tracked, Component, DirtyTracker, EntityId, EntityTypeId, EntityTypeRegistry, World,
};

use crate::events::{EventOutbox, NetEvent};
use crate::protocol::ClientInput;
use crate::transport::PeerId;

/// A peer's input in effect for this tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeerInput {
    /// Who sent it.
    pub peer: PeerId,
    /// The entity the peer drives.
    pub entity: EntityId,
    /// Latest input received before the tick started.
    pub input: ClientInput,
}

/// Mutable access to the authoritative store for one tick.
///
/// Changes to replicated components must go through [`modify`](Self::modify)
/// or be followed by [`mark_dirty`](Self::mark_dirty); entities must be
/// destroyed through [`despawn`](Self::despawn) so peers hear about it.
pub struct TickContext<'a> {
    /// The authoritative store.
    pub world: &'a mut World,
    /// Change tracking for this tick.
    pub tracker: &'a mut DirtyTracker,
    /// Entity blueprints.
    pub types: &'a EntityTypeRegistry,
    /// Inputs buffered before the tick started.
    pub inputs: &'a [PeerInput],
    events: &'a mut EventOutbox,
    tick: u64,
}

impl<'a> TickContext<'a> {
    pub(super) fn new(
        world: &'a mut World,
        tracker: &'a mut DirtyTracker,
        types: &'a EntityTypeRegistry,
        inputs: &'a [PeerInput],
        events: &'a mut EventOutbox,
        tick: u64,
    ) -> Self {
        Self {
            world,
            tracker,
            types,
            inputs,
            events,
            tick,
        }
    }

    /// Number of the tick being run.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Instantiates an entity type. Peers learn about it through
    /// new-entity snapshots.
    ///
    /// # Panics
    ///
    /// Panics if the type is not registered.
    pub fn spawn(&mut self, entity_type: EntityTypeId) -> EntityId {
        self.types.instantiate(self.world, entity_type)
    }

    /// Instantiates an entity type by name.
    ///
    /// # Panics
    ///
    /// Panics if the type is not registered.
    pub fn spawn_named(&mut self, name: &str) -> EntityId {
        self.types.instantiate_named(self.world, name)
    }

    /// Destroys an entity and queues its delete broadcast.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        despawn_tracked(self.world, self.tracker, id)
    }

    /// Mutable access to a component; that component is marked changed.
    ///
    /// # Panics
    ///
    /// Panics if the entity lacks the component.
    pub fn modify<C: Component>(&mut self, id: EntityId) -> &mut C {
        self.tracker.mark_component::<C>(id);
        self.world.get_mut::<C>(id)
    }

    /// Marks every component of an entity changed after direct world access.
    pub fn mark_dirty(&mut self, id: EntityId) {
        self.tracker.mark_dirty(id);
    }

    /// Queues an event for the end-of-tick broadcast. Returns its sequence.
    pub fn emit<E: NetEvent>(&mut self, event: &E) -> u32 {
        self.events.emit(event)
    }
}
