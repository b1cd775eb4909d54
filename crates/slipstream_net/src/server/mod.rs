//! # Replication Server
//!
//! The authoritative side: owns the entity store and drives replication to
//! every connected peer.
//!
//! ## Tick Order
//!
//! ```text
//! poll_network()        between ticks: connects, inputs, pings
//! tick(systems):
//!   1. promote buffered inputs
//!   2. run gameplay systems
//!   3. drain dirty set and deleted records
//!   4. per session: FULL (first tick) or NEW_ENTITIES + COMPONENT_UPDATE
//!      (one update per distinct set of changed components, or every
//!      delivered entity on a refresh tick)
//!   5. broadcast deleted records to everyone
//!   6. broadcast queued events
//!   7. sweep deferred disconnects
//! ```
//!
//! Nothing touches the store while a tick is running except the systems
//! themselves.

mod context;
mod tick;

pub use context::{PeerInput, TickContext};
pub use tick::{TickLoop, TickStats, MAX_CATCH_UP};

use std::any::TypeId;

use slipstream_core::{DirtyEntity, DirtyTracker, EntityId, EntityTypeId, EntityTypeRegistry, World};

use crate::config::ServerConfig;
use crate::error::{ProtocolError, ProtocolResult};
use crate::events::EventOutbox;
use crate::protocol::{split_message, ControlMessage, MessageKind};
use crate::session::SessionManager;
use crate::snapshot::{
    encode_component_update, encode_deleted, encode_snapshot, ComponentRegistry, ReplicationGroup,
    SnapshotKind,
};
use crate::transport::{PeerId, Transport, TransportEvent};

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Number of the tick.
    pub tick: u64,
    /// Sessions that received snapshots.
    pub sessions: usize,
    /// Entities marked dirty during the tick.
    pub dirty: usize,
    /// Entities destroyed during the tick.
    pub deleted: usize,
    /// Events broadcast.
    pub events: usize,
    /// Snapshot messages sent.
    pub snapshots: usize,
}

/// The authoritative replication server.
pub struct ReplicationServer<T: Transport> {
    config: ServerConfig,
    transport: T,
    world: World,
    types: EntityTypeRegistry,
    components: ComponentRegistry,
    groups: Vec<ReplicationGroup>,
    tracker: DirtyTracker,
    sessions: SessionManager,
    outbox: EventOutbox,
    /// Number of the next tick to run. The first tick is tick 1.
    tick: u64,
}

impl<T: Transport> ReplicationServer<T> {
    /// Creates a server around a listening transport.
    ///
    /// # Panics
    ///
    /// Panics if the controlled entity type is not registered or a group
    /// names an unregistered component.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        transport: T,
        types: EntityTypeRegistry,
        components: ComponentRegistry,
        groups: Vec<ReplicationGroup>,
    ) -> Self {
        let controlled = EntityTypeId::of(&config.controlled_entity_type);
        assert!(
            types.contains(controlled),
            "controlled entity type {} is not registered",
            config.controlled_entity_type
        );
        for group in &groups {
            for &hash in group.creation_components().iter().chain(group.update_components()) {
                assert!(
                    components.contains(hash),
                    "group {} uses unregistered component {hash:#010x}",
                    group.name()
                );
            }
        }

        tracing::info!(
            tick_rate = config.tick_rate,
            max_clients = config.max_clients,
            groups = groups.len(),
            "replication server ready"
        );

        Self {
            sessions: SessionManager::new(&config, groups.len()),
            config,
            transport,
            world: World::new(),
            types,
            components,
            groups,
            tracker: DirtyTracker::new(),
            outbox: EventOutbox::new(),
            tick: 1,
        }
    }

    /// Number of the next tick to run.
    #[inline]
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Server configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The authoritative store.
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Entity blueprints.
    #[must_use]
    pub const fn types(&self) -> &EntityTypeRegistry {
        &self.types
    }

    /// Connected sessions.
    #[must_use]
    pub const fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// The transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Entity a peer drives, if it has a session.
    #[must_use]
    pub fn controlled_entity(&self, peer: PeerId) -> Option<EntityId> {
        self.sessions.get(peer).map(|s| s.controlled_entity())
    }

    /// Handles everything the transport has received. Never blocks.
    ///
    /// Returns the number of transport events handled.
    pub fn poll_network(&mut self) -> usize {
        let events = self.transport.poll_events();
        let count = events.len();
        for event in events {
            match event {
                TransportEvent::Connected(peer) => self.handle_connect(peer),
                TransportEvent::Disconnected(peer) => {
                    self.sessions.on_disconnect(peer);
                }
                TransportEvent::Received { peer, payload, .. } => {
                    if let Err(error) = self.handle_message(peer, &payload) {
                        tracing::warn!(%peer, %error, "protocol error, dropping peer");
                        self.drop_peer(peer);
                    }
                }
            }
        }
        count
    }

    fn handle_connect(&mut self, peer: PeerId) {
        let session = match self
            .sessions
            .on_connect(peer, &mut self.world, &self.types, self.tick)
        {
            Ok(session) => session,
            Err(error) => {
                tracing::warn!(%peer, %error, "refusing peer");
                self.transport.disconnect(peer);
                return;
            }
        };

        let assignment = ControlMessage::EntityIdAssignment {
            wire_id: session.controlled_entity().to_wire(),
        };
        if let Err(error) = self.transport.send_reliable(peer, &assignment.encode()) {
            tracing::warn!(%peer, %error, "cannot send entity assignment");
            self.sessions.on_disconnect(peer);
        }
    }

    fn handle_message(&mut self, peer: PeerId, message: &[u8]) -> ProtocolResult<()> {
        let (kind, payload) = split_message(message)?;
        if !matches!(kind, MessageKind::Ping | MessageKind::ClientInput) {
            return Err(ProtocolError::UnexpectedMessage(kind.to_byte()));
        }

        match ControlMessage::decode(kind, payload)? {
            ControlMessage::Ping { nonce } => {
                let pong = ControlMessage::Ping { nonce }.encode();
                if let Err(error) = self.transport.send_unreliable(peer, &pong) {
                    tracing::debug!(%peer, %error, "pong not sent");
                }
            }
            ControlMessage::ClientInput(input) => match self.sessions.get_mut(peer) {
                Some(session) => {
                    if !session.buffer_input(input) {
                        tracing::trace!(%peer, sequence = input.sequence, "stale input ignored");
                    }
                }
                None => tracing::trace!(%peer, "input from peer without session"),
            },
            ControlMessage::EntityIdAssignment { .. } => {
                return Err(ProtocolError::UnexpectedMessage(kind.to_byte()));
            }
        }
        Ok(())
    }

    fn drop_peer(&mut self, peer: PeerId) {
        self.transport.disconnect(peer);
        self.sessions.on_disconnect(peer);
    }

    /// Runs one tick: `systems` mutate the store, then every peer is
    /// brought up to date.
    pub fn tick(&mut self, systems: impl FnOnce(&mut TickContext<'_>)) -> TickReport {
        let tick = self.tick;
        let mut report = TickReport {
            tick,
            ..TickReport::default()
        };

        // 1. Inputs buffered since the last tick take effect now.
        let inputs: Vec<PeerInput> = self
            .sessions
            .active_mut()
            .filter_map(|session| {
                session.promote_input().map(|input| PeerInput {
                    peer: session.peer(),
                    entity: session.controlled_entity(),
                    input,
                })
            })
            .collect();

        // 2. Gameplay.
        {
            let mut context = TickContext::new(
                &mut self.world,
                &mut self.tracker,
                &self.types,
                &inputs,
                &mut self.outbox,
                tick,
            );
            systems(&mut context);
        }

        // 3. Collect changes.
        let dirty = self.tracker.drain_changes();
        let deleted = self.tracker.drain_deleted();
        self.sessions.forget_deleted(&deleted);
        report.dirty = dirty.len();
        report.deleted = deleted.len();

        // 4. Per-peer snapshots.
        let (sessions, snapshots) = self.replicate(&dirty, tick);
        report.sessions = sessions;
        report.snapshots = snapshots;

        // 5. Deletes go to everyone, seen or not.
        if !deleted.is_empty() {
            self.transport.broadcast_reliable(&encode_deleted(&deleted));
        }

        // 6. Events.
        for message in self.outbox.drain() {
            self.transport.broadcast_reliable(&message);
            report.events += 1;
        }

        // 7. Deferred disconnects.
        for peer in self.sessions.sweep(&mut self.world, &mut self.tracker) {
            self.transport.disconnect(peer);
        }

        self.tick += 1;
        tracing::trace!(
            tick,
            dirty = report.dirty,
            deleted = report.deleted,
            snapshots = report.snapshots,
            "tick complete"
        );
        report
    }

    /// Sends each active session what it is missing. Returns the number of
    /// sessions served and of snapshot messages sent.
    fn replicate(&mut self, dirty: &[DirtyEntity], tick: u64) -> (usize, usize) {
        let world = &self.world;
        let components = &self.components;
        let groups = &self.groups;
        let transport = &mut self.transport;
        let sessions = &mut self.sessions;
        let refresh_interval = self.config.refresh_interval;

        let matching: Vec<Vec<EntityId>> = groups
            .iter()
            .map(|group| group.matching(world, components))
            .collect();
        let update_types: Vec<Vec<TypeId>> = groups
            .iter()
            .map(|group| components.type_ids(group.update_components()))
            .collect();

        let mut served = 0;
        let mut sent = 0;
        let mut failed = Vec::new();

        'sessions: for session in sessions.active_mut() {
            let peer = session.peer();
            let full = session.is_awaiting_full();
            let refresh = !full && session.take_refresh(tick, refresh_interval);
            served += 1;

            for (index, group) in groups.iter().enumerate() {
                let entities = &matching[index];

                if full {
                    let message =
                        encode_snapshot(world, components, group, SnapshotKind::Full, entities);
                    if let Err(error) = transport.send_reliable(peer, &message) {
                        tracing::warn!(%peer, %error, "full snapshot not sent");
                        failed.push(peer);
                        continue 'sessions;
                    }
                    sent += 1;
                    for &id in entities {
                        session.record_delivered(index, id);
                    }
                    continue;
                }

                // Selected before this tick's creations are marked delivered:
                // an entity is never both created and updated in one tick.
                let updates = if refresh {
                    refresh_batch(group, entities, |id| session.has_delivered(index, id))
                } else {
                    update_batches(world, components, group, &update_types[index], dirty, |id| {
                        session.has_delivered(index, id)
                    })
                };
                let fresh: Vec<EntityId> = entities
                    .iter()
                    .copied()
                    .filter(|&id| !session.has_delivered(index, id))
                    .collect();

                if !fresh.is_empty() {
                    let message = encode_snapshot(
                        world,
                        components,
                        group,
                        SnapshotKind::NewEntities,
                        &fresh,
                    );
                    if let Err(error) = transport.send_reliable(peer, &message) {
                        tracing::warn!(%peer, %error, "new entities not sent");
                        failed.push(peer);
                        continue 'sessions;
                    }
                    sent += 1;
                    for &id in &fresh {
                        session.record_delivered(index, id);
                    }
                }

                for (hashes, ids) in &updates {
                    let message = encode_component_update(world, components, group, hashes, ids);
                    // Unreliable. A lost update is repaired by the next refresh.
                    if let Err(error) = transport.send_unreliable(peer, &message) {
                        tracing::debug!(%peer, %error, "update not sent");
                    } else {
                        sent += 1;
                    }
                }
            }

            if full {
                session.mark_full_sent();
                tracing::debug!(%peer, "full snapshot sent");
            } else if refresh {
                tracing::trace!(%peer, tick, "refreshed update components");
            }
        }

        for peer in failed {
            sessions.on_disconnect(peer);
        }
        (served, sent)
    }

    /// Polls the network and runs ticks at the configured rate until
    /// `ticks` more ticks have run.
    pub fn run_ticks(
        &mut self,
        tick_loop: &mut TickLoop,
        ticks: u64,
        mut systems: impl FnMut(&mut TickContext<'_>),
    ) {
        let mut remaining = ticks;
        while remaining > 0 {
            self.poll_network();
            while remaining > 0 && tick_loop.should_tick() {
                let start = tick_loop.begin_tick();
                self.tick(&mut systems);
                tick_loop.end_tick(start);
                remaining -= 1;
            }
            if remaining > 0 {
                tick_loop.wait_for_next_tick();
            }
        }
    }
}

/// Update components to send, with the entities that changed exactly those.
type UpdateBatch = (Vec<u32>, Vec<EntityId>);

/// Dirty entities the peer has seen, batched by which of the group's update
/// components changed. Batches keep first-marked order.
fn update_batches(
    world: &World,
    components: &ComponentRegistry,
    group: &ReplicationGroup,
    update_types: &[TypeId],
    dirty: &[DirtyEntity],
    delivered: impl Fn(EntityId) -> bool,
) -> Vec<UpdateBatch> {
    let mut batches: Vec<UpdateBatch> = Vec::new();
    for entry in dirty {
        let id = entry.id;
        if !delivered(id) || !world.is_alive(id) || !group.contains(world, components, id) {
            continue;
        }
        let hashes: Vec<u32> = group
            .update_components()
            .iter()
            .zip(update_types)
            .filter(|(_, type_id)| entry.changed.includes(**type_id))
            .map(|(hash, _)| *hash)
            .collect();
        if hashes.is_empty() {
            continue;
        }
        match batches.iter_mut().find(|(batch, _)| *batch == hashes) {
            Some((_, ids)) => ids.push(id),
            None => batches.push((hashes, vec![id])),
        }
    }
    batches
}

/// Every delivered entity of the group, with all update components.
fn refresh_batch(
    group: &ReplicationGroup,
    entities: &[EntityId],
    delivered: impl Fn(EntityId) -> bool,
) -> Vec<UpdateBatch> {
    if group.update_components().is_empty() {
        return Vec::new();
    }
    let ids: Vec<EntityId> = entities.iter().copied().filter(|&id| delivered(id)).collect();
    if ids.is_empty() {
        return Vec::new();
    }
    vec![(group.update_components().to_vec(), ids)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::protocol::{ClientInput, WireReader, WireWriter};
    use crate::snapshot::NetComponent;
    use crate::transport::{LocalEndpoint, LocalNetwork};
    use slipstream_core::{Blueprint, Component};

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Speed(f32);
    impl Component for Speed {}
    impl NetComponent for Speed {
        const NAME: &'static str = "Speed";
        fn encode(&self, writer: &mut WireWriter) {
            writer.write_f32(self.0);
        }
        fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
            Ok(Self(reader.read_f32()?))
        }
    }

    fn server(network: &LocalNetwork, max_clients: usize) -> ReplicationServer<LocalEndpoint> {
        let mut types = EntityTypeRegistry::new();
        types.register(Blueprint::new("KART").with(Speed(0.0)));
        let components = ComponentRegistry::new().with::<Speed>();
        let groups = vec![ReplicationGroup::new("karts").replicate::<Speed>()];
        let config = ServerConfig {
            max_clients,
            controlled_entity_type: "KART".to_owned(),
            ..ServerConfig::default()
        };
        ReplicationServer::new(config, network.listen(), types, components, groups)
    }

    fn kinds(endpoint: &mut LocalEndpoint) -> Vec<u8> {
        endpoint
            .poll_events()
            .into_iter()
            .filter_map(|event| match event {
                TransportEvent::Received { payload, .. } => Some(payload[0]),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_connect_sends_assignment_then_full() {
        let network = LocalNetwork::new();
        let mut server = server(&network, 4);
        let mut client = network.endpoint();
        client.connect().unwrap();

        assert_eq!(server.poll_network(), 1);
        assert_eq!(server.sessions().len(), 1);
        let report = server.tick(|_| {});
        assert_eq!(report.tick, 1);
        assert_eq!(report.snapshots, 1);
        assert_eq!(server.current_tick(), 2);

        assert_eq!(
            kinds(&mut client),
            vec![
                MessageKind::EntityIdAssignment.to_byte(),
                MessageKind::RegistryFull.to_byte()
            ]
        );

        // Nothing changed: nothing to send.
        assert_eq!(server.tick(|_| {}).snapshots, 0);
    }

    #[test]
    fn test_excess_peer_is_refused() {
        let network = LocalNetwork::new();
        let mut server = server(&network, 1);
        let mut first = network.endpoint();
        let mut second = network.endpoint();
        first.connect().unwrap();
        second.connect().unwrap();
        server.poll_network();

        assert_eq!(server.sessions().len(), 1);
        let events = second.poll_events();
        assert!(events.contains(&TransportEvent::Disconnected(PeerId::SERVER)));
        assert_eq!(
            second.send_reliable(PeerId::SERVER, &[0]),
            Err(TransportError::UnknownPeer(PeerId::SERVER))
        );
    }

    #[test]
    fn test_ping_is_echoed() {
        let network = LocalNetwork::new();
        let mut server = server(&network, 4);
        let mut client = network.endpoint();
        client.connect().unwrap();
        client
            .send_unreliable(PeerId::SERVER, &ControlMessage::Ping { nonce: 77 }.encode())
            .unwrap();
        server.poll_network();

        let pong = client.poll_events().into_iter().find_map(|event| match event {
            TransportEvent::Received { payload, .. } if payload[0] == 0 => Some(payload),
            _ => None,
        });
        assert_eq!(pong, Some(ControlMessage::Ping { nonce: 77 }.encode()));
    }

    #[test]
    fn test_inputs_reach_systems_next_tick() {
        let network = LocalNetwork::new();
        let mut server = server(&network, 4);
        let mut client = network.endpoint();
        client.connect().unwrap();
        server.poll_network();
        let peer = client.local_peer_id().unwrap();
        let kart = server.controlled_entity(peer).unwrap();

        let mut input = ClientInput::new(1);
        input.throttle = 1.0;
        client
            .send_unreliable(PeerId::SERVER, &ControlMessage::ClientInput(input).encode())
            .unwrap();

        // Not polled yet: the tick sees nothing.
        server.tick(|ctx| assert!(ctx.inputs.is_empty()));

        server.poll_network();
        server.tick(|ctx| {
            assert_eq!(ctx.inputs.len(), 1);
            assert_eq!(ctx.inputs[0].entity, kart);
            let throttle = ctx.inputs[0].input.throttle;
            ctx.modify::<Speed>(kart).0 += throttle;
        });
        assert_eq!(server.world().get::<Speed>(kart), &Speed(1.0));
    }

    #[test]
    fn test_unexpected_message_drops_peer() {
        let network = LocalNetwork::new();
        let mut server = server(&network, 4);
        let mut client = network.endpoint();
        client.connect().unwrap();
        server.poll_network();
        let peer = client.local_peer_id().unwrap();
        let kart = server.controlled_entity(peer).unwrap();

        client
            .send_reliable(PeerId::SERVER, &[MessageKind::RegistryFull.to_byte(), 0])
            .unwrap();
        server.poll_network();
        assert!(server.sessions().is_disconnecting(peer));

        let report = server.tick(|_| {});
        assert_eq!(report.sessions, 0);
        assert!(server.sessions().is_empty());
        assert!(!server.world().is_alive(kart));
    }

    #[test]
    #[should_panic(expected = "is not registered")]
    fn test_unregistered_controlled_type_panics() {
        let network = LocalNetwork::new();
        let config = ServerConfig::default();
        let _ = ReplicationServer::new(
            config,
            network.listen(),
            EntityTypeRegistry::new(),
            ComponentRegistry::new(),
            Vec::new(),
        );
    }
}
