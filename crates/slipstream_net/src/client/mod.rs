//! # Replication Client
//!
//! Mirrors the server's replicated entities into a local store.
//!
//! ## Message Handling
//!
//! ```text
//! ENTITY_ID_ASSIGNMENT      remember which remote entity we drive
//! REGISTRY_*                decode into the local world through the remap
//! REGISTRY_DELETED_ENTITIES remove mirrors (unknown IDs ignored)
//! EVENT_*                   run subscribed handlers once per sequence
//! PING                      pong from the server
//! ```
//!
//! Any protocol error closes the connection. The local world keeps whatever
//! was applied before the bad message; the bad message itself applies
//! nothing.

use slipstream_core::{EntityId, EntityTypeRegistry, World};

use crate::config::ClientConfig;
use crate::error::{ProtocolError, ProtocolResult, TransportResult};
use crate::events::{Dispatch, EventDispatcher};
use crate::protocol::{split_message, ClientInput, ControlMessage, MessageKind};
use crate::snapshot::{decode_deleted, decode_snapshot, ComponentRegistry, IdRemap, SnapshotKind};
use crate::transport::{PeerId, Transport, TransportEvent};

/// Client state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClientState {
    /// Not connected.
    #[default]
    Disconnected,
    /// Connection requested, not yet confirmed.
    Connecting,
    /// Connected and receiving snapshots.
    Connected,
}

/// Client-side replication counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Snapshot messages applied.
    pub snapshots: u64,
    /// Mirrors created.
    pub created: u64,
    /// Records applied to existing mirrors.
    pub updated: u64,
    /// Updates dropped because their entity was never created here.
    pub dropped_updates: u64,
    /// Mirrors removed by delete messages.
    pub deleted: u64,
    /// Events delivered to handlers.
    pub events: u64,
    /// Duplicate events suppressed.
    pub duplicate_events: u64,
}

/// A replication client over any [`Transport`].
pub struct ReplicationClient<T: Transport> {
    transport: T,
    world: World,
    types: EntityTypeRegistry,
    components: ComponentRegistry,
    remap: IdRemap,
    dispatcher: EventDispatcher,
    state: ClientState,
    /// Wire ID of the entity we drive, once assigned.
    controlled_remote: Option<u32>,
    input_sequence: u32,
    last_pong: Option<u32>,
    last_error: Option<ProtocolError>,
    stats: ClientStats,
}

impl<T: Transport> ReplicationClient<T> {
    /// Creates a disconnected client.
    ///
    /// `types` and `components` must describe the same entity types and
    /// networked components as the server's.
    #[must_use]
    pub fn new(
        config: &ClientConfig,
        transport: T,
        types: EntityTypeRegistry,
        components: ComponentRegistry,
    ) -> Self {
        Self {
            transport,
            world: World::new(),
            types,
            components,
            remap: IdRemap::new(),
            dispatcher: EventDispatcher::new(config.event_dedup_window),
            state: ClientState::Disconnected,
            controlled_remote: None,
            input_sequence: 0,
            last_pong: None,
            last_error: None,
            stats: ClientStats::default(),
        }
    }

    /// Connects to the server. The local mirror starts over empty.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if the connection cannot be opened.
    pub fn connect(&mut self) -> TransportResult<()> {
        self.transport.connect()?;
        self.world = World::new();
        self.remap.clear();
        self.dispatcher.reset_sequences();
        self.controlled_remote = None;
        self.last_error = None;
        self.state = ClientState::Connecting;
        tracing::info!("connecting to server");
        Ok(())
    }

    /// Closes the connection.
    pub fn disconnect(&mut self) {
        self.transport.disconnect(PeerId::SERVER);
        self.state = ClientState::Disconnected;
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> ClientState {
        self.state
    }

    /// The local mirror.
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// The local mirror, for client-only components.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Remote to local ID table.
    #[must_use]
    pub const fn remap(&self) -> &IdRemap {
        &self.remap
    }

    /// Event routing, for subscribing handlers.
    pub fn dispatcher_mut(&mut self) -> &mut EventDispatcher {
        &mut self.dispatcher
    }

    /// Counters.
    #[must_use]
    pub const fn stats(&self) -> &ClientStats {
        &self.stats
    }

    /// The error that closed the last connection, if any.
    #[must_use]
    pub const fn last_error(&self) -> Option<&ProtocolError> {
        self.last_error.as_ref()
    }

    /// Nonce of the most recent pong.
    #[must_use]
    pub const fn last_pong(&self) -> Option<u32> {
        self.last_pong
    }

    /// The transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Local mirror of the entity this client drives.
    ///
    /// `None` until both the assignment and the entity's creation have
    /// arrived.
    #[must_use]
    pub fn controlled_entity(&self) -> Option<EntityId> {
        self.controlled_remote
            .and_then(|remote| self.remap.local(remote))
    }

    /// Handles everything the transport has received. Never blocks.
    ///
    /// Returns the number of messages applied.
    ///
    /// # Errors
    ///
    /// On a protocol error the connection is closed, remaining messages are
    /// discarded and the error is returned.
    pub fn poll_network(&mut self) -> ProtocolResult<usize> {
        let mut applied = 0;
        for event in self.transport.poll_events() {
            match event {
                TransportEvent::Connected(_) => {
                    self.state = ClientState::Connected;
                    tracing::info!("connected");
                }
                TransportEvent::Disconnected(_) => {
                    self.state = ClientState::Disconnected;
                    tracing::info!("disconnected by server");
                }
                TransportEvent::Received { payload, .. } => {
                    if self.state == ClientState::Disconnected {
                        continue;
                    }
                    if let Err(error) = self.handle_message(&payload) {
                        tracing::warn!(%error, "protocol error, disconnecting");
                        self.disconnect();
                        self.last_error = Some(error.clone());
                        return Err(error);
                    }
                    applied += 1;
                }
            }
        }
        Ok(applied)
    }

    fn handle_message(&mut self, message: &[u8]) -> ProtocolResult<()> {
        let (kind, payload) = split_message(message)?;
        match kind {
            MessageKind::Ping | MessageKind::EntityIdAssignment => {
                match ControlMessage::decode(kind, payload)? {
                    ControlMessage::Ping { nonce } => self.last_pong = Some(nonce),
                    ControlMessage::EntityIdAssignment { wire_id } => {
                        tracing::debug!(wire_id, "controlled entity assigned");
                        self.controlled_remote = Some(wire_id);
                    }
                    ControlMessage::ClientInput(_) => {
                        return Err(ProtocolError::UnexpectedMessage(kind.to_byte()));
                    }
                }
            }
            MessageKind::ClientInput => {
                return Err(ProtocolError::UnexpectedMessage(kind.to_byte()));
            }
            MessageKind::RegistryFull
            | MessageKind::RegistryNewEntities
            | MessageKind::RegistryComponentUpdate => {
                let report = decode_snapshot(
                    &mut self.world,
                    message,
                    &self.types,
                    &self.components,
                    &mut self.remap,
                )?;
                self.stats.snapshots += 1;
                self.stats.created += report.created.len() as u64;
                self.stats.updated += report.updated as u64;
                self.stats.dropped_updates += report.dropped as u64;
                if let Some(SnapshotKind::Full) = SnapshotKind::from_message_kind(kind) {
                    tracing::debug!(entities = report.created.len() + report.updated, "full snapshot applied");
                }
            }
            MessageKind::RegistryDeletedEntities => {
                let removed = decode_deleted(&mut self.world, message, &mut self.remap)?;
                self.stats.deleted += removed as u64;
            }
            MessageKind::Event(_) => match self.dispatcher.dispatch(message)? {
                Dispatch::Delivered => self.stats.events += 1,
                Dispatch::Duplicate => self.stats.duplicate_events += 1,
            },
        }
        Ok(())
    }

    /// Sends an input, stamping the next sequence number.
    ///
    /// Inputs travel unreliably; the server keeps only the newest.
    ///
    /// # Errors
    ///
    /// Fails if not connected.
    pub fn send_input(&mut self, mut input: ClientInput) -> TransportResult<u32> {
        self.input_sequence = self.input_sequence.wrapping_add(1);
        input.sequence = self.input_sequence;
        self.transport
            .send_unreliable(PeerId::SERVER, &ControlMessage::ClientInput(input).encode())?;
        Ok(input.sequence)
    }

    /// Sends a latency probe.
    ///
    /// # Errors
    ///
    /// Fails if not connected.
    pub fn ping(&mut self, nonce: u32) -> TransportResult<()> {
        self.transport
            .send_unreliable(PeerId::SERVER, &ControlMessage::Ping { nonce }.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use slipstream_core::{Blueprint, Component};

    use crate::events::{EventOutbox, NetEvent};
    use crate::protocol::{WireReader, WireWriter};
    use crate::snapshot::NetComponent;
    use crate::transport::{LocalEndpoint, LocalNetwork};

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Fuel(f32);
    impl Component for Fuel {}
    impl NetComponent for Fuel {
        const NAME: &'static str = "Fuel";
        fn encode(&self, writer: &mut WireWriter) {
            writer.write_f32(self.0);
        }
        fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
            Ok(Self(reader.read_f32()?))
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Refuel(f32);
    impl NetEvent for Refuel {
        const KIND: u8 = 9;
        const NAME: &'static str = "Refuel";
        fn encode(&self, writer: &mut WireWriter) {
            writer.write_f32(self.0);
        }
        fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
            Ok(Self(reader.read_f32()?))
        }
    }

    fn client(network: &LocalNetwork) -> ReplicationClient<LocalEndpoint> {
        let mut types = EntityTypeRegistry::new();
        types.register(Blueprint::new("TANKER").with(Fuel(0.0)));
        ReplicationClient::new(
            &ClientConfig::default(),
            network.endpoint(),
            types,
            ComponentRegistry::new().with::<Fuel>(),
        )
    }

    fn connected(network: &LocalNetwork) -> (ReplicationClient<LocalEndpoint>, LocalEndpoint, PeerId) {
        let mut server = network.listen();
        let mut client = client(network);
        client.connect().unwrap();
        assert_eq!(client.state(), ClientState::Connecting);
        client.poll_network().unwrap();
        assert_eq!(client.state(), ClientState::Connected);

        let peer = match server.poll_events().as_slice() {
            [TransportEvent::Connected(peer)] => *peer,
            other => panic!("unexpected events {other:?}"),
        };
        (client, server, peer)
    }

    #[test]
    fn test_assignment_resolves_after_creation() {
        let network = LocalNetwork::new();
        let (mut client, mut server, peer) = connected(&network);

        let assignment = ControlMessage::EntityIdAssignment { wire_id: 7 }.encode();
        server.send_reliable(peer, &assignment).unwrap();
        assert_eq!(client.poll_network(), Ok(1));
        assert_eq!(client.controlled_entity(), None);
    }

    #[test]
    fn test_server_sending_input_is_protocol_error() {
        let network = LocalNetwork::new();
        let (mut client, mut server, peer) = connected(&network);

        let input = ControlMessage::ClientInput(ClientInput::new(1)).encode();
        server.send_reliable(peer, &input).unwrap();
        server.send_reliable(peer, &ControlMessage::Ping { nonce: 1 }.encode()).unwrap();

        assert_eq!(
            client.poll_network(),
            Err(ProtocolError::UnexpectedMessage(MessageKind::ClientInput.to_byte()))
        );
        assert_eq!(client.state(), ClientState::Disconnected);
        assert!(client.last_error().is_some());
        // The ping after the bad message was discarded.
        assert_eq!(client.last_pong(), None);
        assert!(server.poll_events().contains(&TransportEvent::Disconnected(peer)));
    }

    #[test]
    fn test_send_input_stamps_sequence() {
        let network = LocalNetwork::new();
        let (mut client, mut server, _) = connected(&network);

        assert_eq!(client.send_input(ClientInput::default()), Ok(1));
        assert_eq!(client.send_input(ClientInput::new(99)), Ok(2));

        let sequences: Vec<u32> = server
            .poll_events()
            .into_iter()
            .filter_map(|event| match event {
                TransportEvent::Received { payload, .. } => {
                    let (kind, body) = split_message(&payload).ok()?;
                    match ControlMessage::decode(kind, body).ok()? {
                        ControlMessage::ClientInput(input) => Some(input.sequence),
                        _ => None,
                    }
                }
                _ => None,
            })
            .collect();
        assert_eq!(sequences, vec![1, 2]);
    }

    #[test]
    fn test_send_before_connect_fails() {
        let network = LocalNetwork::new();
        let _server = network.listen();
        let mut client = client(&network);
        assert!(client.ping(1).is_err());
        assert_eq!(client.state(), ClientState::Disconnected);
    }

    #[test]
    fn test_reconnect_forgets_event_sequences() {
        let network = LocalNetwork::new();
        let (mut client, mut server, peer) = connected(&network);
        let litres = Arc::new(Mutex::new(0.0));
        let sink = Arc::clone(&litres);
        client
            .dispatcher_mut()
            .subscribe(move |refuel: &Refuel| *sink.lock() += refuel.0);

        let mut outbox = EventOutbox::new();
        outbox.emit(&Refuel(20.0));
        let message = outbox.drain().remove(0);
        server.send_reliable(peer, &message).unwrap();
        client.poll_network().unwrap();
        assert_eq!(*litres.lock(), 20.0);

        // A restarted server numbers its events from 1 again.
        client.disconnect();
        server.poll_events();
        client.connect().unwrap();
        client.poll_network().unwrap();
        let peer = match server.poll_events().as_slice() {
            [TransportEvent::Connected(peer)] => *peer,
            other => panic!("unexpected events {other:?}"),
        };
        server.send_reliable(peer, &message).unwrap();
        client.poll_network().unwrap();
        assert_eq!(*litres.lock(), 40.0);
    }
}
