//! # Loopback Transport
//!
//! In-process transport: one listening endpoint, any number of client
//! endpoints, messages routed through crossbeam channels.
//!
//! [`LinkConditions`] injects the faults a real network produces (lost
//! unreliable packets, duplicated or late reliable ones) so replication
//! behaviour under loss and reordering can be tested deterministically.
//!
//! A held-back reliable message is parked in the hub and handed to the
//! receiver after everything already queued, at its next poll. Whatever was
//! sent after it on either channel therefore arrives first.

use std::collections::BTreeMap;
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use super::{Channel, PeerId, Transport, TransportEvent, TransportStats};
use crate::error::{TransportError, TransportResult};

/// Deterministic fault injection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkConditions {
    /// Drop every N-th unreliable message (network-wide count).
    pub drop_every_nth_unreliable: Option<u32>,
    /// Deliver every reliable message twice.
    pub duplicate_reliable: bool,
    /// Hold back every N-th reliable message (network-wide count) until
    /// the receiver's next poll.
    pub hold_back_every_nth_reliable: Option<u32>,
}

impl LinkConditions {
    /// A perfect link.
    #[must_use]
    pub const fn perfect() -> Self {
        Self {
            drop_every_nth_unreliable: None,
            duplicate_reliable: false,
            hold_back_every_nth_reliable: None,
        }
    }
}

/// Routing table shared by every endpoint of one network.
struct Hub {
    server: Option<Sender<TransportEvent>>,
    clients: BTreeMap<PeerId, Sender<TransportEvent>>,
    next_peer: u32,
    conditions: LinkConditions,
    unreliable_sent: u64,
    reliable_sent: u64,
    /// Held-back messages, keyed by the receiving peer.
    held: Vec<(PeerId, TransportEvent)>,
}

impl Hub {
    /// Decides whether the next unreliable message is lost.
    fn lose_unreliable(&mut self) -> bool {
        self.unreliable_sent += 1;
        self.conditions
            .drop_every_nth_unreliable
            .is_some_and(|n| n > 0 && self.unreliable_sent % u64::from(n) == 0)
    }

    /// Decides whether the next reliable message arrives late.
    fn hold_back_reliable(&mut self) -> bool {
        self.reliable_sent += 1;
        self.conditions
            .hold_back_every_nth_reliable
            .is_some_and(|n| n > 0 && self.reliable_sent % u64::from(n) == 0)
    }

    /// Removes and returns the messages held for `receiver`, oldest first.
    fn release(&mut self, receiver: PeerId) -> Vec<TransportEvent> {
        if self.held.is_empty() {
            return Vec::new();
        }
        let (mine, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.held)
            .into_iter()
            .partition(|(to, _)| *to == receiver);
        self.held = rest;
        mine.into_iter().map(|(_, event)| event).collect()
    }
}

/// An in-memory network. Clone it to hand to other threads.
#[derive(Clone)]
pub struct LocalNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl LocalNetwork {
    /// Creates a network with a perfect link.
    #[must_use]
    pub fn new() -> Self {
        Self::with_conditions(LinkConditions::perfect())
    }

    /// Creates a network with the given fault injection.
    #[must_use]
    pub fn with_conditions(conditions: LinkConditions) -> Self {
        Self {
            hub: Arc::new(Mutex::new(Hub {
                server: None,
                clients: BTreeMap::new(),
                next_peer: 1,
                conditions,
                unreliable_sent: 0,
                reliable_sent: 0,
                held: Vec::new(),
            })),
        }
    }

    /// Changes fault injection for subsequent messages.
    pub fn set_conditions(&self, conditions: LinkConditions) {
        self.hub.lock().conditions = conditions;
    }

    /// Creates the listening endpoint.
    ///
    /// # Panics
    ///
    /// Panics if the network already has a listener.
    #[must_use]
    pub fn listen(&self) -> LocalEndpoint {
        let (tx, rx) = unbounded();
        {
            let mut hub = self.hub.lock();
            assert!(hub.server.is_none(), "local network already has a listener");
            hub.server = Some(tx.clone());
        }
        LocalEndpoint::new(Arc::clone(&self.hub), Role::Server, tx, rx)
    }

    /// Creates an unconnected client endpoint.
    #[must_use]
    pub fn endpoint(&self) -> LocalEndpoint {
        let (tx, rx) = unbounded();
        LocalEndpoint::new(Arc::clone(&self.hub), Role::Client(None), tx, rx)
    }
}

impl Default for LocalNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    Server,
    /// Holds the ID the server knows this client by, once connected.
    Client(Option<PeerId>),
}

/// One side of a [`LocalNetwork`] connection.
pub struct LocalEndpoint {
    hub: Arc<Mutex<Hub>>,
    role: Role,
    inbox_tx: Sender<TransportEvent>,
    inbox: Receiver<TransportEvent>,
    stats: TransportStats,
}

impl LocalEndpoint {
    fn new(
        hub: Arc<Mutex<Hub>>,
        role: Role,
        inbox_tx: Sender<TransportEvent>,
        inbox: Receiver<TransportEvent>,
    ) -> Self {
        Self {
            hub,
            role,
            inbox_tx,
            inbox,
            stats: TransportStats::default(),
        }
    }

    /// ID the server assigned to this client endpoint.
    #[must_use]
    pub const fn local_peer_id(&self) -> Option<PeerId> {
        match self.role {
            Role::Server => None,
            Role::Client(id) => id,
        }
    }

    /// How the hub addresses this endpoint's inbox, once reachable.
    const fn receiver_id(&self) -> Option<PeerId> {
        match self.role {
            Role::Server => Some(PeerId::SERVER),
            Role::Client(id) => id,
        }
    }

    /// Routes one message; `sender` is how the receiver will see us.
    fn route(&mut self, peer: PeerId, channel: Channel, payload: &[u8]) -> TransportResult<()> {
        let mut hub = self.hub.lock();
        let (target, sender) = match self.role {
            Role::Server => (hub.clients.get(&peer).cloned(), PeerId::SERVER),
            Role::Client(Some(me)) if peer == PeerId::SERVER && hub.clients.contains_key(&me) => {
                (hub.server.clone(), me)
            }
            Role::Client(_) => (None, peer),
        };
        let target = target.ok_or(TransportError::UnknownPeer(peer))?;

        let copies = match channel {
            Channel::Unreliable if hub.lose_unreliable() => {
                self.stats.dropped += 1;
                0
            }
            Channel::Reliable if hub.conditions.duplicate_reliable => 2,
            _ => 1,
        };
        let hold = channel == Channel::Reliable && hub.hold_back_reliable();

        self.stats.messages_sent += 1;
        self.stats.bytes_sent += payload.len() as u64;
        let event = TransportEvent::Received {
            peer: sender,
            channel,
            payload: payload.to_vec(),
        };

        if hold {
            // Servers address clients by their ID, clients reach the server.
            let receiver = match self.role {
                Role::Server => peer,
                Role::Client(_) => PeerId::SERVER,
            };
            for _ in 0..copies {
                hub.held.push((receiver, event.clone()));
            }
            tracing::trace!(%receiver, "reliable message held back");
            return Ok(());
        }
        drop(hub);

        for _ in 0..copies {
            target
                .send(event.clone())
                .map_err(|_| TransportError::UnknownPeer(peer))?;
        }
        Ok(())
    }
}

impl Transport for LocalEndpoint {
    fn connect(&mut self) -> TransportResult<PeerId> {
        let Role::Client(current) = self.role else {
            return Err(TransportError::CannotConnect);
        };
        if current.is_some() {
            return Err(TransportError::AlreadyConnected);
        }

        let mut hub = self.hub.lock();
        let server = hub.server.clone().ok_or(TransportError::NoListener)?;
        let id = PeerId(hub.next_peer);
        hub.next_peer += 1;
        hub.clients.insert(id, self.inbox_tx.clone());
        drop(hub);

        server
            .send(TransportEvent::Connected(id))
            .map_err(|_| TransportError::NoListener)?;
        // The inbox lives as long as `self`, so this cannot fail.
        let _ = self.inbox_tx.send(TransportEvent::Connected(PeerId::SERVER));
        self.role = Role::Client(Some(id));

        tracing::debug!(peer = %id, "local endpoint connected");
        Ok(PeerId::SERVER)
    }

    fn disconnect(&mut self, peer: PeerId) {
        let mut hub = self.hub.lock();
        match self.role {
            Role::Server => {
                if let Some(client) = hub.clients.remove(&peer) {
                    let _ = client.send(TransportEvent::Disconnected(PeerId::SERVER));
                }
                hub.held.retain(|(to, _)| *to != peer);
            }
            Role::Client(Some(me)) if peer == PeerId::SERVER => {
                hub.clients.remove(&me);
                hub.held.retain(|(to, _)| *to != me);
                if let Some(server) = &hub.server {
                    let _ = server.send(TransportEvent::Disconnected(me));
                }
                self.role = Role::Client(None);
            }
            Role::Client(_) => {}
        }
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        let mut events: Vec<_> = self.inbox.try_iter().collect();
        if let Some(me) = self.receiver_id() {
            events.extend(self.hub.lock().release(me));
        }
        for event in &events {
            match event {
                TransportEvent::Received { payload, .. } => {
                    self.stats.messages_received += 1;
                    self.stats.bytes_received += payload.len() as u64;
                }
                // Dropped by the server: free to connect again.
                TransportEvent::Disconnected(PeerId::SERVER) if self.role != Role::Server => {
                    self.role = Role::Client(None);
                }
                _ => {}
            }
        }
        events
    }

    fn send_reliable(&mut self, peer: PeerId, payload: &[u8]) -> TransportResult<()> {
        self.route(peer, Channel::Reliable, payload)
    }

    fn send_unreliable(&mut self, peer: PeerId, payload: &[u8]) -> TransportResult<()> {
        self.route(peer, Channel::Unreliable, payload)
    }

    fn broadcast_reliable(&mut self, payload: &[u8]) {
        for peer in self.peers() {
            if let Err(error) = self.send_reliable(peer, payload) {
                tracing::warn!(%peer, %error, "broadcast failed");
            }
        }
    }

    fn peers(&self) -> Vec<PeerId> {
        match self.role {
            Role::Server => self.hub.lock().clients.keys().copied().collect(),
            Role::Client(Some(_)) => vec![PeerId::SERVER],
            Role::Client(None) => Vec::new(),
        }
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}
