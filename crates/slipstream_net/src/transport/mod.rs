//! # Transport Layer
//!
//! The connection-oriented reliable/unreliable transport the replication
//! layer runs on. Real network backends live outside this crate; the
//! in-memory [`LocalNetwork`] exists for tests and demos.
//!
//! ## Contract
//!
//! - `poll_events` never blocks
//! - Reliable messages arrive in order, normally exactly once (duplicates
//!   are possible and tolerated above this layer)
//! - Unreliable messages may be dropped

mod local;

pub use local::{LinkConditions, LocalEndpoint, LocalNetwork};

use std::fmt;

use crate::error::TransportResult;

/// Unique identifier for a peer, as seen from one endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u32);

impl PeerId {
    /// The server, as seen from a client.
    pub const SERVER: Self = Self(0);
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Delivery guarantee of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Ordered, retransmitted.
    Reliable,
    /// Fire and forget.
    Unreliable,
}

/// Something that happened on the transport since the last poll.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A peer connected.
    Connected(PeerId),
    /// A peer went away.
    Disconnected(PeerId),
    /// A message arrived.
    Received {
        /// Sender.
        peer: PeerId,
        /// Channel it came on.
        channel: Channel,
        /// Message bytes, kind byte first.
        payload: Vec<u8>,
    },
}

/// Transport statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Messages sent.
    pub messages_sent: u64,
    /// Messages received.
    pub messages_received: u64,
    /// Bytes sent.
    pub bytes_sent: u64,
    /// Bytes received.
    pub bytes_received: u64,
    /// Unreliable messages lost on the way.
    pub dropped: u64,
}

/// The transport collaborator.
pub trait Transport {
    /// Opens a connection to the server. Clients only.
    ///
    /// # Errors
    ///
    /// Fails if already connected, if nobody listens, or if this endpoint
    /// is the listening side.
    fn connect(&mut self) -> TransportResult<PeerId>;

    /// Closes the connection to `peer`. Unknown peers are ignored.
    fn disconnect(&mut self, peer: PeerId);

    /// Takes every event since the last poll. Never blocks.
    fn poll_events(&mut self) -> Vec<TransportEvent>;

    /// Sends on the reliable channel.
    ///
    /// # Errors
    ///
    /// Fails if `peer` is not connected.
    fn send_reliable(&mut self, peer: PeerId, payload: &[u8]) -> TransportResult<()>;

    /// Sends on the unreliable channel.
    ///
    /// # Errors
    ///
    /// Fails if `peer` is not connected.
    fn send_unreliable(&mut self, peer: PeerId, payload: &[u8]) -> TransportResult<()>;

    /// Sends reliably to every connected peer.
    fn broadcast_reliable(&mut self, payload: &[u8]);

    /// Peers currently connected to this endpoint.
    fn peers(&self) -> Vec<PeerId>;

    /// Traffic counters.
    fn stats(&self) -> TransportStats;
}
