//! # SLIPSTREAM Net - Entity-State Replication
//!
//! Keeps an authoritative server's entity store synchronized with any number
//! of clients over a reliable/unreliable transport.
//!
//! ## Architecture
//!
//! - **Protocol**: `[u8 kind][payload]` framing, little-endian primitives
//! - **Snapshots**: creation records (reliable) and update records
//!   (unreliable), built per replication group and per peer
//! - **Sessions**: per-peer delivered sets enforce creation-before-update
//! - **Events**: one-shot notifications, broadcast reliably, deduplicated
//! - **Transport**: a trait; the loopback implementation is for tests
//!
//! ## Consistency Model
//!
//! ```text
//! SERVER                                   CLIENT
//!   |--- ENTITY_ID_ASSIGNMENT (reliable) -->|  which entity it drives
//!   |--- REGISTRY_FULL        (reliable) -->|  first tick after connect
//!   |--- REGISTRY_NEW_ENTITIES(reliable) -->|  entities it has not seen
//!   |--- COMPONENT_UPDATE   (unreliable) -->|  dirty entities it has seen
//!   |--- DELETED_ENTITIES     (reliable) -->|  everyone, seen or not
//!   |<-- CLIENT_INPUT       (unreliable) ---|  latest wins, next tick
//! ```
//!
//! A lost update is never retransmitted: the next change supersedes it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use slipstream_net::{LocalNetwork, ReplicationServer, ServerConfig};
//!
//! let network = LocalNetwork::new();
//! let mut server = ReplicationServer::new(
//!     ServerConfig::default(),
//!     network.listen(),
//!     types,
//!     components,
//!     groups,
//! );
//!
//! loop {
//!     server.poll_network();
//!     server.tick(|ctx| drive_cars(ctx));
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod server;
pub mod session;
pub mod snapshot;
pub mod transport;

// Re-exports for convenience
pub use client::{ClientState, ClientStats, ReplicationClient};
pub use config::{ClientConfig, ReleasePolicy, ServerConfig};
pub use error::{
    ConfigError, ConfigResult, ProtocolError, ProtocolResult, SessionError, TransportError,
    TransportResult,
};
pub use events::{Dispatch, EventDispatcher, EventOutbox, NetEvent};
pub use protocol::{ClientInput, ControlMessage, MessageKind, SymbolEnum, WireReader, WireWriter};
pub use server::{PeerInput, ReplicationServer, TickContext, TickLoop, TickReport};
pub use session::{ReplicationSession, SessionManager};
pub use snapshot::{
    component_hash, decode_deleted, decode_snapshot, encode_component_update, encode_deleted,
    encode_snapshot, ComponentRegistry, DecodeReport, IdRemap, NetComponent, ReplicationGroup,
    SnapshotKind,
};
pub use transport::{
    Channel, LinkConditions, LocalEndpoint, LocalNetwork, PeerId, Transport, TransportEvent,
    TransportStats,
};
