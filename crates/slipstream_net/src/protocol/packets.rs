//! # Message Definitions
//!
//! Message kinds and the small fixed-layout control messages.
//!
//! Snapshot and event payloads are built by the codec and event modules;
//! this file only knows their kind bytes.

use bytemuck::{Pod, Zeroable};

use super::serialization::{WireReader, WireWriter};
use crate::error::{ProtocolError, ProtocolResult};

/// First kind byte reserved for events: event `k` is sent as `0x40 + k`.
pub const EVENT_KIND_BASE: u8 = 0x40;

/// Kind byte at the start of every message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Bidirectional: latency probe, echoed by the server.
    Ping,
    /// Client -> Server: latest input.
    ClientInput,
    /// Server -> Client: which entity the client drives.
    EntityIdAssignment,
    /// Server -> Client: every entity of a group.
    RegistryFull,
    /// Server -> Client: entities the client has not seen yet.
    RegistryNewEntities,
    /// Server -> Client: changed components of known entities.
    RegistryComponentUpdate,
    /// Server -> Client: entities destroyed this tick.
    RegistryDeletedEntities,
    /// Server -> Client: one-shot event of the given event kind.
    Event(u8),
}

impl MessageKind {
    /// Parses a kind byte.
    pub fn from_byte(byte: u8) -> ProtocolResult<Self> {
        Ok(match byte {
            0 => Self::Ping,
            1 => Self::ClientInput,
            2 => Self::EntityIdAssignment,
            3 => Self::RegistryFull,
            4 => Self::RegistryNewEntities,
            5 => Self::RegistryComponentUpdate,
            6 => Self::RegistryDeletedEntities,
            b if b >= EVENT_KIND_BASE => Self::Event(b - EVENT_KIND_BASE),
            b => return Err(ProtocolError::UnknownMessageKind(b)),
        })
    }

    /// The kind byte.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Ping => 0,
            Self::ClientInput => 1,
            Self::EntityIdAssignment => 2,
            Self::RegistryFull => 3,
            Self::RegistryNewEntities => 4,
            Self::RegistryComponentUpdate => 5,
            Self::RegistryDeletedEntities => 6,
            Self::Event(kind) => EVENT_KIND_BASE + kind,
        }
    }
}

/// Splits a message into its kind and payload.
pub fn split_message(message: &[u8]) -> ProtocolResult<(MessageKind, &[u8])> {
    let (&first, payload) = message.split_first().ok_or(ProtocolError::EmptyMessage)?;
    Ok((MessageKind::from_byte(first)?, payload))
}

/// Driver input - Client -> Server.
///
/// The server keeps only the latest one per peer and applies it at the start
/// of the next tick.
///
/// Size: 16 bytes
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ClientInput {
    /// Client's local sequence number for this input.
    pub sequence: u32,
    /// Throttle, -1.0 (full reverse) to 1.0.
    pub throttle: f32,
    /// Steering, -1.0 (left) to 1.0 (right).
    pub steering: f32,
    /// Input flags (brake, boost, launch).
    pub flags: u8,
    /// Padding for alignment.
    pub _padding: [u8; 3],
}

impl ClientInput {
    /// Size in bytes.
    pub const SIZE: usize = 16;

    /// Input flag: Brake.
    pub const FLAG_BRAKE: u8 = 1 << 0;
    /// Input flag: Boost.
    pub const FLAG_BOOST: u8 = 1 << 1;
    /// Input flag: Launch a rocket.
    pub const FLAG_LAUNCH: u8 = 1 << 2;

    /// Creates a neutral input.
    #[inline]
    #[must_use]
    pub const fn new(sequence: u32) -> Self {
        Self {
            sequence,
            throttle: 0.0,
            steering: 0.0,
            flags: 0,
            _padding: [0; 3],
        }
    }

    /// Checks if brake is pressed.
    #[inline]
    #[must_use]
    pub const fn is_braking(&self) -> bool {
        self.flags & Self::FLAG_BRAKE != 0
    }

    /// Checks if boost is pressed.
    #[inline]
    #[must_use]
    pub const fn is_boosting(&self) -> bool {
        self.flags & Self::FLAG_BOOST != 0
    }

    /// Checks if a launch was requested.
    #[inline]
    #[must_use]
    pub const fn is_launching(&self) -> bool {
        self.flags & Self::FLAG_LAUNCH != 0
    }
}

/// Fixed-layout messages outside the snapshot and event families.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ControlMessage {
    /// Latency probe with an opaque nonce.
    Ping {
        /// Echoed back unchanged.
        nonce: u32,
    },
    /// Driver input.
    ClientInput(ClientInput),
    /// Wire ID of the entity the receiving client controls.
    EntityIdAssignment {
        /// Server handle packed with `EntityId::to_wire`.
        wire_id: u32,
    },
}

impl ControlMessage {
    /// Kind byte for this message.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Ping { .. } => MessageKind::Ping,
            Self::ClientInput(_) => MessageKind::ClientInput,
            Self::EntityIdAssignment { .. } => MessageKind::EntityIdAssignment,
        }
    }

    /// Serializes the message, kind byte included.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = WireWriter::with_capacity(1 + ClientInput::SIZE);
        writer.write_u8(self.kind().to_byte());
        match self {
            Self::Ping { nonce } => writer.write_u32(*nonce),
            Self::ClientInput(input) => writer.write_pod(input),
            Self::EntityIdAssignment { wire_id } => writer.write_u32(*wire_id),
        }
        writer.into_bytes()
    }

    /// Parses the payload of a control message of `kind`.
    ///
    /// Returns `UnexpectedMessage` for snapshot and event kinds.
    pub fn decode(kind: MessageKind, payload: &[u8]) -> ProtocolResult<Self> {
        let mut reader = WireReader::new(payload);
        let message = match kind {
            MessageKind::Ping => Self::Ping {
                nonce: reader.read_u32()?,
            },
            MessageKind::ClientInput => Self::ClientInput(reader.read_pod()?),
            MessageKind::EntityIdAssignment => Self::EntityIdAssignment {
                wire_id: reader.read_u32()?,
            },
            other => return Err(ProtocolError::UnexpectedMessage(other.to_byte())),
        };
        reader.finish()?;
        Ok(message)
    }
}
