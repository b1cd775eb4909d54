//! # Wire Protocol
//!
//! Every message is framed as one kind byte followed by a payload.
//!
//! ## Message Kinds
//!
//! ```text
//! ┌──────┬───────────────────────────┬─────────────┬──────────────────────────┐
//! │ byte │ kind                      │ channel     │ payload                  │
//! ├──────┼───────────────────────────┼─────────────┼──────────────────────────┤
//! │ 0x00 │ PING                      │ unreliable  │ u32 nonce                │
//! │ 0x01 │ CLIENT_INPUT              │ unreliable  │ ClientInput (16 bytes)   │
//! │ 0x02 │ ENTITY_ID_ASSIGNMENT      │ reliable    │ u32 wire id              │
//! │ 0x03 │ REGISTRY_FULL             │ reliable    │ snapshot                 │
//! │ 0x04 │ REGISTRY_NEW_ENTITIES     │ reliable    │ snapshot                 │
//! │ 0x05 │ REGISTRY_COMPONENT_UPDATE │ unreliable  │ snapshot                 │
//! │ 0x06 │ REGISTRY_DELETED_ENTITIES │ reliable    │ u32 n, n × (id, type)    │
//! │ 0x40+│ EVENT_k                   │ reliable    │ u32 sequence, fields     │
//! └──────┴───────────────────────────┴─────────────┴──────────────────────────┘
//! ```
//!
//! Snapshot payload:
//!
//! ```text
//! u8 component count │ u32 name hash × count │ u32 entity count │ records...
//! record: u32 wire id │ [u32 type hash if creation] │ component fields...
//! ```
//!
//! All numerics are little-endian.

mod packets;
mod serialization;

pub use packets::{split_message, ClientInput, ControlMessage, MessageKind, EVENT_KIND_BASE};
pub use serialization::{SymbolEnum, WireReader, WireWriter};
