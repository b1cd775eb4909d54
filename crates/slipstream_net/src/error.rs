//! # Network Error Types
//!
//! Protocol errors end the offending connection and nothing else. Logic
//! errors (missing component, unregistered type) are panics, not variants
//! here.

use thiserror::Error;

use crate::transport::PeerId;

/// Malformed or unexpected data from a peer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Message was empty.
    #[error("empty message")]
    EmptyMessage,

    /// First byte names no known message kind.
    #[error("unknown message kind {0:#04x}")]
    UnknownMessageKind(u8),

    /// Message kind is valid but not expected in this direction.
    #[error("unexpected message kind {0:#04x}")]
    UnexpectedMessage(u8),

    /// Ran out of bytes mid-field.
    #[error("truncated payload: needed {needed} bytes at offset {offset}, {available} left")]
    Truncated {
        /// Offset of the read that failed.
        offset: usize,
        /// Bytes the field needed.
        needed: usize,
        /// Bytes that were left.
        available: usize,
    },

    /// Declared record count cannot fit in the bytes received.
    #[error("declared {declared} records but only {available} bytes follow")]
    CountMismatch {
        /// Count in the header.
        declared: u32,
        /// Bytes left after the header.
        available: usize,
    },

    /// Bytes left over after the last declared record.
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    /// Component name hash with no registered codec.
    #[error("unknown component hash {0:#010x}")]
    UnknownComponent(u32),

    /// Entity type hash with no registered blueprint.
    #[error("unknown entity type hash {0:#010x}")]
    UnknownEntityType(u32),

    /// Component data for an entity type whose blueprint lacks it.
    #[error("entity type {entity_type:#010x} does not declare component {component:#010x}")]
    UndeclaredComponent {
        /// Entity type hash of the target entity.
        entity_type: u32,
        /// Component name hash.
        component: u32,
    },

    /// Enum variant hash that maps to no variant.
    #[error("unknown {enum_name} variant hash {hash:#010x}")]
    UnknownVariant {
        /// Enum being decoded.
        enum_name: &'static str,
        /// Hash received.
        hash: u32,
    },

    /// String field was not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    /// Component header lists more components than the format allows.
    #[error("component header too long: {0} entries")]
    HeaderTooLong(usize),
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Failures of the transport collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No route to the peer (never connected or already gone).
    #[error("peer {0} is not connected")]
    UnknownPeer(PeerId),

    /// Endpoint already has a connection.
    #[error("endpoint is already connected")]
    AlreadyConnected,

    /// Endpoint cannot initiate connections (e.g. the listening side).
    #[error("endpoint cannot connect")]
    CannotConnect,

    /// Nobody is listening.
    #[error("no server is listening")]
    NoListener,
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Why a connecting peer was refused a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The configured client limit is reached.
    #[error("server full ({max} clients)")]
    ServerFull {
        /// Configured limit.
        max: usize,
    },

    /// The peer already has a session.
    #[error("{0} already has a session")]
    DuplicatePeer(PeerId),
}

/// Invalid or unreadable configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// File could not be read.
    #[error("cannot read {path}: {reason}")]
    Io {
        /// Path that was read.
        path: String,
        /// OS error text.
        reason: String,
    },

    /// TOML did not parse or did not match the schema.
    #[error("invalid configuration: {0}")]
    Parse(String),

    /// No blueprint section for the requested entity type.
    #[error("no blueprint for entity type {0}")]
    UnknownBlueprint(String),

    /// Parsed but semantically wrong.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
