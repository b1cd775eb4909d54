//! # Snapshot Codec
//!
//! Encodes a replication group's entities into snapshot messages and applies
//! them to a client store.
//!
//! ## Snapshot Kinds
//!
//! ```text
//! REGISTRY_FULL              every entity of the group        (on connect)
//! REGISTRY_NEW_ENTITIES      entities the peer has not seen   (every tick)
//! REGISTRY_COMPONENT_UPDATE  dirty entities the peer has seen (every tick)
//! ```
//!
//! Creation kinds carry the entity type hash and every creation component.
//! Updates carry the group's update components that changed; entities with
//! different change sets go out in separate messages.
//!
//! ## Decoding
//!
//! Decoding validates the whole message before touching the store: a
//! malformed message leaves the client's world exactly as it was, and the
//! caller drops the connection. Data for a component the target entity type
//! does not declare counts as malformed.

mod registry;
mod remap;

pub use registry::{component_hash, ComponentRegistry, NetComponent, ReplicationGroup};
pub use remap::IdRemap;

use slipstream_core::{DeletedEntity, EntityId, EntityTypeId, EntityTypeRegistry, World};

use self::registry::DecodedValue;
use crate::error::{ProtocolError, ProtocolResult};
use crate::protocol::{split_message, MessageKind, WireReader, WireWriter};

/// Which selection a snapshot was built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    /// Every entity of the group.
    Full,
    /// Entities not yet delivered to the peer.
    NewEntities,
    /// Dirty entities already delivered to the peer.
    ComponentUpdate,
}

impl SnapshotKind {
    /// Message kind this snapshot is sent as.
    #[must_use]
    pub const fn message_kind(self) -> MessageKind {
        match self {
            Self::Full => MessageKind::RegistryFull,
            Self::NewEntities => MessageKind::RegistryNewEntities,
            Self::ComponentUpdate => MessageKind::RegistryComponentUpdate,
        }
    }

    /// Snapshot kind of a message kind, if it is one.
    #[must_use]
    pub const fn from_message_kind(kind: MessageKind) -> Option<Self> {
        match kind {
            MessageKind::RegistryFull => Some(Self::Full),
            MessageKind::RegistryNewEntities => Some(Self::NewEntities),
            MessageKind::RegistryComponentUpdate => Some(Self::ComponentUpdate),
            _ => None,
        }
    }

    /// True for kinds that may create entities on the receiver.
    #[must_use]
    pub const fn is_creation(self) -> bool {
        !matches!(self, Self::ComponentUpdate)
    }

    /// Creation kinds must not be lost; updates are superseded next tick.
    #[must_use]
    pub const fn is_reliable(self) -> bool {
        self.is_creation()
    }

    /// Smallest possible record: wire id, plus type hash for creation.
    const fn min_record_size(self) -> usize {
        if self.is_creation() {
            8
        } else {
            4
        }
    }
}

/// Serializes `entities` of `group` as a `kind` snapshot, kind byte
/// included.
///
/// # Panics
///
/// Panics if an entity lacks a listed component or an entity type: the
/// selection must come from [`ReplicationGroup::matching`] or equivalent.
#[must_use]
pub fn encode_snapshot(
    world: &World,
    components: &ComponentRegistry,
    group: &ReplicationGroup,
    kind: SnapshotKind,
    entities: &[EntityId],
) -> Vec<u8> {
    let hashes = if kind.is_creation() {
        group.creation_components()
    } else {
        group.update_components()
    };
    encode_records(world, components, group.name(), kind, hashes, entities)
}

/// Serializes a component update that carries only `hashes`, a subset of a
/// group's update components.
///
/// # Panics
///
/// As [`encode_snapshot`], and if a hash is not registered.
#[must_use]
pub fn encode_component_update(
    world: &World,
    components: &ComponentRegistry,
    group: &ReplicationGroup,
    hashes: &[u32],
    entities: &[EntityId],
) -> Vec<u8> {
    encode_records(
        world,
        components,
        group.name(),
        SnapshotKind::ComponentUpdate,
        hashes,
        entities,
    )
}

fn encode_records(
    world: &World,
    components: &ComponentRegistry,
    group: &str,
    kind: SnapshotKind,
    hashes: &[u32],
    entities: &[EntityId],
) -> Vec<u8> {
    let header_len = u8::try_from(hashes.len())
        .unwrap_or_else(|_| panic!("group {group} lists {} components", hashes.len()));
    let codecs: Vec<_> = hashes
        .iter()
        .map(|&hash| match components.codec(hash) {
            Ok(codec) => *codec,
            Err(_) => panic!("group {group} uses unregistered component {hash:#010x}"),
        })
        .collect();

    let mut writer = WireWriter::with_capacity(6 + hashes.len() * 4 + entities.len() * 32);
    writer.write_u8(kind.message_kind().to_byte());
    writer.write_u8(header_len);
    for &hash in hashes {
        writer.write_u32(hash);
    }
    let count = u32::try_from(entities.len()).unwrap_or(u32::MAX);
    writer.write_u32(count);

    for &id in entities {
        writer.write_u32(id.to_wire());
        if kind.is_creation() {
            let Some(entity_type) = world.entity_type(id) else {
                panic!("entity {id} in snapshot has no entity type");
            };
            writer.write_u32(entity_type.hash());
        }
        for codec in &codecs {
            (codec.encode)(world, id, &mut writer);
        }
    }

    writer.into_bytes()
}

/// What applying a snapshot did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodeReport {
    /// Local entities created from creation records.
    pub created: Vec<EntityId>,
    /// Records applied to existing mirrors.
    pub updated: usize,
    /// Update records for unknown remote IDs, dropped.
    pub dropped: usize,
}

struct DecodedRecord {
    remote: u32,
    entity_type: Option<EntityTypeId>,
    values: Vec<DecodedValue>,
}

/// Validates and applies a snapshot message to a client store.
///
/// Nothing is applied unless the whole message is valid.
///
/// # Errors
///
/// Any framing or content problem is a [`ProtocolError`]; the caller should
/// drop the connection.
pub fn decode_snapshot(
    world: &mut World,
    message: &[u8],
    types: &EntityTypeRegistry,
    components: &ComponentRegistry,
    remap: &mut IdRemap,
) -> ProtocolResult<DecodeReport> {
    let (message_kind, payload) = split_message(message)?;
    let kind = SnapshotKind::from_message_kind(message_kind)
        .ok_or(ProtocolError::UnexpectedMessage(message_kind.to_byte()))?;

    // Pass 1: parse everything.
    let mut reader = WireReader::new(payload);
    let header_len = usize::from(reader.read_u8()?);
    let mut hashes = Vec::with_capacity(header_len);
    let mut codecs = Vec::with_capacity(header_len);
    for _ in 0..header_len {
        let hash = reader.read_u32()?;
        codecs.push(*components.codec(hash)?);
        hashes.push(hash);
    }

    let declared = reader.read_u32()?;
    if (declared as usize).saturating_mul(kind.min_record_size()) > reader.remaining() {
        return Err(ProtocolError::CountMismatch {
            declared,
            available: reader.remaining(),
        });
    }

    let mut records = Vec::with_capacity(declared as usize);
    for _ in 0..declared {
        let remote = reader.read_u32()?;
        let entity_type = if kind.is_creation() {
            let hash = reader.read_u32()?;
            let entity_type = EntityTypeId(hash);
            if !types.contains(entity_type) {
                return Err(ProtocolError::UnknownEntityType(hash));
            }
            Some(entity_type)
        } else {
            None
        };

        // The entity the record lands on must be built with every listed
        // component. Updates for unmapped IDs are dropped later anyway.
        let target = entity_type.or_else(|| {
            remap
                .local(remote)
                .filter(|&local| world.is_alive(local))
                .and_then(|local| world.entity_type(local))
        });
        if let Some(target) = target {
            for (codec, &hash) in codecs.iter().zip(&hashes) {
                if !types.declares(target, codec.type_id) {
                    return Err(ProtocolError::UndeclaredComponent {
                        entity_type: target.hash(),
                        component: hash,
                    });
                }
            }
        }

        let values = codecs
            .iter()
            .map(|codec| (codec.decode)(&mut reader))
            .collect::<ProtocolResult<Vec<_>>>()?;
        records.push(DecodedRecord {
            remote,
            entity_type,
            values,
        });
    }
    reader.finish()?;

    // Pass 2: apply.
    let mut report = DecodeReport::default();
    for record in records {
        let local = resolve(world, types, remap, &record, &mut report);
        let Some(local) = local else {
            report.dropped += 1;
            tracing::debug!(
                remote = record.remote,
                "dropped update for entity never created here"
            );
            continue;
        };
        for (codec, value) in codecs.iter().zip(record.values) {
            (codec.apply)(world, local, value);
        }
    }

    tracing::trace!(
        ?kind,
        created = report.created.len(),
        updated = report.updated,
        dropped = report.dropped,
        "applied snapshot"
    );
    Ok(report)
}

/// Finds or creates the local mirror for a record.
fn resolve(
    world: &mut World,
    types: &EntityTypeRegistry,
    remap: &mut IdRemap,
    record: &DecodedRecord,
    report: &mut DecodeReport,
) -> Option<EntityId> {
    if let Some(local) = remap.local(record.remote) {
        let same_type = record
            .entity_type
            .map_or(true, |t| world.entity_type(local) == Some(t));
        if world.is_alive(local) && same_type {
            report.updated += 1;
            return Some(local);
        }
        // Mirror went away locally, or the wire ID now names a different
        // entity: start over.
        world.despawn(local);
        remap.remove(record.remote);
    }

    let entity_type = record.entity_type?;
    let local = types.instantiate(world, entity_type);
    remap.insert(record.remote, local);
    report.created.push(local);
    Some(local)
}

/// Serializes deleted-entity records, kind byte included.
#[must_use]
pub fn encode_deleted(records: &[DeletedEntity]) -> Vec<u8> {
    let mut writer = WireWriter::with_capacity(5 + records.len() * 8);
    writer.write_u8(MessageKind::RegistryDeletedEntities.to_byte());
    writer.write_u32(u32::try_from(records.len()).unwrap_or(u32::MAX));
    for record in records {
        writer.write_u32(record.id.to_wire());
        writer.write_u32(record.entity_type.hash());
    }
    writer.into_bytes()
}

/// Validates and applies a deleted-entities message.
///
/// Returns how many local mirrors were removed. Unknown remote IDs are
/// ignored: the peer may never have received their creation.
///
/// # Errors
///
/// Returns a [`ProtocolError`] for malformed messages; nothing is removed.
pub fn decode_deleted(
    world: &mut World,
    message: &[u8],
    remap: &mut IdRemap,
) -> ProtocolResult<usize> {
    let (kind, payload) = split_message(message)?;
    if kind != MessageKind::RegistryDeletedEntities {
        return Err(ProtocolError::UnexpectedMessage(kind.to_byte()));
    }

    let mut reader = WireReader::new(payload);
    let declared = reader.read_u32()?;
    if (declared as usize).saturating_mul(8) != reader.remaining() {
        return Err(ProtocolError::CountMismatch {
            declared,
            available: reader.remaining(),
        });
    }

    let mut removed = 0;
    for _ in 0..declared {
        let remote = reader.read_u32()?;
        let entity_type = reader.read_u32()?;
        match remap.remove(remote) {
            Some(local) => {
                if world.despawn(local) {
                    removed += 1;
                }
            }
            None => tracing::trace!(remote, entity_type, "ignored delete for unknown entity"),
        }
    }
    Ok(removed)
}
