//! # Replication Sessions
//!
//! Per-peer replication state on the server.
//!
//! ## Lifecycle
//!
//! ```text
//! Connected    -> on_connect: controlled entity assigned, awaiting full
//! first tick   -> one REGISTRY_FULL per group, session becomes established
//! later ticks  -> NEW_ENTITIES for undelivered, COMPONENT_UPDATE for dirty
//! refresh      -> every N ticks, COMPONENT_UPDATE for everything delivered
//! Disconnected -> on_disconnect: queued
//! end of tick  -> sweep: session removed, controlled entity released
//! ```
//!
//! A session only receives updates for entities whose creation it has been
//! sent. That is what the per-group delivered sets are for.

use std::collections::{BTreeMap, HashSet};

use slipstream_core::{
    despawn_tracked, DeletedEntity, DirtyTracker, EntityId, EntityTypeId, EntityTypeRegistry,
    World,
};

use crate::config::{ReleasePolicy, ServerConfig};
use crate::error::SessionError;
use crate::protocol::ClientInput;
use crate::transport::PeerId;

/// Replication state of one connected peer.
#[derive(Debug)]
pub struct ReplicationSession {
    /// Peer this session belongs to.
    peer: PeerId,
    /// Entity the peer drives.
    controlled: EntityId,
    /// True until the first full snapshot has been sent.
    awaiting_full: bool,
    /// Entities whose creation was sent, one set per replication group.
    delivered: Vec<HashSet<EntityId>>,
    /// Newest input received since the last tick started.
    pending_input: Option<ClientInput>,
    /// Input in effect for the current tick.
    latest_input: Option<ClientInput>,
    /// Server tick at which the session was created.
    connected_at_tick: u64,
    /// Tick of the last full resend of update components.
    last_refresh_tick: u64,
}

impl ReplicationSession {
    fn new(peer: PeerId, controlled: EntityId, group_count: usize, tick: u64) -> Self {
        Self {
            peer,
            controlled,
            awaiting_full: true,
            delivered: vec![HashSet::new(); group_count],
            pending_input: None,
            latest_input: None,
            connected_at_tick: tick,
            last_refresh_tick: tick,
        }
    }

    /// Peer this session belongs to.
    #[inline]
    #[must_use]
    pub const fn peer(&self) -> PeerId {
        self.peer
    }

    /// Entity the peer drives.
    #[inline]
    #[must_use]
    pub const fn controlled_entity(&self) -> EntityId {
        self.controlled
    }

    /// Tick at which the peer connected.
    #[must_use]
    pub const fn connected_at_tick(&self) -> u64 {
        self.connected_at_tick
    }

    /// True until the first full snapshot has gone out.
    #[must_use]
    pub const fn is_awaiting_full(&self) -> bool {
        self.awaiting_full
    }

    /// Marks the full snapshot as sent.
    pub fn mark_full_sent(&mut self) {
        self.awaiting_full = false;
    }

    /// Returns true, and restarts the count, if `interval` ticks have passed
    /// since the last refresh. An interval of zero never refreshes.
    pub fn take_refresh(&mut self, tick: u64, interval: u32) -> bool {
        if interval == 0 || tick.saturating_sub(self.last_refresh_tick) < u64::from(interval) {
            return false;
        }
        self.last_refresh_tick = tick;
        true
    }

    /// Records that the peer has been sent `id`'s creation in `group`,
    /// which makes the entity eligible for update-only snapshots.
    ///
    /// # Panics
    ///
    /// Panics if `group` is not a valid group index.
    pub fn record_delivered(&mut self, group: usize, id: EntityId) {
        self.delivered[group].insert(id);
    }

    /// Returns true if `id`'s creation in `group` has been sent.
    #[must_use]
    pub fn has_delivered(&self, group: usize, id: EntityId) -> bool {
        self.delivered.get(group).is_some_and(|set| set.contains(&id))
    }

    /// Number of entities delivered in `group`.
    #[must_use]
    pub fn delivered_count(&self, group: usize) -> usize {
        self.delivered.get(group).map_or(0, HashSet::len)
    }

    /// Forgets a destroyed entity in every group.
    fn forget(&mut self, id: EntityId) {
        for set in &mut self.delivered {
            set.remove(&id);
        }
    }

    /// Buffers an input for the next tick.
    ///
    /// Only the newest input (by sequence) is kept; older or repeated ones
    /// are ignored. Returns true if `input` was kept.
    pub fn buffer_input(&mut self, input: ClientInput) -> bool {
        let newest = self.pending_input.or(self.latest_input);
        let is_newer = newest.map_or(true, |current| {
            let diff = input.sequence.wrapping_sub(current.sequence);
            diff != 0 && diff < 0x8000_0000
        });
        if is_newer {
            self.pending_input = Some(input);
        }
        is_newer
    }

    /// Makes the buffered input current. Called once at the start of a tick.
    pub fn promote_input(&mut self) -> Option<ClientInput> {
        if let Some(input) = self.pending_input.take() {
            self.latest_input = Some(input);
        }
        self.latest_input
    }

    /// Input in effect for the current tick.
    #[must_use]
    pub const fn latest_input(&self) -> Option<ClientInput> {
        self.latest_input
    }
}

/// All sessions of a server, plus deferred disconnects and the idle pool.
#[derive(Debug)]
pub struct SessionManager {
    sessions: BTreeMap<PeerId, ReplicationSession>,
    pending_disconnects: Vec<PeerId>,
    idle_pool: Vec<EntityId>,
    controlled_type: EntityTypeId,
    release_policy: ReleasePolicy,
    max_clients: usize,
    group_count: usize,
}

impl SessionManager {
    /// Creates an empty manager for `group_count` replication groups.
    #[must_use]
    pub fn new(config: &ServerConfig, group_count: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            pending_disconnects: Vec::new(),
            idle_pool: Vec::new(),
            controlled_type: EntityTypeId::of(&config.controlled_entity_type),
            release_policy: config.release_policy,
            max_clients: config.max_clients,
            group_count,
        }
    }

    /// Creates a session for `peer` and assigns it a controlled entity.
    ///
    /// An idle entity is reused if one is still alive, otherwise a new
    /// entity of the controlled type is instantiated.
    ///
    /// # Errors
    ///
    /// Refuses the peer when the client limit is reached or it already has
    /// a session. Nothing is spawned in that case.
    ///
    /// # Panics
    ///
    /// Panics if the controlled entity type is not registered.
    pub fn on_connect(
        &mut self,
        peer: PeerId,
        world: &mut World,
        types: &EntityTypeRegistry,
        tick: u64,
    ) -> Result<&mut ReplicationSession, SessionError> {
        if self.sessions.contains_key(&peer) {
            return Err(SessionError::DuplicatePeer(peer));
        }
        if self.sessions.len() >= self.max_clients {
            return Err(SessionError::ServerFull {
                max: self.max_clients,
            });
        }

        let controlled = match self.take_idle(world) {
            Some(id) => {
                tracing::debug!(%peer, entity = %id, "reusing idle entity");
                id
            }
            None => types.instantiate(world, self.controlled_type),
        };

        tracing::info!(%peer, entity = %controlled, tick, "session opened");
        let session = ReplicationSession::new(peer, controlled, self.group_count, tick);
        Ok(self.sessions.entry(peer).or_insert(session))
    }

    fn take_idle(&mut self, world: &World) -> Option<EntityId> {
        while let Some(id) = self.idle_pool.pop() {
            if world.is_alive(id) {
                return Some(id);
            }
        }
        None
    }

    /// Queues `peer` for removal at the end of the tick.
    ///
    /// Returns false if the peer has no session or is already queued.
    pub fn on_disconnect(&mut self, peer: PeerId) -> bool {
        if !self.sessions.contains_key(&peer) || self.pending_disconnects.contains(&peer) {
            return false;
        }
        tracing::debug!(%peer, "disconnect queued");
        self.pending_disconnects.push(peer);
        true
    }

    /// Returns true if `peer` is queued for removal.
    #[must_use]
    pub fn is_disconnecting(&self, peer: PeerId) -> bool {
        self.pending_disconnects.contains(&peer)
    }

    /// Removes queued sessions and releases their controlled entities.
    ///
    /// Destroyed entities are recorded in `tracker` so the delete reaches
    /// every peer on the next tick. Returns the removed peers.
    pub fn sweep(&mut self, world: &mut World, tracker: &mut DirtyTracker) -> Vec<PeerId> {
        let peers = std::mem::take(&mut self.pending_disconnects);
        for &peer in &peers {
            let Some(session) = self.sessions.remove(&peer) else {
                continue;
            };
            let entity = session.controlled;
            match self.release_policy {
                ReleasePolicy::Destroy => {
                    despawn_tracked(world, tracker, entity);
                }
                ReleasePolicy::IdlePool => {
                    if world.is_alive(entity) {
                        self.idle_pool.push(entity);
                    }
                }
            }
            tracing::info!(%peer, %entity, policy = ?self.release_policy, "session closed");
        }
        peers
    }

    /// Drops destroyed entities from every session's delivered sets.
    pub fn forget_deleted(&mut self, deleted: &[DeletedEntity]) {
        if deleted.is_empty() {
            return;
        }
        for session in self.sessions.values_mut() {
            for record in deleted {
                session.forget(record.id);
            }
        }
        self.idle_pool
            .retain(|id| deleted.iter().all(|record| record.id != *id));
    }

    /// Session of `peer`.
    #[must_use]
    pub fn get(&self, peer: PeerId) -> Option<&ReplicationSession> {
        self.sessions.get(&peer)
    }

    /// Mutable session of `peer`.
    pub fn get_mut(&mut self, peer: PeerId) -> Option<&mut ReplicationSession> {
        self.sessions.get_mut(&peer)
    }

    /// Every session, ordered by peer.
    pub fn iter(&self) -> impl Iterator<Item = &ReplicationSession> {
        self.sessions.values()
    }

    /// Every session, ordered by peer.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ReplicationSession> {
        self.sessions.values_mut()
    }

    /// Sessions not queued for removal, ordered by peer.
    pub fn active_mut(&mut self) -> impl Iterator<Item = &mut ReplicationSession> {
        let closing = &self.pending_disconnects;
        self.sessions
            .values_mut()
            .filter(move |session| !closing.contains(&session.peer))
    }

    /// Number of sessions, including ones queued for removal.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True if no peer has a session.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Entities waiting in the idle pool.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle_pool.len()
    }
}
