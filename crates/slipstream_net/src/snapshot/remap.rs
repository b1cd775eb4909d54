//! Client-side mapping from server wire IDs to local entity handles.

use std::collections::HashMap;

use slipstream_core::EntityId;

/// Remote (server wire ID) to local handle table.
///
/// One per connection. Entries are added when a creation record is applied
/// and removed when a delete for the remote ID arrives.
#[derive(Debug, Default, Clone)]
pub struct IdRemap {
    to_local: HashMap<u32, EntityId>,
    to_remote: HashMap<EntityId, u32>,
}

impl IdRemap {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Local handle for a remote ID.
    #[inline]
    #[must_use]
    pub fn local(&self, remote: u32) -> Option<EntityId> {
        self.to_local.get(&remote).copied()
    }

    /// Remote ID for a local handle.
    #[inline]
    #[must_use]
    pub fn remote(&self, local: EntityId) -> Option<u32> {
        self.to_remote.get(&local).copied()
    }

    /// Records a mapping, replacing any previous one for either side.
    pub fn insert(&mut self, remote: u32, local: EntityId) {
        if let Some(old_local) = self.to_local.insert(remote, local) {
            self.to_remote.remove(&old_local);
        }
        if let Some(old_remote) = self.to_remote.insert(local, remote) {
            if old_remote != remote {
                self.to_local.remove(&old_remote);
            }
        }
    }

    /// Forgets a remote ID, returning the local handle it mapped to.
    pub fn remove(&mut self, remote: u32) -> Option<EntityId> {
        let local = self.to_local.remove(&remote)?;
        self.to_remote.remove(&local);
        Some(local)
    }

    /// Number of mirrored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.to_local.len()
    }

    /// True if nothing is mirrored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_local.is_empty()
    }

    /// Drops every mapping.
    pub fn clear(&mut self) {
        self.to_local.clear();
        self.to_remote.clear();
    }
}
