//! Peer identity, entity ownership, and owner-gated state.
//!
//! Every avatar is owned by exactly one peer for its whole lifetime. The
//! owner's simulation is authoritative; every other peer holds a mirror.
//! [`Authoritative`] is the single place where that rule is enforced: its
//! value can only be written through [`Authoritative::commit`], which is a
//! no-op on any peer that is not the owner.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of a peer in the session.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u32);

/// Session-wide identifier of a replicated avatar.
///
/// The upper 32 bits hold the owning peer, the lower 32 bits a per-peer
/// counter, so peers can allocate ids without coordination.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkId(pub u64);

impl NetworkId {
    /// Builds the id for the `index`-th avatar spawned by `owner`.
    pub fn compose(owner: PeerId, index: u32) -> Self {
        Self(((owner.0 as u64) << 32) | index as u64)
    }

    /// The peer that allocated this id.
    pub fn allocated_by(self) -> PeerId {
        PeerId((self.0 >> 32) as u32)
    }

    /// Per-peer index of this id.
    pub fn index(self) -> u32 {
        self.0 as u32
    }
}

// ---------------------------------------------------------------------------
// Ownership
// ---------------------------------------------------------------------------

/// Which side of the authority split the local peer is on for one avatar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The local peer simulates this avatar and commits its state.
    Owner,
    /// The local peer only mirrors state received from the owner.
    Remote,
}

/// Owner and local peer for one avatar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    owner: PeerId,
    local: PeerId,
}

impl Ownership {
    /// Creates the ownership record as seen from `local`.
    pub fn new(owner: PeerId, local: PeerId) -> Self {
        Self { owner, local }
    }

    /// The owning peer.
    pub fn owner(&self) -> PeerId {
        self.owner
    }

    /// The peer this record was created on.
    pub fn local(&self) -> PeerId {
        self.local
    }

    /// Returns `true` when the local peer is the owner.
    pub fn is_mine(&self) -> bool {
        self.owner == self.local
    }

    /// The local peer's role.
    pub fn role(&self) -> Role {
        if self.is_mine() {
            Role::Owner
        } else {
            Role::Remote
        }
    }
}

// ---------------------------------------------------------------------------
// Authoritative<T>
// ---------------------------------------------------------------------------

/// A value only the owning peer may change.
#[derive(Debug, Clone, PartialEq)]
pub struct Authoritative<T> {
    value: T,
    role: Role,
}

impl<T> Authoritative<T> {
    /// Wraps `value` for a peer with the given role.
    pub fn new(value: T, role: Role) -> Self {
        Self { value, role }
    }

    /// Read access, available on every peer.
    pub fn get(&self) -> &T {
        &self.value
    }

    /// The role this value was created with.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Runs `f` against the value on the owner. Returns `None` without
    /// touching the value on remote peers.
    pub fn commit<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        match self.role {
            Role::Owner => Some(f(&mut self.value)),
            Role::Remote => None,
        }
    }
}

impl<T: Copy> Authoritative<T> {
    /// Copy of the current value.
    pub fn value(&self) -> T {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_id_compose_roundtrip() {
        let id = NetworkId::compose(PeerId(7), 3);
        assert_eq!(id.allocated_by(), PeerId(7));
        assert_eq!(id.index(), 3);
        assert_ne!(id, NetworkId::compose(PeerId(3), 7));
    }

    #[test]
    fn test_ownership_role() {
        assert_eq!(Ownership::new(PeerId(1), PeerId(1)).role(), Role::Owner);
        let remote = Ownership::new(PeerId(1), PeerId(2));
        assert!(!remote.is_mine());
        assert_eq!(remote.role(), Role::Remote);
        assert_eq!(remote.owner(), PeerId(1));
        assert_eq!(remote.local(), PeerId(2));
    }

    #[test]
    fn test_owner_commit_applies() {
        let mut health = Authoritative::new(100, Role::Owner);
        let after = health.commit(|h| {
            *h -= 10;
            *h
        });
        assert_eq!(after, Some(90));
        assert_eq!(health.value(), 90);
    }

    #[test]
    fn test_remote_commit_is_noop() {
        let mut health = Authoritative::new(100, Role::Remote);
        assert!(health.commit(|h| *h -= 10).is_none());
        assert_eq!(*health.get(), 100);
    }
}
