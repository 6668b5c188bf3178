//! Peer registry: concurrent lookup by public key and by session index.
//!
//! A cloned [`Arc`] handle is the reference bump of the kref-and-RCU
//! scheme the collaborator surface describes in prose; dropping the last
//! `Arc` is the grace-period reclamation. [`dashmap`] supplies the
//! lock-free concurrent lookup itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand_core::RngCore;

use crate::error::{CoreError, Result};
use crate::peer::Peer;

/// Concurrent peer lookup by static public key and by local session index.
pub struct PeerRegistry {
    by_public_key: DashMap<[u8; 32], Arc<Peer>>,
    by_session_index: DashMap<u32, Arc<Peer>>,
    next_id: AtomicU32,
    max_peers: u32,
}

impl PeerRegistry {
    /// Create an empty registry capped at `max_peers`.
    #[must_use]
    pub fn new(max_peers: u32) -> Self {
        Self {
            by_public_key: DashMap::new(),
            by_session_index: DashMap::new(),
            next_id: AtomicU32::new(1),
            max_peers,
        }
    }

    /// Number of currently registered peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_public_key.len()
    }

    /// Whether the registry holds no peers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_public_key.is_empty()
    }

    /// Insert a newly created peer, rejecting it if the device is already
    /// at `max_peers` or the public key is already registered.
    pub fn insert(&self, peer: Arc<Peer>) -> Result<()> {
        if self.by_public_key.len() as u32 >= self.max_peers {
            return Err(CoreError::PeerCapReached);
        }
        if self.by_public_key.contains_key(&peer.public_key) {
            return Err(CoreError::PeerCapReached);
        }
        self.by_public_key.insert(peer.public_key, peer);
        Ok(())
    }

    /// Look up a peer by its static public key.
    #[must_use]
    pub fn by_public_key(&self, public_key: &[u8; 32]) -> Option<Arc<Peer>> {
        self.by_public_key.get(public_key).map(|e| e.value().clone())
    }

    /// Look up a peer by an active local session index.
    #[must_use]
    pub fn by_session_index(&self, index: u32) -> Option<Arc<Peer>> {
        self.by_session_index.get(&index).map(|e| e.value().clone())
    }

    /// Allocate and register a fresh local session index for `peer`,
    /// rerolling on collision. Returns the chosen index.
    pub fn bind_session_index(&self, peer: Arc<Peer>, rng: &mut dyn RngCore) -> u32 {
        loop {
            let index = rng.next_u32();
            if index == 0 {
                continue;
            }
            if let Entry::Vacant(slot) = self.by_session_index.entry(index) {
                slot.insert(peer);
                return index;
            }
        }
    }

    /// Release a previously bound session index.
    pub fn unbind_session_index(&self, index: u32) {
        self.by_session_index.remove(&index);
    }

    /// Remove a peer by public key, also dropping any session indices that
    /// still point at it. Returns the removed peer, if any.
    pub fn remove(&self, public_key: &[u8; 32]) -> Option<Arc<Peer>> {
        let removed = self.by_public_key.remove(public_key).map(|(_, peer)| peer);
        if let Some(peer) = &removed {
            self.by_session_index.retain(|_, v| !Arc::ptr_eq(v, peer));
        }
        removed
    }

    /// Allocate the next monotonic internal id for a new peer.
    pub fn next_internal_id(&self) -> u64 {
        u64::from(self.next_id.fetch_add(1, Ordering::AcqRel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn peer_with_key(id: u64, key: u8) -> Arc<Peer> {
        Arc::new(Peer::new(id, [key; 32]))
    }

    #[test]
    fn insert_and_lookup_by_public_key() {
        let registry = PeerRegistry::new(10);
        let peer = peer_with_key(1, 7);
        registry.insert(peer.clone()).unwrap();
        assert!(registry.by_public_key(&[7u8; 32]).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn insert_rejects_duplicate_public_key() {
        let registry = PeerRegistry::new(10);
        registry.insert(peer_with_key(1, 7)).unwrap();
        assert!(registry.insert(peer_with_key(2, 7)).is_err());
    }

    #[test]
    fn insert_rejects_beyond_max_peers() {
        let registry = PeerRegistry::new(1);
        registry.insert(peer_with_key(1, 1)).unwrap();
        assert!(matches!(
            registry.insert(peer_with_key(2, 2)),
            Err(CoreError::PeerCapReached)
        ));
    }

    #[test]
    fn session_index_binds_and_releases() {
        let registry = PeerRegistry::new(10);
        let peer = peer_with_key(1, 1);
        registry.insert(peer.clone()).unwrap();
        let mut rng = OsRng;
        let index = registry.bind_session_index(peer.clone(), &mut rng);
        assert!(registry.by_session_index(index).is_some());
        registry.unbind_session_index(index);
        assert!(registry.by_session_index(index).is_none());
    }

    #[test]
    fn remove_clears_both_maps() {
        let registry = PeerRegistry::new(10);
        let peer = peer_with_key(1, 1);
        registry.insert(peer.clone()).unwrap();
        let mut rng = OsRng;
        let index = registry.bind_session_index(peer.clone(), &mut rng);

        let removed = registry.remove(&[1u8; 32]);
        assert!(removed.is_some());
        assert!(registry.by_public_key(&[1u8; 32]).is_none());
        assert!(registry.by_session_index(index).is_none());
    }
}
