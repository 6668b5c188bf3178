//! Routing/allowed-IPs collaborator surface (§6).
//!
//! The longest-prefix allowed-IPs structure itself is explicitly out of
//! scope (§1); the core only needs something that can answer "which peer
//! owns this address" and "forget this peer" so that interface-side
//! demultiplexing has somewhere to call. This trait is that seam.

use std::net::IpAddr;
use std::sync::Arc;

use crate::peer::Peer;

/// What the core consumes from the allowed-IPs routing table.
pub trait Routing: Send + Sync {
    /// Find the peer that owns `addr`, if any.
    fn lookup(&self, addr: IpAddr) -> Option<Arc<Peer>>;

    /// Remove every route pointing at `peer`.
    fn remove_by_peer(&self, peer: &Arc<Peer>);
}
