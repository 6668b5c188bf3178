//! Per-peer state (§3 data model, §4.2 lifecycle).

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::cookie::CookieKeys;
use crate::crypt::CryptBatch;
use crate::handshake::HandshakeState;
use crate::keypair::KeypairSet;
use crate::timers::TimerSet;

/// A peer's explicit lifecycle state, replacing the "drain workqueue
/// twice" idiom (§9 redesign guidance) with a state the serial-completion
/// stage checks before it transmits or admits a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PeerLifecycle {
    /// Normal operation.
    Live = 0,
    /// Removal has been requested; in-flight batches complete normally but
    /// no new work is scheduled and completed batches are not transmitted.
    Draining = 1,
    /// Fully removed; state has been cleared.
    Dead = 2,
}

impl PeerLifecycle {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Live,
            1 => Self::Draining,
            _ => Self::Dead,
        }
    }
}

/// Per-peer state: handshake, keypair set, endpoint, timers, staged queue,
/// and the two serial completion queues.
pub struct Peer {
    /// Monotonic internal id, used for logging and CPU-affinity hashing
    /// (§4.5).
    pub id: u64,
    /// The peer's static public key.
    pub public_key: [u8; 32],
    /// Precomputed MAC/cookie keys for this peer, derived from its public
    /// key at creation time.
    pub cookie: CookieKeys,

    endpoint: RwLock<Option<SocketAddr>>,
    handshake: Mutex<Option<HandshakeState>>,
    keypairs: RwLock<KeypairSet>,
    staged: Mutex<VecDeque<Vec<u8>>>,
    tx_serial: Mutex<VecDeque<Arc<CryptBatch>>>,
    rx_serial: Mutex<VecDeque<Arc<CryptBatch>>>,

    lifecycle: AtomicU8,
    handshake_attempts: AtomicU32,
    handshake_queued: AtomicBool,

    /// Timer collaborator state for this peer.
    pub timers: TimerSet,
}

impl Peer {
    /// Create a new peer in the [`PeerLifecycle::Live`] state with empty
    /// queues and no handshake or keypairs yet.
    #[must_use]
    pub fn new(id: u64, public_key: [u8; 32]) -> Self {
        let timers = TimerSet::new();
        timers.init();
        Self {
            id,
            cookie: CookieKeys::precompute(&public_key),
            public_key,
            endpoint: RwLock::new(None),
            handshake: Mutex::new(None),
            keypairs: RwLock::new(KeypairSet::default()),
            staged: Mutex::new(VecDeque::new()),
            tx_serial: Mutex::new(VecDeque::new()),
            rx_serial: Mutex::new(VecDeque::new()),
            lifecycle: AtomicU8::new(PeerLifecycle::Live as u8),
            handshake_attempts: AtomicU32::new(0),
            handshake_queued: AtomicBool::new(false),
            timers,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> PeerLifecycle {
        PeerLifecycle::from_u8(self.lifecycle.load(Ordering::Acquire))
    }

    fn set_lifecycle(&self, state: PeerLifecycle) {
        self.lifecycle.store(state as u8, Ordering::Release);
    }

    /// Begin removal: stop timers, clear handshake and keypairs, purge the
    /// staged queue, and mark the peer draining so in-flight batches are
    /// no longer transmitted on completion (§4.2, §9).
    ///
    /// Idempotent: calling this on an already-draining or dead peer is a
    /// safe no-op (§8, "`peer_remove` followed by `peer_remove`... is
    /// safe and a no-op on the second call").
    pub fn begin_removal(&self) {
        if self.lifecycle() != PeerLifecycle::Live {
            return;
        }
        self.set_lifecycle(PeerLifecycle::Draining);
        self.timers.stop();
        if let Some(hs) = self.handshake.lock().unwrap().take() {
            hs.clear();
        }
        self.keypairs.write().unwrap().clear();
        self.staged.lock().unwrap().clear();
    }

    /// Mark the peer fully destroyed once no in-flight work references it.
    /// Safe to call more than once.
    pub fn finish_removal(&self) {
        self.set_lifecycle(PeerLifecycle::Dead);
    }

    /// Current cached endpoint.
    #[must_use]
    pub fn endpoint(&self) -> Option<SocketAddr> {
        *self.endpoint.read().unwrap()
    }

    /// Update the cached endpoint (e.g. after observing a new source
    /// address on an authenticated inbound packet).
    pub fn set_endpoint(&self, addr: SocketAddr) {
        *self.endpoint.write().unwrap() = Some(addr);
    }

    /// Install a fresh in-progress handshake, replacing (and clearing) any
    /// previous one.
    pub fn set_handshake(&self, hs: HandshakeState) {
        let previous = self.handshake.lock().unwrap().replace(hs);
        if let Some(previous) = previous {
            previous.clear();
        }
    }

    /// Run `f` against the in-progress handshake, if any.
    pub fn with_handshake<T>(&self, f: impl FnOnce(&HandshakeState) -> T) -> Option<T> {
        self.handshake.lock().unwrap().as_ref().map(f)
    }

    /// Take and clear the in-progress handshake.
    pub fn take_handshake(&self) -> Option<HandshakeState> {
        self.handshake.lock().unwrap().take()
    }

    /// Run `f` against the keypair set under a read lock.
    pub fn with_keypairs<T>(&self, f: impl FnOnce(&KeypairSet) -> T) -> T {
        f(&self.keypairs.read().unwrap())
    }

    /// Run `f` against the keypair set under a write lock.
    pub fn with_keypairs_mut<T>(&self, f: impl FnOnce(&mut KeypairSet) -> T) -> T {
        f(&mut self.keypairs.write().unwrap())
    }

    /// Push a plaintext datagram onto the staged queue.
    ///
    /// Returns `false` (datagram dropped) if the queue is already at
    /// `max_staged`.
    #[must_use]
    pub fn stage(&self, datagram: Vec<u8>, max_staged: usize) -> bool {
        let mut staged = self.staged.lock().unwrap();
        if staged.len() >= max_staged {
            return false;
        }
        staged.push_back(datagram);
        true
    }

    /// Atomically detach the entire staged queue (§4.4 `drain_staged`).
    #[must_use]
    pub fn take_staged(&self) -> VecDeque<Vec<u8>> {
        std::mem::take(&mut *self.staged.lock().unwrap())
    }

    /// Re-splice datagrams at the head of the staged queue (used when a
    /// drain attempt fails transiently and must not lose data).
    pub fn resplice_staged_front(&self, mut datagrams: VecDeque<Vec<u8>>) {
        let mut staged = self.staged.lock().unwrap();
        while let Some(d) = datagrams.pop_back() {
            staged.push_front(d);
        }
    }

    /// Number of datagrams currently staged.
    #[must_use]
    pub fn staged_len(&self) -> usize {
        self.staged.lock().unwrap().len()
    }

    /// Append a batch to the outbound serial completion queue.
    pub fn push_tx_serial(&self, batch: Arc<CryptBatch>) {
        self.tx_serial.lock().unwrap().push_back(batch);
    }

    /// Append a batch to the inbound serial completion queue.
    pub fn push_rx_serial(&self, batch: Arc<CryptBatch>) {
        self.rx_serial.lock().unwrap().push_back(batch);
    }

    /// Drain every batch from the head of the tx serial queue whose
    /// completion flag is set, stopping at the first unfinished batch
    /// (I4: this is what preserves FIFO ordering under out-of-order
    /// worker completion).
    #[must_use]
    pub fn drain_completed_tx(&self) -> Vec<Arc<CryptBatch>> {
        Self::drain_completed(&self.tx_serial)
    }

    /// Inbound counterpart of [`Self::drain_completed_tx`].
    #[must_use]
    pub fn drain_completed_rx(&self) -> Vec<Arc<CryptBatch>> {
        Self::drain_completed(&self.rx_serial)
    }

    fn drain_completed(queue: &Mutex<VecDeque<Arc<CryptBatch>>>) -> Vec<Arc<CryptBatch>> {
        let mut queue = queue.lock().unwrap();
        let mut ready = Vec::new();
        while let Some(front) = queue.front() {
            if !front.is_complete() {
                break;
            }
            ready.push(queue.pop_front().unwrap());
        }
        ready
    }

    /// Record a handshake initiation attempt; resets the attempt counter
    /// when `is_retry` is false (§4.3 retry accounting).
    pub fn note_handshake_attempt(&self, is_retry: bool) {
        if is_retry {
            self.handshake_attempts.fetch_add(1, Ordering::AcqRel);
        } else {
            self.handshake_attempts.store(0, Ordering::Release);
        }
        self.timers.handshake_initiated();
    }

    /// Number of consecutive retry attempts since the last fresh request.
    #[must_use]
    pub fn handshake_attempts(&self) -> u32 {
        self.handshake_attempts.load(Ordering::Acquire)
    }

    /// Claim the right to enqueue a handshake send for this peer. Returns
    /// `false` if one is already queued, so the caller drops its request
    /// instead of enqueueing a second one (§4.3 dedup of concurrent
    /// requesters).
    #[must_use]
    pub fn try_mark_handshake_queued(&self) -> bool {
        self.handshake_queued
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the claim taken by [`Self::try_mark_handshake_queued`], once
    /// the worker has picked the request up.
    pub fn clear_handshake_queued(&self) {
        self.handshake_queued.store(false, Ordering::Release);
    }
}
