//! The device: ties together the peer registry, static identity, crypt
//! pipeline, and handshake-initiation gate (§3, §4).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, bounded};
use rand_core::RngCore;
use tracing::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::cookie::MAC_SIZE;
use crate::crypt::{CryptBatch, CryptItem, CryptPipeline, Deliver, Direction, RequestHandshake, Transmit};
use crate::error::{CoreError, Result};
use crate::handshake::HandshakeState;
use crate::identity::StaticIdentity;
use crate::keypair::Keypair;
use crate::peer::{Peer, PeerLifecycle};
use crate::registry::PeerRegistry;

/// Depth of the handshake-send queue. Since a peer can have at most one
/// send queued at a time (`Peer::try_mark_handshake_queued` dedups the
/// rest), this only needs to be generous enough that a burst across many
/// peers never blocks a caller.
const HANDSHAKE_SEND_QUEUE_DEPTH: usize = 1024;

/// The handshake-initiation gate (§4.3): rate-limits and coalesces
/// concurrent initiation requests for a given peer.
///
/// The actual build-and-transmit work runs on a dedicated worker thread
/// fed by a bounded channel, mirroring the crypt pipeline's worker-pool
/// pattern, so a caller requesting a handshake (from `drain_staged`'s
/// no-key branch, or the crypt completion step's rekey check) never
/// blocks on socket I/O. If a peer already has a send queued, the extra
/// request is dropped instead of enqueued a second time; the worker
/// re-checks `handshake_retry_allowed` itself before building anything,
/// since time may have passed between enqueue and dequeue.
struct HandshakeGate {
    rekey_timeout: std::time::Duration,
    tx: Sender<(Arc<Peer>, bool)>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HandshakeGate {
    fn new(identity: StaticIdentity, transmit: Arc<dyn Transmit>, rekey_timeout: std::time::Duration) -> Self {
        let (tx, rx) = bounded::<(Arc<Peer>, bool)>(HANDSHAKE_SEND_QUEUE_DEPTH);
        let handle = std::thread::spawn(move || handshake_send_worker(rx, identity, transmit, rekey_timeout));
        Self {
            rekey_timeout,
            tx,
            handle: Mutex::new(Some(handle)),
        }
    }

    fn request(&self, peer: &Arc<Peer>, is_retry: bool) {
        if !peer.timers.handshake_retry_allowed(self.rekey_timeout) {
            return;
        }
        if !peer.try_mark_handshake_queued() {
            return;
        }
        if self.tx.send((peer.clone(), is_retry)).is_err() {
            peer.clear_handshake_queued();
        }
    }
}

impl RequestHandshake for HandshakeGate {
    fn request_handshake(&self, peer: &Arc<Peer>, is_retry: bool) {
        self.request(peer, is_retry);
    }
}

impl Drop for HandshakeGate {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

fn handshake_send_worker(
    rx: Receiver<(Arc<Peer>, bool)>,
    identity: StaticIdentity,
    transmit: Arc<dyn Transmit>,
    rekey_timeout: std::time::Duration,
) {
    for (peer, is_retry) in rx {
        peer.clear_handshake_queued();
        if peer.lifecycle() != PeerLifecycle::Live {
            continue;
        }
        if !peer.timers.handshake_retry_allowed(rekey_timeout) {
            continue;
        }
        let hs = match HandshakeState::new_initiator(&identity) {
            Ok(hs) => hs,
            Err(e) => {
                warn!(error = %e, "failed to start handshake");
                continue;
            }
        };
        let msg1 = match hs.create_initiation() {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "failed to build handshake initiation");
                continue;
            }
        };
        let mut framed = Vec::with_capacity(msg1.len() + MAC_SIZE);
        peer.cookie.add_mac_to_packet(&msg1, &mut framed);
        peer.set_handshake(hs);
        peer.note_handshake_attempt(is_retry);
        debug!(peer_id = peer.id, is_retry, "sending handshake initiation");
        transmit.transmit(&peer, &framed);
    }
}

/// The core data-plane engine: owns the peer registry, the device-wide
/// crypt queues, the static long-term identity, and the lifecycle lock
/// that serializes peer add/remove (§3).
pub struct Device {
    registry: PeerRegistry,
    identity: StaticIdentity,
    config: Arc<DeviceConfig>,
    pipeline: CryptPipeline,
    gate: Arc<HandshakeGate>,
    lifecycle_lock: Mutex<()>,
}

impl Device {
    /// Construct a device with its own static identity, wired to the given
    /// socket and interface collaborators.
    pub fn new(config: DeviceConfig, transmit: Arc<dyn Transmit>, deliver: Arc<dyn Deliver>) -> Result<Self> {
        let identity = StaticIdentity::generate()?;
        Self::with_identity(identity, config, transmit, deliver)
    }

    /// Construct a device from a pre-existing static identity (e.g.
    /// restored from persisted configuration).
    pub fn with_identity(
        identity: StaticIdentity,
        config: DeviceConfig,
        transmit: Arc<dyn Transmit>,
        deliver: Arc<dyn Deliver>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let gate = Arc::new(HandshakeGate::new(identity.clone(), transmit.clone(), config.rekey_timeout));
        let pipeline = CryptPipeline::new(config.clone(), transmit, deliver, gate.clone());
        let registry = PeerRegistry::new(config.max_peers);
        Ok(Self {
            registry,
            identity,
            config,
            pipeline,
            gate,
            lifecycle_lock: Mutex::new(()),
        })
    }

    /// The device's static public key.
    #[must_use]
    pub fn public_key(&self) -> &[u8; 32] {
        self.identity.public_key()
    }

    /// Number of currently registered peers.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.registry.len()
    }

    /// Look up a peer by its static public key.
    #[must_use]
    pub fn peer(&self, public_key: &[u8; 32]) -> Option<Arc<Peer>> {
        self.registry.by_public_key(public_key)
    }

    /// Look up a peer by an active local session index (used to demux
    /// inbound data messages).
    #[must_use]
    pub fn peer_by_session_index(&self, index: u32) -> Option<Arc<Peer>> {
        self.registry.by_session_index(index)
    }

    /// Add a new peer (§4.2 creation): allocate, register in both maps,
    /// and return the handle. Rejects if the device is already at
    /// `max_peers` or the public key is already known.
    pub fn add_peer(&self, public_key: [u8; 32]) -> Result<Arc<Peer>> {
        let _guard = self.lifecycle_lock.lock().unwrap();
        let id = self.registry.next_internal_id();
        let peer = Arc::new(Peer::new(id, public_key));
        self.registry.insert(peer.clone())?;
        info!(peer_id = id, "peer added");
        Ok(peer)
    }

    /// Bind a freshly negotiated local session index to `peer` so inbound
    /// data messages can find it.
    pub fn bind_session_index(&self, peer: Arc<Peer>, rng: &mut dyn RngCore) -> u32 {
        self.registry.bind_session_index(peer, rng)
    }

    /// Remove a peer (§4.2 removal): stop its timers, clear handshake and
    /// keypairs, purge its staged queue, and drop it from both maps.
    /// In-flight crypt batches referencing the peer complete normally but
    /// are not transmitted or delivered, since the serial-completion step
    /// observes [`crate::peer::PeerLifecycle::Draining`] before it acts on
    /// them. Safe to call twice; the second call is a no-op.
    pub fn remove_peer(&self, public_key: &[u8; 32]) -> Result<()> {
        let _guard = self.lifecycle_lock.lock().unwrap();
        let peer = self.registry.remove(public_key).ok_or(CoreError::UnknownPeer)?;
        peer.begin_removal();
        peer.finish_removal();
        info!(peer_id = peer.id, "peer removed");
        Ok(())
    }

    /// Request a handshake initiation with `peer` (§4.3 gate entry point).
    pub fn request_handshake(&self, peer: &Arc<Peer>, is_retry: bool) {
        self.gate.request(peer, is_retry);
    }

    /// Push one plaintext datagram onto `peer`'s staged queue, dropping it
    /// if the queue is already full.
    #[must_use]
    pub fn stage(&self, peer: &Peer, datagram: Vec<u8>) -> bool {
        peer.stage(datagram, self.config.max_staged_packets)
    }

    /// Drain `peer`'s staged queue (§4.4): atomically detach it, acquire a
    /// live sending keypair, assign monotonic nonces, and submit the batch
    /// to the device encrypt queue. If there is no usable key or assigning
    /// a nonce would reach `reject_after_messages`, the staged datagrams
    /// are re-spliced at the head of the queue and a handshake initiation
    /// is requested instead.
    pub fn drain_staged(&self, peer: &Arc<Peer>) {
        let staged = peer.take_staged();
        if staged.is_empty() {
            return;
        }

        let keypair = peer.with_keypairs(|ks| ks.current.clone());
        let keypair = match keypair {
            Some(k) if k.is_usable(self.config.reject_after_time) => k,
            _ => {
                peer.resplice_staged_front(staged);
                self.request_handshake(peer, false);
                return;
            }
        };

        let mut counters = Vec::with_capacity(staged.len());
        let mut hit_boundary = false;
        for _ in 0..staged.len() {
            match keypair.reserve_nonce(self.config.reject_after_messages) {
                Some(counter) => counters.push(counter),
                None => {
                    hit_boundary = true;
                    break;
                }
            }
        }
        if hit_boundary {
            peer.resplice_staged_front(staged);
            self.request_handshake(peer, false);
            return;
        }

        let items: Vec<CryptItem> = staged
            .into_iter()
            .zip(counters)
            .map(|(mut data, counter)| {
                data.resize(crate::wire::padded_len(data.len()), 0);
                CryptItem { counter, data }
            })
            .collect();
        let batch = CryptBatch::new(peer.clone(), keypair, Direction::Encrypt, items);
        self.pipeline.submit_encrypt(batch);
    }

    /// Send a passive keepalive if the staged queue is otherwise empty
    /// (§4.7): enqueue a zero-payload datagram on the staged queue and run
    /// the normal drain, so a keepalive goes through the exact same
    /// key-acquisition, expiry, and no-key/handshake-retry handling as any
    /// other staged datagram instead of duplicating that logic here.
    pub fn send_keepalive(&self, peer: &Arc<Peer>) {
        if peer.staged_len() != 0 {
            return;
        }
        if !peer.stage(Vec::new(), self.config.max_staged_packets) {
            return;
        }
        self.drain_staged(peer);
    }

    /// Submit one inbound ciphertext datagram for decryption under
    /// `peer`'s keypair at local session index `local_index`.
    pub fn submit_decrypt(&self, peer: &Arc<Peer>, local_index: u32, counter: u64, ciphertext: Vec<u8>) -> Result<()> {
        let keypair = peer
            .with_keypairs(|ks| ks.by_local_index(local_index))
            .filter(|k| k.is_usable(self.config.reject_after_time))
            .ok_or(CoreError::NoKey)?;
        let batch = CryptBatch::new(
            peer.clone(),
            keypair,
            Direction::Decrypt,
            vec![CryptItem { counter, data: ciphertext }],
        );
        self.pipeline.submit_decrypt(batch);
        Ok(())
    }

    /// Install a freshly completed handshake's keypair into `peer` (§4.8),
    /// generating the local session index from `rng`.
    pub fn install_keypair(
        &self,
        peer: &Arc<Peer>,
        material: &crate::handshake::SessionMaterial,
        remote_index: u32,
        is_initiator: bool,
        rng: &mut dyn RngCore,
    ) -> u32 {
        let local_index = self.registry.bind_session_index(peer.clone(), rng);
        let keypair = Arc::new(Keypair::from_session_material(material, local_index, remote_index, is_initiator));
        peer.with_keypairs_mut(|ks| ks.promote_forming(keypair));
        peer.timers.session_derived();
        local_index
    }

    /// Drain every peer's staged queue once. Intended to be called from an
    /// administrative-surface poll loop (out of scope here).
    pub fn drain_all_staged(&self, peers: &[Arc<Peer>]) {
        let mut queue: VecDeque<&Arc<Peer>> = peers.iter().collect();
        while let Some(peer) = queue.pop_front() {
            self.drain_staged(peer);
        }
    }
}
