//! Device-wide crypt pipeline: parallel encrypt/decrypt worker pools feeding
//! per-peer serial completion (§4.5).
//!
//! The worker pool is real OS-thread parallelism dispatched from
//! `crossbeam-channel` bounded channels, not cooperative async tasks, so
//! CPU-bound AEAD work stays off the reactor used for socket I/O.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, bounded};
use wraith_crypto::aead::TAG_SIZE;

use crate::config::DeviceConfig;
use crate::keypair::Keypair;
use crate::peer::{Peer, PeerLifecycle};

/// Which direction a [`CryptBatch`] travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Plaintext staged datagrams being encrypted for transmission.
    Encrypt,
    /// Ciphertext datagrams from the socket being decrypted for delivery.
    Decrypt,
}

/// One datagram inside a batch. `counter` is the nonce assigned at
/// submission time; `data` holds the input bytes until processed, then the
/// output bytes.
pub struct CryptItem {
    /// Nonce assigned at submission time, before parallel crypt.
    pub counter: u64,
    /// Input bytes before processing; output bytes after.
    pub data: Vec<u8>,
}

/// A unit submitted to the device-wide pipeline: a pointer-stable reference
/// to the owning peer, the keypair to use, a list of datagrams, and a
/// completion flag. The batch is the ordering unit — datagrams within a
/// batch preserve their submission order, and a batch is only surfaced on
/// the peer's serial queue in submission order relative to other batches,
/// but encryption of any batch may run on any worker thread.
pub struct CryptBatch {
    peer: Arc<Peer>,
    keypair: Arc<Keypair>,
    direction: Direction,
    items: Mutex<Vec<CryptItem>>,
    complete: AtomicBool,
}

impl CryptBatch {
    /// Build a new, not-yet-processed batch.
    #[must_use]
    pub fn new(
        peer: Arc<Peer>,
        keypair: Arc<Keypair>,
        direction: Direction,
        items: Vec<CryptItem>,
    ) -> Arc<Self> {
        Arc::new(Self {
            peer,
            keypair,
            direction,
            items: Mutex::new(items),
            complete: AtomicBool::new(false),
        })
    }

    /// The peer this batch belongs to.
    #[must_use]
    pub fn peer(&self) -> &Arc<Peer> {
        &self.peer
    }

    /// The keypair this batch was encrypted or decrypted under.
    #[must_use]
    pub fn keypair(&self) -> &Arc<Keypair> {
        &self.keypair
    }

    /// Encrypt or decrypt, per [`Direction`].
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Whether every datagram in this batch has been processed (I4: the
    /// serial-completion step only surfaces batches with this set).
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Run the AEAD operation over every item, dropping any datagram whose
    /// operation fails (`CryptoFailure`, §7: "drop that datagram only;
    /// batch continues") and leaving the others in submission order, then
    /// marks the batch complete. Idempotent if called more than once, but
    /// callers only ever call it once per batch.
    fn process(&self) {
        let mut items = self.items.lock().unwrap();
        items.retain_mut(|item| {
            let outcome = match self.direction {
                Direction::Encrypt => self.keypair.encrypt(item.counter, &item.data),
                Direction::Decrypt => self.keypair.decrypt(item.counter, &item.data),
            };
            match outcome {
                Ok(bytes) => {
                    item.data = bytes;
                    true
                }
                Err(_) => false,
            }
        });
        drop(items);
        self.complete.store(true, Ordering::Release);
    }

    /// Take the final datagrams. Only meaningful once [`Self::is_complete`]
    /// is true.
    #[must_use]
    pub fn take_items(&self) -> Vec<CryptItem> {
        std::mem::take(&mut *self.items.lock().unwrap())
    }
}

/// What the encrypt-side serial completion stage hands finished datagrams
/// to (the socket collaborator, §6 — out of scope here).
pub trait Transmit: Send + Sync {
    /// Send one already-encrypted datagram to `peer`'s endpoint.
    fn transmit(&self, peer: &Peer, datagram: &[u8]);
}

/// What the decrypt-side serial completion stage hands finished plaintext
/// to (the virtual interface collaborator, out of scope here).
pub trait Deliver: Send + Sync {
    /// Deliver one decrypted plaintext datagram, originating from `peer`,
    /// to the local interface.
    fn deliver(&self, peer: &Peer, datagram: &[u8]);
}

/// What the outbound serial completion stage calls into when a keypair's
/// key-freshness check (§4.5) says a fresh handshake is due.
pub trait RequestHandshake: Send + Sync {
    /// Ask for a handshake initiation with this peer; `is_retry` mirrors the
    /// gate's own retry-accounting contract.
    fn request_handshake(&self, peer: &Arc<Peer>, is_retry: bool);
}

fn affinity_index(peer_id: u64, pools: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    peer_id.hash(&mut hasher);
    (hasher.finish() as usize) % pools.max(1)
}

fn crypt_worker_loop(rx: Receiver<Arc<CryptBatch>>, completion_txs: Vec<Sender<Arc<CryptBatch>>>) {
    for batch in rx {
        batch.process();
        let idx = affinity_index(batch.peer().id, completion_txs.len());
        let _ = completion_txs[idx].send(batch);
    }
}

/// Drains exactly the batches the serial-completion step is responsible
/// for, in FIFO order, and hands their datagrams to the right collaborator.
/// Skips transmission/delivery entirely once the peer has left
/// [`PeerLifecycle::Live`] (scenario: peer removed while batches are
/// mid-encryption — they still complete, but are not transmitted).
fn run_completion(
    peer: &Arc<Peer>,
    direction: Direction,
    transmit: &dyn Transmit,
    deliver: &dyn Deliver,
    rekey: &dyn RequestHandshake,
    config: &DeviceConfig,
) {
    let ready = match direction {
        Direction::Encrypt => peer.drain_completed_tx(),
        Direction::Decrypt => peer.drain_completed_rx(),
    };
    for batch in ready {
        peer.timers.any_authenticated_packet_traversal();
        let live = peer.lifecycle() == PeerLifecycle::Live;
        let keypair = batch.keypair().clone();
        let items = batch.take_items();
        if !live {
            continue;
        }
        match direction {
            Direction::Encrypt => {
                // A keepalive's plaintext is empty, so its ciphertext is
                // exactly a tag (§4.7: traversal is stamped for every
                // authenticated datagram above, but data_sent only for
                // ones that actually carry a payload, so a keepalive-only
                // connection doesn't perpetually reset its own idle clock).
                let carries_payload = items.iter().any(|item| item.data.len() > TAG_SIZE);
                if carries_payload {
                    peer.timers.data_sent();
                }
                for item in items {
                    transmit.transmit(peer, &item.data);
                }
                if keypair.needs_rekey(config.rekey_after_messages, config.rekey_after_time) {
                    rekey.request_handshake(peer, false);
                }
            }
            Direction::Decrypt => {
                if !items.is_empty() {
                    let is_next = peer
                        .with_keypairs(|ks| ks.next.as_ref().is_some_and(|n| Arc::ptr_eq(n, &keypair)));
                    if is_next {
                        peer.with_keypairs_mut(crate::keypair::KeypairSet::promote_next_to_current);
                    }
                }
                for item in items {
                    deliver.deliver(peer, &item.data);
                }
            }
        }
    }
}

fn completion_worker_loop(
    rx: Receiver<Arc<CryptBatch>>,
    transmit: Arc<dyn Transmit>,
    deliver: Arc<dyn Deliver>,
    rekey: Arc<dyn RequestHandshake>,
    config: Arc<DeviceConfig>,
) {
    for batch in rx {
        let peer = batch.peer().clone();
        run_completion(&peer, batch.direction(), transmit.as_ref(), deliver.as_ref(), rekey.as_ref(), &config);
    }
}

/// The device-wide encrypt and decrypt worker pools, plus the
/// CPU-affinity-hashed completion pools that run each peer's serial
/// drain (§4.5).
pub struct CryptPipeline {
    encrypt_tx: Sender<Arc<CryptBatch>>,
    decrypt_tx: Sender<Arc<CryptBatch>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl CryptPipeline {
    /// Spawn the worker pools. `worker_threads` (from [`DeviceConfig`])
    /// controls both the crypt pool size and the completion pool size;
    /// `None` uses the number of available CPUs.
    #[must_use]
    pub fn new(
        config: Arc<DeviceConfig>,
        transmit: Arc<dyn Transmit>,
        deliver: Arc<dyn Deliver>,
        rekey: Arc<dyn RequestHandshake>,
    ) -> Self {
        let workers = config.worker_threads.unwrap_or_else(num_cpus::get).max(1);

        let (encrypt_tx, encrypt_rx) = bounded::<Arc<CryptBatch>>(config.max_staged_packets);
        let (decrypt_tx, decrypt_rx) = bounded::<Arc<CryptBatch>>(config.max_staged_packets);

        let mut completion_txs = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers * 3);

        for _ in 0..workers {
            let (tx, rx) = bounded::<Arc<CryptBatch>>(config.max_staged_packets);
            completion_txs.push(tx);
            let transmit = transmit.clone();
            let deliver = deliver.clone();
            let rekey = rekey.clone();
            let config = config.clone();
            handles.push(std::thread::spawn(move || {
                completion_worker_loop(rx, transmit, deliver, rekey, config)
            }));
        }

        for _ in 0..workers {
            let rx = encrypt_rx.clone();
            let txs = completion_txs.clone();
            handles.push(std::thread::spawn(move || crypt_worker_loop(rx, txs)));
        }
        for _ in 0..workers {
            let rx = decrypt_rx.clone();
            let txs = completion_txs.clone();
            handles.push(std::thread::spawn(move || crypt_worker_loop(rx, txs)));
        }

        Self {
            encrypt_tx,
            decrypt_tx,
            handles: Mutex::new(handles),
        }
    }

    /// Submit a batch for encryption: appends it to the peer's serial tx
    /// queue (so completion can find it) and to the device encrypt queue
    /// (so a worker can process it).
    pub fn submit_encrypt(&self, batch: Arc<CryptBatch>) {
        batch.peer().push_tx_serial(batch.clone());
        let _ = self.encrypt_tx.send(batch);
    }

    /// Decrypt counterpart of [`Self::submit_encrypt`].
    pub fn submit_decrypt(&self, batch: Arc<CryptBatch>) {
        batch.peer().push_rx_serial(batch.clone());
        let _ = self.decrypt_tx.send(batch);
    }
}

impl Drop for CryptPipeline {
    fn drop(&mut self) {
        for handle in self.handles.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
    }
}
