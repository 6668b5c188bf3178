//! Per-keypair session state and the {forming, next, current, previous,
//! invalid} lifecycle (§4.6, §4.8).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use wraith_crypto::SessionKeys;
use wraith_crypto::aead::{AeadKey, Nonce, ReplayProtection};

use crate::config::{REJECT_AFTER_MESSAGES, REJECT_AFTER_TIME};
use crate::handshake::SessionMaterial;

/// A single session keypair: one sending key, one receiving key, and the
/// counters/timers that gate their use.
///
/// The sending counter is atomic per I1 ("strictly monotonic... assigned
/// value observed by exactly one datagram"). The receive side pairs a
/// [`ReplayProtection`] window with its own mutex, since admission is a
/// read-modify-write over the bitmap rather than a single atomic op.
pub struct Keypair {
    send_key: AeadKey,
    recv_key: AeadKey,
    send_salt: [u8; 16],
    recv_salt: [u8; 16],
    send_counter: AtomicU64,
    replay: std::sync::Mutex<ReplayProtection>,
    birth: Instant,
    /// Local session index, used by the wire format to demux inbound data.
    pub local_index: u32,
    /// Remote session index, stamped on outbound data headers.
    pub remote_index: u32,
    /// Whether this device was the initiator of the handshake that
    /// produced this keypair (used by the initiator-only rekey-by-time
    /// check in §4.5).
    pub is_initiator: bool,
    valid: AtomicBool,
}

impl Keypair {
    /// Build a keypair from completed handshake material.
    ///
    /// `local_index`/`remote_index` are the session indices negotiated
    /// during the handshake (out of scope here; supplied by the caller).
    #[must_use]
    pub fn from_session_material(
        material: &SessionMaterial,
        local_index: u32,
        remote_index: u32,
        is_initiator: bool,
    ) -> Self {
        Self::from_keys(&material.keys, local_index, remote_index, is_initiator)
    }

    /// Build a keypair directly from derived [`SessionKeys`].
    #[must_use]
    pub fn from_keys(
        keys: &SessionKeys,
        local_index: u32,
        remote_index: u32,
        is_initiator: bool,
    ) -> Self {
        let mut send_salt = [0u8; 16];
        let mut recv_salt = [0u8; 16];
        send_salt.copy_from_slice(&keys.chain_key[0..16]);
        recv_salt.copy_from_slice(&keys.chain_key[16..32]);
        Self {
            send_key: AeadKey::new(keys.send_key),
            recv_key: AeadKey::new(keys.recv_key),
            send_salt,
            recv_salt,
            send_counter: AtomicU64::new(0),
            replay: std::sync::Mutex::new(ReplayProtection::new()),
            birth: Instant::now(),
            local_index,
            remote_index,
            is_initiator,
            valid: AtomicBool::new(true),
        }
    }

    /// Whether this keypair is still usable (I3).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Mark the keypair invalid; it must never encrypt or decrypt again.
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    /// Age of this keypair.
    #[must_use]
    pub fn age(&self) -> std::time::Duration {
        self.birth.elapsed()
    }

    /// Current value of the send counter without incrementing it.
    #[must_use]
    pub fn send_counter(&self) -> u64 {
        self.send_counter.load(Ordering::Acquire)
    }

    /// Atomically reserve the next nonce for an outbound datagram.
    ///
    /// Returns `None` (and invalidates the keypair) if assigning it would
    /// reach `reject_after_messages` (the boundary behaviour in §8: "A
    /// drain that would assign nonce == REJECT_AFTER_MESSAGES marks the
    /// key invalid").
    pub fn reserve_nonce(&self, reject_after_messages: u64) -> Option<u64> {
        let counter = self.send_counter.fetch_add(1, Ordering::AcqRel);
        if counter >= reject_after_messages {
            self.invalidate();
            return None;
        }
        Some(counter)
    }

    /// Whether a handshake should be requested because this keypair is
    /// aging past `rekey_after_messages` or (initiator only)
    /// `rekey_after_time` (§4.5 key freshness check).
    #[must_use]
    pub fn needs_rekey(&self, rekey_after_messages: u64, rekey_after_time: std::time::Duration) -> bool {
        if self.send_counter() > rekey_after_messages {
            return true;
        }
        self.is_initiator && self.age() > rekey_after_time
    }

    /// Whether this keypair has aged past `reject_after_time` (§4.6).
    #[must_use]
    pub fn is_expired(&self, reject_after_time: std::time::Duration) -> bool {
        self.age() > reject_after_time
    }

    /// Whether this keypair may still be used to encrypt or decrypt: valid,
    /// and not yet past `reject_after_time` since birth. A keypair found
    /// past its age limit is invalidated on the spot, the same way
    /// [`Self::reserve_nonce`] invalidates one that reaches its message
    /// limit — age, like the counter, is checked at every use rather than
    /// by a separate background sweep.
    #[must_use]
    pub fn is_usable(&self, reject_after_time: std::time::Duration) -> bool {
        if self.is_expired(reject_after_time) {
            self.invalidate();
            return false;
        }
        self.is_valid()
    }

    /// Encrypt one datagram under this keypair's send key at `counter`.
    pub fn encrypt(&self, counter: u64, plaintext: &[u8]) -> Result<Vec<u8>, wraith_crypto::CryptoError> {
        let nonce = Nonce::from_counter(counter, &self.send_salt);
        let commitment = self.send_key.commitment();
        self.send_key.encrypt(&nonce, plaintext, &commitment)
    }

    /// Decrypt one datagram under this keypair's receive key, admitting
    /// `counter` through the replay window first.
    pub fn decrypt(&self, counter: u64, ciphertext: &[u8]) -> Result<Vec<u8>, wraith_crypto::CryptoError> {
        {
            let mut replay = self.replay.lock().unwrap();
            if !replay.check_and_update(counter) {
                return Err(wraith_crypto::CryptoError::ReplayDetected);
            }
        }
        let nonce = Nonce::from_counter(counter, &self.recv_salt);
        let commitment = self.recv_key.commitment();
        self.recv_key.decrypt(&nonce, ciphertext, &commitment)
    }
}

/// The three-slot keypair set carried by a peer (§3, §4.8).
///
/// Transitions are applied under a single write lock held by the caller
/// (see [`crate::peer::Peer`]); this type only encodes the slot
/// relationships, not the locking discipline.
#[derive(Default)]
pub struct KeypairSet {
    /// The most recently superseded keypair, kept briefly so
    /// already-in-flight decrypts do not fail outright.
    pub previous: Option<Arc<Keypair>>,
    /// The keypair actively used to encrypt outbound datagrams.
    pub current: Option<Arc<Keypair>>,
    /// A keypair that has completed the handshake but has not yet received
    /// its first successful decrypt (initiator side only, per §4.8).
    pub next: Option<Arc<Keypair>>,
}

impl KeypairSet {
    /// Install a freshly completed handshake's keypair.
    ///
    /// On the initiator it becomes `next` (awaiting first receive); on the
    /// responder it becomes `current` immediately, demoting the existing
    /// `current` to `previous` (and dropping any prior `previous`,
    /// zeroising its material via `Drop`).
    pub fn promote_forming(&mut self, keypair: Arc<Keypair>) {
        if keypair.is_initiator {
            self.next = Some(keypair);
        } else {
            self.previous = self.current.take();
            self.current = Some(keypair);
        }
    }

    /// Promote `next` to `current` on first successful receive (initiator
    /// side). No-op if there is no `next`.
    pub fn promote_next_to_current(&mut self) {
        if let Some(next) = self.next.take() {
            self.previous = self.current.take();
            self.current = Some(next);
        }
    }

    /// Invalidate and drop every slot, zeroising all key material.
    pub fn clear(&mut self) {
        if let Some(k) = self.previous.take() {
            k.invalidate();
        }
        if let Some(k) = self.current.take() {
            k.invalidate();
        }
        if let Some(k) = self.next.take() {
            k.invalidate();
        }
    }

    /// Look up a keypair by local session index, across all three slots.
    #[must_use]
    pub fn by_local_index(&self, index: u32) -> Option<Arc<Keypair>> {
        [&self.previous, &self.current, &self.next]
            .into_iter()
            .flatten()
            .find(|k| k.local_index == index)
            .cloned()
    }
}
