//! Per-peer timer bookkeeping (§6 collaborator surface: `init/stop`,
//! `any_authenticated_packet_traversal`, `data_sent`, `handshake_initiated`,
//! `session_derived`).
//!
//! The actual deadline-firing scheduler (a background thread or async
//! timer wheel that calls back into [`crate::device::Device`] when a
//! deadline elapses) is administrative-surface wiring, out of scope here;
//! this module only tracks the timestamps those entry points stamp and
//! exposes "is this deadline due" queries that an external scheduler (or a
//! test) can poll.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

fn now_millis(epoch: Instant) -> u64 {
    epoch.elapsed().as_millis() as u64
}

/// Timer state for one peer.
pub struct TimerSet {
    epoch: Instant,
    running: AtomicBool,
    last_any_authenticated: AtomicU64,
    last_data_sent: AtomicU64,
    last_handshake_initiated: AtomicU64,
    handshake_ever_initiated: AtomicBool,
    last_session_derived: AtomicU64,
}

impl TimerSet {
    /// Create a fresh, stopped timer set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            running: AtomicBool::new(false),
            last_any_authenticated: AtomicU64::new(0),
            last_data_sent: AtomicU64::new(0),
            last_handshake_initiated: AtomicU64::new(0),
            handshake_ever_initiated: AtomicBool::new(false),
            last_session_derived: AtomicU64::new(0),
        }
    }

    /// Start accepting timer events (called at peer creation).
    pub fn init(&self) {
        self.running.store(true, Ordering::Release);
    }

    /// Stop accepting timer events (called at peer removal); subsequent
    /// stamps are recorded but queries report nothing is due.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Stamp that any authenticated packet (handshake or data) traversed
    /// this peer, resetting the passive-keepalive clock.
    pub fn any_authenticated_packet_traversal(&self) {
        self.last_any_authenticated
            .store(now_millis(self.epoch), Ordering::Release);
    }

    /// Stamp that a non-keepalive data datagram was sent.
    pub fn data_sent(&self) {
        self.last_data_sent
            .store(now_millis(self.epoch), Ordering::Release);
    }

    /// Stamp that a handshake initiation was just emitted.
    pub fn handshake_initiated(&self) {
        self.last_handshake_initiated
            .store(now_millis(self.epoch), Ordering::Release);
        self.handshake_ever_initiated.store(true, Ordering::Release);
    }

    /// Stamp that a session was just derived from a completed handshake.
    pub fn session_derived(&self) {
        self.last_session_derived
            .store(now_millis(self.epoch), Ordering::Release);
    }

    /// Whether a passive keepalive is due: no data-carrying datagram was
    /// sent in at least `timeout`.
    #[must_use]
    pub fn keepalive_due(&self, timeout: Duration) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        let elapsed = now_millis(self.epoch).saturating_sub(self.last_data_sent.load(Ordering::Acquire));
        elapsed >= timeout.as_millis() as u64
    }

    /// Whether enough time has elapsed since the last handshake initiation
    /// to permit another one (the fast, lock-free reject path of §4.3).
    ///
    /// A peer that has never attempted a handshake always permits the
    /// first one, regardless of `rekey_timeout`; tracked with a dedicated
    /// flag rather than inferred from the timestamp being zero, since a
    /// genuine first stamp can itself land on millisecond zero.
    #[must_use]
    pub fn handshake_retry_allowed(&self, rekey_timeout: Duration) -> bool {
        if !self.handshake_ever_initiated.load(Ordering::Acquire) {
            return true;
        }
        let elapsed = now_millis(self.epoch)
            .saturating_sub(self.last_handshake_initiated.load(Ordering::Acquire));
        elapsed >= rekey_timeout.as_millis() as u64
    }
}

impl Default for TimerSet {
    fn default() -> Self {
        Self::new()
    }
}
