//! Device configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// `REKEY_AFTER_MESSAGES`: request a fresh handshake once a keypair's send
/// counter exceeds this many messages, even though the key remains usable.
pub const REKEY_AFTER_MESSAGES: u64 = 1 << 60;

/// `REJECT_AFTER_MESSAGES`: a keypair is invalidated once its counter would
/// reach this value; strictly greater than [`REKEY_AFTER_MESSAGES`].
pub const REJECT_AFTER_MESSAGES: u64 = u64::MAX - (1 << 13) - 1;

/// `REKEY_AFTER_TIME`: the initiator requests a fresh handshake once the
/// current keypair is older than this.
pub const REKEY_AFTER_TIME: Duration = Duration::from_secs(120);

/// `REJECT_AFTER_TIME`: a keypair is invalidated once it is older than this,
/// regardless of message count.
pub const REJECT_AFTER_TIME: Duration = Duration::from_secs(180);

/// `REKEY_TIMEOUT`: minimum interval between handshake initiation attempts
/// for the same peer.
pub const REKEY_TIMEOUT: Duration = Duration::from_secs(5);

/// `KEEPALIVE_TIMEOUT`: idle interval after the last data-carrying datagram
/// before a passive keepalive is sent.
pub const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on the per-peer staged plaintext queue.
pub const MAX_STAGED_PACKETS: usize = 1024;

/// Default bound on peers per device.
pub const MAX_PEERS_PER_DEVICE: u32 = 1 << 20;

/// DSCP value stamped on handshake packets by a real socket collaborator.
/// Carried here as a constant only; this crate performs no socket I/O and
/// does not set it on any live socket option.
pub const HANDSHAKE_DSCP: u8 = 0x88;

/// Device-wide configuration.
///
/// Analogous to the teacher crate's `NodeConfig`/`TransportConfig`: a
/// plain, `Default`-able settings struct passed to the constructor.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Listen address for incoming datagrams. Carried for the
    /// administrative surface; this crate does not bind a socket itself.
    pub listen_addr: SocketAddr,

    /// Maximum peers this device will admit.
    pub max_peers: u32,

    /// Maximum staged plaintext datagrams queued per peer before
    /// [`crate::peer::Peer::stage`] rejects further pushes.
    pub max_staged_packets: usize,

    /// Worker threads in the crypt pipeline. `None` uses the number of
    /// available CPUs.
    pub worker_threads: Option<usize>,

    /// See [`REKEY_AFTER_MESSAGES`].
    pub rekey_after_messages: u64,
    /// See [`REJECT_AFTER_MESSAGES`].
    pub reject_after_messages: u64,
    /// See [`REKEY_AFTER_TIME`].
    pub rekey_after_time: Duration,
    /// See [`REJECT_AFTER_TIME`].
    pub reject_after_time: Duration,
    /// See [`REKEY_TIMEOUT`].
    pub rekey_timeout: Duration,
    /// See [`KEEPALIVE_TIMEOUT`].
    pub keepalive_timeout: Duration,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            #[cfg(test)]
            listen_addr: "0.0.0.0:0".parse().unwrap(),
            #[cfg(not(test))]
            listen_addr: "0.0.0.0:51820".parse().unwrap(),
            max_peers: MAX_PEERS_PER_DEVICE,
            max_staged_packets: MAX_STAGED_PACKETS,
            worker_threads: None,
            rekey_after_messages: REKEY_AFTER_MESSAGES,
            reject_after_messages: REJECT_AFTER_MESSAGES,
            rekey_after_time: REKEY_AFTER_TIME,
            reject_after_time: REJECT_AFTER_TIME,
            rekey_timeout: REKEY_TIMEOUT,
            keepalive_timeout: KEEPALIVE_TIMEOUT,
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum log level a binary consumer should install.
    pub level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
        }
    }
}

/// Log levels, mirrored onto `tracing`'s own so that a binary consumer can
/// build an `EnvFilter` without depending on `tracing::Level` in its config
/// parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_after_messages_exceeds_rekey_after_messages() {
        assert!(REJECT_AFTER_MESSAGES > REKEY_AFTER_MESSAGES);
    }

    #[test]
    fn default_config_is_sane() {
        let cfg = DeviceConfig::default();
        assert_eq!(cfg.max_peers, MAX_PEERS_PER_DEVICE);
        assert_eq!(cfg.max_staged_packets, MAX_STAGED_PACKETS);
        assert!(cfg.worker_threads.is_none());
    }
}
