//! # wraith-core
//!
//! The core data-plane and peer-lifecycle engine of a point-to-point
//! encrypted tunnel between authenticated peers: per-peer session-key
//! lifecycle and rekey policy, the parallel encrypt/decrypt packet
//! pipelines with their FIFO ordering discipline, the peer reference model
//! with safe concurrent lookup, and the handshake-initiation gate with
//! staged-packet backpressure.
//!
//! ## Out of scope
//!
//! The Noise handshake cryptography itself, the underlying AEAD
//! primitive, the allowed-IPs routing table, the cookie-reply DoS
//! mitigation, and raw socket/interface I/O are all treated as external
//! collaborators with well-defined entry points rather than implemented
//! here. See [`routing`] for the routing seam and [`crypt`] for the
//! socket/interface seams ([`crypt::Transmit`], [`crypt::Deliver`]).
//!
//! ## Module structure
//!
//! - [`device`]: ties the registry, identity, and crypt pipeline together
//! - [`peer`]: per-peer state — handshake, keypairs, queues, timers
//! - [`registry`]: concurrent peer lookup by public key and session index
//! - [`crypt`]: the device-wide parallel encrypt/decrypt worker pools
//! - [`keypair`]: the {previous, current, next} session keypair lifecycle
//! - [`handshake`]: adapts the opaque Noise state machine to this crate's
//!   entry points
//! - [`cookie`]: MAC/cookie-reply stand-in
//! - [`timers`]: per-peer timestamp bookkeeping
//! - [`routing`]: the allowed-IPs lookup seam
//! - [`wire`]: message type constants and the data-message header
//! - [`identity`]: static long-term device identity
//! - [`config`]: device configuration and protocol constants
//! - [`error`]: the core error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod cookie;
pub mod crypt;
pub mod device;
pub mod error;
pub mod handshake;
pub mod identity;
pub mod keypair;
pub mod peer;
pub mod registry;
pub mod routing;
pub mod timers;
pub mod wire;

pub use config::DeviceConfig;
pub use crypt::{CryptBatch, CryptItem, CryptPipeline, Deliver, Direction, RequestHandshake, Transmit};
pub use device::Device;
pub use error::{CoreError, Result};
pub use identity::StaticIdentity;
pub use peer::{Peer, PeerLifecycle};
pub use registry::PeerRegistry;
pub use routing::Routing;
