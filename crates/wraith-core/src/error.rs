//! Error types for the tunnel engine core.

use thiserror::Error;

/// Core protocol errors.
///
/// Mirrors the taxonomy of absorbed data-plane conditions plus the
/// administrative-surface failures that are actually returned to a
/// caller. Most variants here are constructed purely to carry a
/// structured value into a `tracing::warn!`/`debug!` call; only
/// [`CoreError::PeerCapReached`] and [`CoreError::HandshakeRateLimited`]
/// are realistically seen by a caller of [`crate::device::Device`].
#[derive(Debug, Error)]
pub enum CoreError {
    /// No current keypair, or the current keypair is invalid.
    ///
    /// Recovery: the batch is re-spliced to the staged queue head and a
    /// handshake initiation is requested. Nothing is dropped.
    #[error("no valid sending key for peer")]
    NoKey,

    /// Assigning a nonce would reach `REJECT_AFTER_MESSAGES`.
    ///
    /// Recovery: same as [`CoreError::NoKey`], plus the key is marked
    /// invalid first.
    #[error("keypair counter exhausted, rekey required")]
    CounterExhausted,

    /// AEAD encrypt or decrypt failed for a single datagram.
    ///
    /// Recovery: that datagram is dropped; the rest of its batch
    /// continues.
    #[error("crypto operation failed: {0}")]
    CryptoFailure(#[from] wraith_crypto::CryptoError),

    /// Batch allocation failed (out of memory, or staged queue full).
    ///
    /// Recovery: the whole batch is dropped and its references
    /// released; no key state changes.
    #[error("resource exhausted")]
    ResourceExhausted,

    /// Peer creation rejected because the device is at `max_peers`.
    #[error("peer cap reached")]
    PeerCapReached,

    /// A handshake initiation was requested more often than
    /// `rekey_timeout` allows; the request is a silent no-op.
    #[error("handshake initiation rate-limited")]
    HandshakeRateLimited,

    /// No peer found for the given public key or session index.
    #[error("unknown peer")]
    UnknownPeer,

    /// Handshake state machine rejected a message or transition.
    #[error("handshake error: {0}")]
    Handshake(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CoreError>;
