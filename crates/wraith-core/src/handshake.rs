//! Handshake collaborator wrapper.
//!
//! The actual handshake cryptography is out of scope (§1): this module
//! only adapts `wraith_crypto`'s opaque `NoiseHandshake`/`NoiseKeypair`
//! state machine to the entry points the core consumes —
//! `create_initiation`, `create_response`, `consume_*`, `begin_session`,
//! `clear` — without knowing or caring how the handshake messages are
//! constructed internally.
//!
//! The underlying primitive is a three-message exchange (it authenticates
//! both peers' static keys before either side derives a transport key), so
//! the initiator side produces one extra confirmation message after
//! consuming the response and before the session is considered open. That
//! detail is fully contained here; callers only see the named entry points.

use std::sync::RwLock;

use wraith_crypto::SessionKeys;
use wraith_crypto::noise::NoiseHandshake;

use crate::error::{CoreError, Result};
use crate::identity::StaticIdentity;

/// Key material handed off once a handshake completes, before it is split
/// into a [`crate::keypair::Keypair`].
pub struct SessionMaterial {
    /// Symmetric keys derived from the completed handshake.
    pub keys: SessionKeys,
    /// The peer's static public key, learned during the exchange.
    pub remote_static: [u8; 32],
}

enum Inner {
    Active(NoiseHandshake),
    /// Initiator has sent the confirmation message and the handshake is
    /// logically complete; kept only so `clear` has something to zeroise.
    Done,
}

/// One in-progress (or just-completed) handshake, guarded by its own lock
/// as required by §5 ("Handshake state: dedicated read-write lock around
/// create/consume").
pub struct HandshakeState {
    inner: RwLock<Option<Inner>>,
}

impl HandshakeState {
    /// Begin a handshake as the initiator.
    pub fn new_initiator(identity: &StaticIdentity) -> Result<Self> {
        let hs = NoiseHandshake::new_initiator(identity.keypair())
            .map_err(|e| CoreError::Handshake(e.to_string()))?;
        Ok(Self {
            inner: RwLock::new(Some(Inner::Active(hs))),
        })
    }

    /// Begin a handshake as the responder.
    pub fn new_responder(identity: &StaticIdentity) -> Result<Self> {
        let hs = NoiseHandshake::new_responder(identity.keypair())
            .map_err(|e| CoreError::Handshake(e.to_string()))?;
        Ok(Self {
            inner: RwLock::new(Some(Inner::Active(hs))),
        })
    }

    /// Create the type-1 handshake initiation message (initiator only).
    pub fn create_initiation(&self) -> Result<Vec<u8>> {
        let mut guard = self.inner.write().unwrap();
        match guard.as_mut() {
            Some(Inner::Active(hs)) => hs
                .write_message(&[])
                .map_err(|e| CoreError::Handshake(e.to_string())),
            _ => Err(CoreError::Handshake("handshake already consumed".into())),
        }
    }

    /// Consume a type-1 initiation message (responder only).
    pub fn consume_initiation(&self, msg1: &[u8]) -> Result<()> {
        let mut guard = self.inner.write().unwrap();
        match guard.as_mut() {
            Some(Inner::Active(hs)) => hs
                .read_message(msg1)
                .map(|_| ())
                .map_err(|e| CoreError::Handshake(e.to_string())),
            _ => Err(CoreError::Handshake("handshake already consumed".into())),
        }
    }

    /// Create the type-2 handshake response message (responder only).
    pub fn create_response(&self) -> Result<Vec<u8>> {
        let mut guard = self.inner.write().unwrap();
        match guard.as_mut() {
            Some(Inner::Active(hs)) => hs
                .write_message(&[])
                .map_err(|e| CoreError::Handshake(e.to_string())),
            _ => Err(CoreError::Handshake("handshake already consumed".into())),
        }
    }

    /// Consume the type-2 response (initiator only); returns the
    /// confirmation bytes that must be transmitted to the responder before
    /// either side calls [`begin_session`](Self::begin_session).
    pub fn consume_response(&self, msg2: &[u8]) -> Result<Vec<u8>> {
        let mut guard = self.inner.write().unwrap();
        match guard.as_mut() {
            Some(Inner::Active(hs)) => {
                hs.read_message(msg2)
                    .map_err(|e| CoreError::Handshake(e.to_string()))?;
                hs.write_message(&[])
                    .map_err(|e| CoreError::Handshake(e.to_string()))
            }
            _ => Err(CoreError::Handshake("handshake already consumed".into())),
        }
    }

    /// Consume the initiator's confirmation message (responder only).
    pub fn consume_confirmation(&self, msg3: &[u8]) -> Result<()> {
        let mut guard = self.inner.write().unwrap();
        match guard.as_mut() {
            Some(Inner::Active(hs)) => hs
                .read_message(msg3)
                .map(|_| ())
                .map_err(|e| CoreError::Handshake(e.to_string())),
            _ => Err(CoreError::Handshake("handshake already consumed".into())),
        }
    }

    /// Finalize a completed handshake into session key material, consuming
    /// the handshake state.
    pub fn begin_session(&self) -> Result<SessionMaterial> {
        let mut guard = self.inner.write().unwrap();
        let inner = guard
            .take()
            .ok_or_else(|| CoreError::Handshake("handshake already cleared".into()))?;
        let hs = match inner {
            Inner::Active(hs) => hs,
            Inner::Done => {
                *guard = Some(Inner::Done);
                return Err(CoreError::Handshake("handshake already finalized".into()));
            }
        };
        if !hs.is_complete() {
            *guard = Some(Inner::Active(hs));
            return Err(CoreError::Handshake("handshake not complete".into()));
        }
        let remote_static = hs
            .get_remote_static()
            .ok_or_else(|| CoreError::Handshake("remote static key unknown".into()))?;
        let keys = hs
            .into_session_keys()
            .map_err(|e| CoreError::Handshake(e.to_string()))?;
        *guard = Some(Inner::Done);
        Ok(SessionMaterial {
            keys,
            remote_static,
        })
    }

    /// Clear and zeroise all handshake state, mirroring the `clear`
    /// collaborator entry point. Safe to call more than once.
    pub fn clear(&self) {
        let mut guard = self.inner.write().unwrap();
        *guard = None;
    }
}
