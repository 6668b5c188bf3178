//! Core AEAD primitives: keys, nonces, and the underlying cipher.
//!
//! `XChaCha20-Poly1305` is used throughout; nonces are derived from a
//! per-session salt plus a 64-bit counter rather than generated randomly,
//! so that the counter can double as the wire-format sequence number.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::CryptoError;

/// Key size in bytes for `XChaCha20-Poly1305`.
pub const KEY_SIZE: usize = 32;
/// Nonce size in bytes for `XChaCha20-Poly1305` (extended nonce).
pub const NONCE_SIZE: usize = 24;
/// Authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// A 24-byte extended nonce.
#[derive(Clone, Copy, Debug)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Build a nonce from a 64-bit counter and a per-session salt.
    ///
    /// The counter occupies the low 8 bytes; the remaining bytes come from
    /// the salt, giving every session a distinct nonce space even if two
    /// sessions happen to reuse the same counter value.
    #[must_use]
    pub fn from_counter(counter: u64, salt: &[u8; 16]) -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        bytes[..8].copy_from_slice(&counter.to_le_bytes());
        bytes[8..].copy_from_slice(salt);
        Self(bytes)
    }

    /// Raw bytes of the nonce.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// A symmetric AEAD key, zeroised on drop.
///
/// Carries a cipher instance built eagerly at construction, plus a
/// key-commitment value (a BLAKE3 hash of the key) that can be folded into
/// the AAD to defeat key-commitment attacks against `XChaCha20-Poly1305`.
#[derive(ZeroizeOnDrop)]
pub struct AeadKey {
    #[zeroize(skip)]
    cipher: XChaCha20Poly1305,
    raw: [u8; KEY_SIZE],
}

impl AeadKey {
    /// Build a key from 32 raw bytes.
    #[must_use]
    pub fn new(raw: [u8; KEY_SIZE]) -> Self {
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&raw));
        Self { cipher, raw }
    }

    /// Key-commitment value: `BLAKE3(key)`.
    ///
    /// Mixed into the AAD of every encrypt/decrypt call so that an
    /// attacker cannot construct a ciphertext that authenticates under two
    /// different keys.
    #[must_use]
    pub fn commitment(&self) -> [u8; 32] {
        *blake3::hash(&self.raw).as_bytes()
    }

    /// Encrypt `plaintext` under `nonce`, authenticating `aad`.
    ///
    /// # Errors
    /// Returns [`CryptoError::EncryptionFailed`] if the underlying AEAD
    /// primitive rejects the operation (this does not happen for
    /// well-formed inputs; `chacha20poly1305` only fails on malformed
    /// buffers).
    pub fn encrypt(&self, nonce: &Nonce, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.cipher
            .encrypt(
                XNonce::from_slice(nonce.as_bytes()),
                Payload { msg: plaintext, aad },
            )
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Decrypt `ciphertext` (including trailing tag) under `nonce`,
    /// verifying `aad`.
    ///
    /// # Errors
    /// Returns [`CryptoError::DecryptionFailed`] if authentication fails.
    pub fn decrypt(&self, nonce: &Nonce, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.cipher
            .decrypt(
                XNonce::from_slice(nonce.as_bytes()),
                Payload { msg: ciphertext, aad },
            )
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

/// Standalone encrypt/decrypt helper that does not own key state.
///
/// Used where the caller already manages nonce/counter bookkeeping
/// externally (the device crypt pipeline) and only needs the raw
/// authenticated-encryption primitive.
pub struct AeadCipher;

impl AeadCipher {
    /// Encrypt in place, scatter-gather style: `dst` receives ciphertext
    /// plus tag, `src` is the plaintext.
    ///
    /// Returns `true` on success, `false` on failure, matching the
    /// collaborator contract `encrypt_sg(...) -> bool`.
    #[must_use]
    pub fn encrypt_sg(key: &AeadKey, nonce: &Nonce, src: &[u8], aad: &[u8], dst: &mut Vec<u8>) -> bool {
        match key.encrypt(nonce, src, aad) {
            Ok(ct) => {
                *dst = ct;
                true
            }
            Err(_) => false,
        }
    }

    /// Decrypt mirror of [`Self::encrypt_sg`].
    #[must_use]
    pub fn decrypt_sg(key: &AeadKey, nonce: &Nonce, src: &[u8], aad: &[u8], dst: &mut Vec<u8>) -> bool {
        match key.decrypt(nonce, src, aad) {
            Ok(pt) => {
                *dst = pt;
                true
            }
            Err(_) => false,
        }
    }
}

impl Drop for Nonce {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = AeadKey::new([7u8; KEY_SIZE]);
        let nonce = Nonce::from_counter(0, &[0u8; 16]);
        let ct = key.encrypt(&nonce, b"hello tunnel", b"aad").unwrap();
        let pt = key.decrypt(&nonce, &ct, b"aad").unwrap();
        assert_eq!(pt, b"hello tunnel");
    }

    #[test]
    fn tamper_detected() {
        let key = AeadKey::new([7u8; KEY_SIZE]);
        let nonce = Nonce::from_counter(0, &[0u8; 16]);
        let mut ct = key.encrypt(&nonce, b"hello tunnel", b"aad").unwrap();
        *ct.last_mut().unwrap() ^= 0xFF;
        assert!(key.decrypt(&nonce, &ct, b"aad").is_err());
    }

    #[test]
    fn distinct_counters_give_distinct_nonces() {
        let salt = [1u8; 16];
        let a = Nonce::from_counter(0, &salt);
        let b = Nonce::from_counter(1, &salt);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn commitment_is_deterministic_and_key_dependent() {
        let a = AeadKey::new([1u8; KEY_SIZE]);
        let b = AeadKey::new([1u8; KEY_SIZE]);
        let c = AeadKey::new([2u8; KEY_SIZE]);
        assert_eq!(a.commitment(), b.commitment());
        assert_ne!(a.commitment(), c.commitment());
    }

    #[test]
    fn encrypt_sg_decrypt_sg_roundtrip() {
        let key = AeadKey::new([3u8; KEY_SIZE]);
        let nonce = Nonce::from_counter(5, &[2u8; 16]);
        let mut ct = Vec::new();
        assert!(AeadCipher::encrypt_sg(&key, &nonce, b"payload", b"", &mut ct));
        let mut pt = Vec::new();
        assert!(AeadCipher::decrypt_sg(&key, &nonce, &ct, b"", &mut pt));
        assert_eq!(pt, b"payload");
    }
}
