//! Cookie-reply DoS mitigation: a simplified stand-in for the real
//! MAC-based cookie construction, kept out of scope for this crate's
//! actual threat model (§1) but wired through with a concrete,
//! structurally faithful implementation so the handshake gate has
//! something real to call.
//!
//! The precomputed per-peer MAC key authenticates handshake messages;
//! the cookie key additionally rate-limits under load by requiring the
//! initiator to echo back a short-lived, address-derived cookie.

use wraith_crypto::hash::Kdf;

const LABEL_MAC1: &str = "wraith-cookie-mac1";
const LABEL_COOKIE: &str = "wraith-cookie-label";

/// MAC size appended to handshake messages.
pub const MAC_SIZE: usize = 16;

/// Precomputed per-peer keys used to authenticate and validate handshake
/// messages against a given remote static public key.
#[derive(Clone)]
pub struct CookieKeys {
    mac1_key: [u8; 32],
    cookie_key: [u8; 32],
}

impl CookieKeys {
    /// Derive both keys from a peer's static public key, mirroring
    /// `precompute_peer_keys`.
    #[must_use]
    pub fn precompute(peer_public_key: &[u8; 32]) -> Self {
        let mac1_key = Kdf::new(LABEL_MAC1).derive_key(peer_public_key);
        let cookie_key = Kdf::new(LABEL_COOKIE).derive_key(peer_public_key);
        Self {
            mac1_key,
            cookie_key,
        }
    }

    /// Append a MAC covering `message` to `out`, mirroring
    /// `add_mac_to_packet`.
    pub fn add_mac_to_packet(&self, message: &[u8], out: &mut Vec<u8>) {
        out.extend_from_slice(message);
        let mac = self.compute_mac(message);
        out.extend_from_slice(&mac);
    }

    /// Verify a message's trailing MAC, splitting it off on success.
    #[must_use]
    pub fn verify_mac<'a>(&self, framed: &'a [u8]) -> Option<&'a [u8]> {
        if framed.len() < MAC_SIZE {
            return None;
        }
        let (message, mac) = framed.split_at(framed.len() - MAC_SIZE);
        let expected = self.compute_mac(message);
        if subtle_eq(&expected, mac) {
            Some(message)
        } else {
            None
        }
    }

    fn compute_mac(&self, message: &[u8]) -> [u8; MAC_SIZE] {
        let full = Kdf::new(LABEL_MAC1).derive_key(&[self.mac1_key.as_slice(), message].concat());
        let mut mac = [0u8; MAC_SIZE];
        mac.copy_from_slice(&full[..MAC_SIZE]);
        mac
    }

    /// Build a short cookie-reply payload for `source`, mirroring
    /// `message_create` on the cookie-reply path.
    #[must_use]
    pub fn message_create(&self, source: &[u8]) -> [u8; MAC_SIZE] {
        let full = Kdf::new(LABEL_COOKIE).derive_key(&[self.cookie_key.as_slice(), source].concat());
        let mut cookie = [0u8; MAC_SIZE];
        cookie.copy_from_slice(&full[..MAC_SIZE]);
        cookie
    }
}

fn subtle_eq(a: &[u8], b: &[u8]) -> bool {
    wraith_crypto::constant_time::ct_eq(a, b)
}
