//! Wire message framing.
//!
//! All multi-byte fields are little-endian. Four message types share the
//! wire: handshake initiation, handshake response, cookie reply, and data.
//! Encoding here is header bookkeeping only — the handshake payload bytes
//! and the AEAD ciphertext bytes are opaque to this module.

/// Handshake initiation message type.
pub const MESSAGE_TYPE_HANDSHAKE_INITIATION: u32 = 1;
/// Handshake response message type.
pub const MESSAGE_TYPE_HANDSHAKE_RESPONSE: u32 = 2;
/// Cookie reply message type.
pub const MESSAGE_TYPE_COOKIE_REPLY: u32 = 3;
/// Data message type.
pub const MESSAGE_TYPE_DATA: u32 = 4;

/// Size of the fixed `{ type, receiver_index, counter }` data header, before
/// the ciphertext and its trailing 16-byte tag.
pub const DATA_HEADER_SIZE: usize = 4 + 4 + 8;

/// Round `len` up to the next multiple of 16, WireGuard's padding
/// granularity for data payloads.
#[must_use]
pub fn padded_len(len: usize) -> usize {
    len.div_ceil(16) * 16
}

/// Parsed header of a type-4 data message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    /// Receiver's local session index, chosen at handshake time.
    pub receiver_index: u32,
    /// Per-keypair nonce counter.
    pub counter: u64,
}

impl DataHeader {
    /// Serialize `{ type=4, receiver_index, counter }` into a fresh buffer;
    /// the caller appends ciphertext||tag after this.
    #[must_use]
    pub fn encode(&self) -> [u8; DATA_HEADER_SIZE] {
        let mut out = [0u8; DATA_HEADER_SIZE];
        out[0..4].copy_from_slice(&MESSAGE_TYPE_DATA.to_le_bytes());
        out[4..8].copy_from_slice(&self.receiver_index.to_le_bytes());
        out[8..16].copy_from_slice(&self.counter.to_le_bytes());
        out
    }

    /// Parse a header from the front of `buf`, returning the header and the
    /// remaining ciphertext||tag slice.
    pub fn decode(buf: &[u8]) -> Option<(Self, &[u8])> {
        if buf.len() < DATA_HEADER_SIZE {
            return None;
        }
        let msg_type = u32::from_le_bytes(buf[0..4].try_into().ok()?);
        if msg_type != MESSAGE_TYPE_DATA {
            return None;
        }
        let receiver_index = u32::from_le_bytes(buf[4..8].try_into().ok()?);
        let counter = u64::from_le_bytes(buf[8..16].try_into().ok()?);
        Some((
            Self {
                receiver_index,
                counter,
            },
            &buf[DATA_HEADER_SIZE..],
        ))
    }
}

/// Peek the message type from the front of a datagram without fully parsing it.
#[must_use]
pub fn peek_message_type(buf: &[u8]) -> Option<u32> {
    if buf.len() < 4 {
        return None;
    }
    Some(u32::from_le_bytes(buf[0..4].try_into().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_header_roundtrip() {
        let header = DataHeader {
            receiver_index: 0xDEAD_BEEF,
            counter: 42,
        };
        let encoded = header.encode();
        let mut buf = encoded.to_vec();
        buf.extend_from_slice(b"ciphertext-and-tag");
        let (decoded, rest) = DataHeader::decode(&buf).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(rest, b"ciphertext-and-tag");
    }

    #[test]
    fn decode_rejects_short_buffer() {
        assert!(DataHeader::decode(&[1, 2, 3]).is_none());
    }

    #[test]
    fn decode_rejects_wrong_type() {
        let mut buf = vec![0u8; DATA_HEADER_SIZE + 4];
        buf[0..4].copy_from_slice(&MESSAGE_TYPE_HANDSHAKE_INITIATION.to_le_bytes());
        assert!(DataHeader::decode(&buf).is_none());
    }

    #[test]
    fn padded_len_rounds_to_16() {
        assert_eq!(padded_len(0), 0);
        assert_eq!(padded_len(1), 16);
        assert_eq!(padded_len(16), 16);
        assert_eq!(padded_len(17), 32);
        assert_eq!(padded_len(100), 112);
    }

    #[test]
    fn peek_message_type_reads_leading_u32() {
        let buf = MESSAGE_TYPE_COOKIE_REPLY.to_le_bytes();
        assert_eq!(peek_message_type(&buf), Some(MESSAGE_TYPE_COOKIE_REPLY));
        assert_eq!(peek_message_type(&[1, 2]), None);
    }
}
