//! Nonce and additional data layout for AEAD-protected DTLS 1.2 records.

use crate::types::{ContentType, ProtocolVersion, Sequence};

/// Length of the implicit nonce part derived from the key block.
pub const FIXED_IV_LEN: usize = 4;

/// Fixed IV portion of the nonce (client_write_IV or server_write_IV).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Iv(pub [u8; FIXED_IV_LEN]);

impl Iv {
    pub fn new(iv: &[u8]) -> Option<Self> {
        Some(Self(iv.try_into().ok()?))
    }
}

/// Full 12 byte AEAD nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce(pub [u8; 12]);

impl Nonce {
    /// fixed IV ‖ epoch ‖ 48-bit sequence number.
    ///
    /// The record header already carries epoch and sequence, so no explicit
    /// nonce is sent and the (epoch, sequence) uniqueness on send makes every
    /// nonce unique per key.
    pub fn new(iv: Iv, sequence: Sequence) -> Self {
        let mut nonce = [0u8; 12];
        nonce[..4].copy_from_slice(&iv.0);
        nonce[4..6].copy_from_slice(&sequence.epoch.to_be_bytes());
        nonce[6..].copy_from_slice(&sequence.sequence_number.to_be_bytes()[2..]);
        Self(nonce)
    }
}

/// Additional authenticated data of a DTLS 1.2 record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aad(pub [u8; 13]);

impl Aad {
    /// epoch(2) ‖ seq(6) ‖ type(1) ‖ version(2) ‖ plaintext length(2)
    pub fn new(content_type: ContentType, sequence: Sequence, length: u16) -> Self {
        let mut aad = [0u8; 13];

        // Full 8-byte sequence number, then overwrite the first 2 bytes with epoch
        aad[..8].copy_from_slice(&sequence.sequence_number.to_be_bytes());
        aad[..2].copy_from_slice(&sequence.epoch.to_be_bytes());

        aad[8] = content_type.as_u8();
        aad[9..11].copy_from_slice(&ProtocolVersion::DTLS1_2.as_u16().to_be_bytes());
        aad[11..].copy_from_slice(&length.to_be_bytes());

        Aad(aad)
    }
}

impl std::ops::Deref for Aad {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
