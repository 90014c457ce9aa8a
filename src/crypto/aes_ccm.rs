//! AES-CCM record protection using RustCrypto.

use aes::{Aes128, Aes256};
use ccm::aead::consts::{U12, U16, U8};
use ccm::aead::generic_array::GenericArray;
use ccm::aead::{AeadInPlace, KeyInit};
use ccm::Ccm;

use super::{Aad, Cipher, Nonce};
use crate::buffer::Buf;

type Aes128Ccm = Ccm<Aes128, U16, U12>;
type Aes256Ccm = Ccm<Aes256, U16, U12>;
type Aes128Ccm8 = Ccm<Aes128, U8, U12>;
type Aes256Ccm8 = Ccm<Aes256, U8, U12>;

/// AES-CCM with a 16 or 8 byte tag over a 128 or 256 bit key.
pub enum AesCcm {
    Aes128(Box<Aes128Ccm>),
    Aes256(Box<Aes256Ccm>),
    Aes128Short(Box<Aes128Ccm8>),
    Aes256Short(Box<Aes256Ccm8>),
}

impl std::fmt::Debug for AesCcm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AesCcm::Aes128(_) => f.debug_tuple("AesCcm::Aes128").finish(),
            AesCcm::Aes256(_) => f.debug_tuple("AesCcm::Aes256").finish(),
            AesCcm::Aes128Short(_) => f.debug_tuple("AesCcm::Aes128_8").finish(),
            AesCcm::Aes256Short(_) => f.debug_tuple("AesCcm::Aes256_8").finish(),
        }
    }
}

impl AesCcm {
    /// Key size picks AES-128 or AES-256, `tag_len` picks CCM or CCM_8.
    pub fn new(key: &[u8], tag_len: usize) -> Result<Self, String> {
        let bad_key = |_| format!("Invalid key size for AES-CCM: {}", key.len());
        match (key.len(), tag_len) {
            (16, 16) => Ok(AesCcm::Aes128(Box::new(
                Aes128Ccm::new_from_slice(key).map_err(bad_key)?,
            ))),
            (32, 16) => Ok(AesCcm::Aes256(Box::new(
                Aes256Ccm::new_from_slice(key).map_err(bad_key)?,
            ))),
            (16, 8) => Ok(AesCcm::Aes128Short(Box::new(
                Aes128Ccm8::new_from_slice(key).map_err(bad_key)?,
            ))),
            (32, 8) => Ok(AesCcm::Aes256Short(Box::new(
                Aes256Ccm8::new_from_slice(key).map_err(bad_key)?,
            ))),
            (k, t) => Err(format!("Unsupported AES-CCM key/tag size: {}/{}", k, t)),
        }
    }
}

fn seal<A: AeadInPlace>(cipher: &A, data: &mut Buf, aad: &Aad, nonce: &Nonce) -> Result<(), String> {
    let nonce = GenericArray::from_slice(&nonce.0);
    cipher
        .encrypt_in_place(nonce, aad, data)
        .map_err(|_| "AES-CCM encryption failed".to_string())
}

fn open<A: AeadInPlace>(cipher: &A, data: &mut Buf, aad: &Aad, nonce: &Nonce) -> Result<(), String> {
    let nonce = GenericArray::from_slice(&nonce.0);
    cipher
        .decrypt_in_place(nonce, aad, data)
        .map_err(|_| "AES-CCM authentication failed".to_string())
}

impl Cipher for AesCcm {
    fn encrypt(&mut self, data: &mut Buf, aad: Aad, nonce: Nonce) -> Result<(), String> {
        match self {
            AesCcm::Aes128(c) => seal(c.as_ref(), data, &aad, &nonce),
            AesCcm::Aes256(c) => seal(c.as_ref(), data, &aad, &nonce),
            AesCcm::Aes128Short(c) => seal(c.as_ref(), data, &aad, &nonce),
            AesCcm::Aes256Short(c) => seal(c.as_ref(), data, &aad, &nonce),
        }
    }

    fn decrypt(&mut self, data: &mut Buf, aad: Aad, nonce: Nonce) -> Result<(), String> {
        if data.len() < self.tag_len() {
            return Err(format!(
                "Ciphertext too short for tag: {} < {}",
                data.len(),
                self.tag_len()
            ));
        }
        match self {
            AesCcm::Aes128(c) => open(c.as_ref(), data, &aad, &nonce),
            AesCcm::Aes256(c) => open(c.as_ref(), data, &aad, &nonce),
            AesCcm::Aes128Short(c) => open(c.as_ref(), data, &aad, &nonce),
            AesCcm::Aes256Short(c) => open(c.as_ref(), data, &aad, &nonce),
        }
    }

    fn tag_len(&self) -> usize {
        match self {
            AesCcm::Aes128(_) | AesCcm::Aes256(_) => 16,
            AesCcm::Aes128Short(_) | AesCcm::Aes256Short(_) => 8,
        }
    }
}
