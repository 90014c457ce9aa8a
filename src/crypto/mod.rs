//! Key derivation and record protection.

mod aead;
mod aes_ccm;
mod keys;
mod prf;
mod suite;

use std::fmt;

pub use aead::{Aad, Iv, Nonce};
pub use keys::{KeyBlock, SecurityParameters};
pub use suite::CipherSuiteAdapter;

use crate::buffer::Buf;

/// AEAD primitive used for record protection.
///
/// Implementations are keyed at construction and work in place: `encrypt`
/// appends the tag, `decrypt` verifies and removes it.
pub trait Cipher: Send + fmt::Debug {
    /// Encrypt `data` in place, appending the tag.
    fn encrypt(&mut self, data: &mut Buf, aad: Aad, nonce: Nonce) -> Result<(), String>;

    /// Decrypt `data` in place. Fails when the tag does not verify.
    fn decrypt(&mut self, data: &mut Buf, aad: Aad, nonce: Nonce) -> Result<(), String>;

    /// Length of the appended tag.
    fn tag_len(&self) -> usize;
}
