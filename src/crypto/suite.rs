use super::aes_ccm::AesCcm;
use super::{Aad, Cipher, Iv, KeyBlock, Nonce};
use crate::buffer::Buf;
use crate::types::{CipherSuite, ContentType, Role, Sequence};
use crate::Error;

/// Record protection for one direction of an association.
///
/// Maps the negotiated suite onto an AEAD transform and applies it to
/// record fragments.
pub struct CipherSuiteAdapter {
    suite: CipherSuite,
    cipher: Box<dyn Cipher>,
    iv: Iv,
}

impl CipherSuiteAdapter {
    pub fn new(suite: CipherSuite, key: &[u8], iv: Iv) -> Result<Self, Error> {
        let params = suite
            .aead_params()
            .ok_or(Error::UnsupportedCipherSuite(suite.as_u16()))?;

        if key.len() != params.key_len {
            return Err(Error::CryptoError(format!(
                "Key length {} does not match {:?}",
                key.len(),
                suite
            )));
        }

        let cipher = AesCcm::new(key, params.tag_len).map_err(Error::CryptoError)?;

        Ok(CipherSuiteAdapter {
            suite,
            cipher: Box::new(cipher),
            iv,
        })
    }

    /// (write, read) adapters for `role`.
    pub fn for_role(suite: CipherSuite, keys: &KeyBlock, role: Role) -> Result<(Self, Self), Error> {
        let client = Self::new(suite, &keys.client_write_key, keys.client_write_iv)?;
        let server = Self::new(suite, &keys.server_write_key, keys.server_write_iv)?;
        Ok(match role {
            Role::Client => (client, server),
            Role::Server => (server, client),
        })
    }

    /// Bytes added to every protected fragment.
    pub fn overhead(&self) -> usize {
        self.cipher.tag_len()
    }

    /// Encrypt `data` in place and append the tag.
    pub fn protect(
        &mut self,
        content_type: ContentType,
        sequence: Sequence,
        data: &mut Buf,
    ) -> Result<(), Error> {
        let aad = Aad::new(content_type, sequence, data.len() as u16);
        let nonce = Nonce::new(self.iv, sequence);
        self.cipher
            .encrypt(data, aad, nonce)
            .map_err(Error::CryptoError)
    }

    /// Verify and strip the tag, decrypting `data` in place.
    pub fn unprotect(
        &mut self,
        content_type: ContentType,
        sequence: Sequence,
        data: &mut Buf,
    ) -> Result<(), Error> {
        let plaintext_len = data
            .len()
            .checked_sub(self.overhead())
            .ok_or_else(|| Error::CryptoError("Fragment shorter than tag".to_string()))?;

        let aad = Aad::new(content_type, sequence, plaintext_len as u16);
        let nonce = Nonce::new(self.iv, sequence);
        self.cipher
            .decrypt(data, aad, nonce)
            .map_err(Error::CryptoError)
    }
}

impl std::fmt::Debug for CipherSuiteAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherSuiteAdapter")
            .field("suite", &self.suite)
            .field("cipher", &self.cipher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeroize::Zeroizing;

    fn keys(key_len: usize) -> KeyBlock {
        KeyBlock {
            client_write_key: Zeroizing::new(vec![0x11; key_len]),
            server_write_key: Zeroizing::new(vec![0x22; key_len]),
            client_write_iv: Iv([1; 4]),
            server_write_iv: Iv([2; 4]),
        }
    }

    #[test]
    fn client_writes_what_server_reads() {
        for suite in CipherSuite::supported() {
            let params = suite.aead_params().unwrap();
            let keys = keys(params.key_len);
            let (mut client_write, _) = CipherSuiteAdapter::for_role(*suite, &keys, Role::Client).unwrap();
            let (_, mut server_read) = CipherSuiteAdapter::for_role(*suite, &keys, Role::Server).unwrap();

            let seq = Sequence {
                epoch: 1,
                sequence_number: 9,
            };
            let mut data = Buf::from_slice(b"application data");
            client_write
                .protect(ContentType::ApplicationData, seq, &mut data)
                .unwrap();
            assert_eq!(data.len(), 16 + params.tag_len);

            server_read
                .unprotect(ContentType::ApplicationData, seq, &mut data)
                .unwrap();
            assert_eq!(&*data, b"application data");
        }
    }

    #[test]
    fn tampered_ciphertext_is_crypto_error() {
        let keys = keys(16);
        let suite = CipherSuite::PSK_WITH_AES_128_CCM;
        let (mut write, _) = CipherSuiteAdapter::for_role(suite, &keys, Role::Client).unwrap();
        let (_, mut read) = CipherSuiteAdapter::for_role(suite, &keys, Role::Server).unwrap();

        let seq = Sequence::new(1);
        let mut data = Buf::from_slice(b"payload");
        write.protect(ContentType::ApplicationData, seq, &mut data).unwrap();
        data[0] ^= 0x01;

        let err = read
            .unprotect(ContentType::ApplicationData, seq, &mut data)
            .unwrap_err();
        assert!(matches!(err, Error::CryptoError(_)));
    }

    #[test]
    fn replayed_under_other_sequence_fails() {
        let keys = keys(16);
        let suite = CipherSuite::PSK_WITH_AES_128_CCM_8;
        let (mut write, _) = CipherSuiteAdapter::for_role(suite, &keys, Role::Client).unwrap();
        let (_, mut read) = CipherSuiteAdapter::for_role(suite, &keys, Role::Server).unwrap();

        let mut data = Buf::from_slice(b"payload");
        write
            .protect(ContentType::ApplicationData, Sequence::new(1), &mut data)
            .unwrap();
        let moved = Sequence {
            epoch: 1,
            sequence_number: 1,
        };
        assert!(read
            .unprotect(ContentType::ApplicationData, moved, &mut data)
            .is_err());
    }

    #[test]
    fn legacy_suites_cannot_be_activated() {
        let keys = keys(16);
        let err = CipherSuiteAdapter::for_role(CipherSuite::PSK_WITH_RC4_128_SHA, &keys, Role::Client)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedCipherSuite(0x008A)));
    }
}
