use zeroize::Zeroizing;

use super::aead::{Iv, FIXED_IV_LEN};
use super::prf;
use crate::message::VERIFY_DATA_LEN;
use crate::types::{CipherSuite, CompressionMethod, Random, Role};
use crate::Error;

/// Pending session state, filled in as the handshake progresses.
///
/// Becomes active record protection only at the ChangeCipherSpec boundary.
pub struct SecurityParameters {
    pub role: Role,
    pub cipher_suite: CipherSuite,
    pub compression_method: CompressionMethod,
    pub client_random: Random,
    pub server_random: Random,
    master_secret: Option<Zeroizing<[u8; prf::MASTER_SECRET_LEN]>>,
}

/// Directional keys cut from the key block.
pub struct KeyBlock {
    pub client_write_key: Zeroizing<Vec<u8>>,
    pub server_write_key: Zeroizing<Vec<u8>>,
    pub client_write_iv: Iv,
    pub server_write_iv: Iv,
}

impl SecurityParameters {
    pub fn new(role: Role) -> Self {
        SecurityParameters {
            role,
            cipher_suite: CipherSuite::default(),
            compression_method: CompressionMethod::Null,
            client_random: Random::default(),
            server_random: Random::default(),
            master_secret: None,
        }
    }

    /// Derive the master secret from the PSK. Both randoms must be set.
    pub fn derive_master_secret(&mut self, psk: &[u8]) -> Result<(), Error> {
        let pre_master = prf::psk_pre_master_secret(psk);
        let master = prf::master_secret(
            &pre_master,
            &self.client_random.to_bytes(),
            &self.server_random.to_bytes(),
        )
        .map_err(Error::CryptoError)?;
        self.master_secret = Some(master);
        Ok(())
    }

    fn master(&self) -> Result<&[u8], Error> {
        self.master_secret
            .as_ref()
            .map(|m| &m[..])
            .ok_or_else(|| Error::CryptoError("No master secret".to_string()))
    }

    /// Expand the master secret into the write keys and IVs of both sides.
    pub fn key_block(&self) -> Result<KeyBlock, Error> {
        let params = self
            .cipher_suite
            .aead_params()
            .ok_or(Error::UnsupportedCipherSuite(self.cipher_suite.as_u16()))?;

        let len = 2 * params.key_len + 2 * FIXED_IV_LEN;
        let block = prf::key_expansion(
            self.master()?,
            &self.client_random.to_bytes(),
            &self.server_random.to_bytes(),
            len,
        )
        .map_err(Error::CryptoError)?;

        let (client_key, rest) = block.split_at(params.key_len);
        let (server_key, rest) = rest.split_at(params.key_len);
        let (client_iv, server_iv) = rest.split_at(FIXED_IV_LEN);

        let iv = |b: &[u8]| Iv::new(b).ok_or_else(|| Error::CryptoError("Bad IV".to_string()));

        Ok(KeyBlock {
            client_write_key: Zeroizing::new(client_key.to_vec()),
            server_write_key: Zeroizing::new(server_key.to_vec()),
            client_write_iv: iv(client_iv)?,
            server_write_iv: iv(server_iv)?,
        })
    }

    /// verify_data of the Finished sent by `sender` over the transcript so far.
    pub fn verify_data(&self, sender: Role, transcript: &[u8]) -> Result<[u8; VERIFY_DATA_LEN], Error> {
        let label = match sender {
            Role::Client => "client finished",
            Role::Server => "server finished",
        };
        prf::verify_data(self.master()?, label, transcript).map_err(Error::CryptoError)
    }
}

impl std::fmt::Debug for SecurityParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityParameters")
            .field("role", &self.role)
            .field("cipher_suite", &self.cipher_suite)
            .field("compression_method", &self.compression_method)
            .field("master_secret", &self.master_secret.is_some())
            .finish()
    }
}

impl std::fmt::Debug for KeyBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyBlock")
            .field("key_len", &self.client_write_key.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(role: Role) -> SecurityParameters {
        let mut p = SecurityParameters::new(role);
        p.cipher_suite = CipherSuite::PSK_WITH_AES_256_CCM_8;
        p.client_random = Random {
            gmt_unix_time: 1,
            random_bytes: [1; 28],
        };
        p.server_random = Random {
            gmt_unix_time: 2,
            random_bytes: [2; 28],
        };
        p
    }

    #[test]
    fn both_sides_agree() {
        let mut client = params(Role::Client);
        let mut server = params(Role::Server);
        client.derive_master_secret(b"secret").unwrap();
        server.derive_master_secret(b"secret").unwrap();

        let a = client.key_block().unwrap();
        let b = server.key_block().unwrap();
        assert_eq!(a.client_write_key.len(), 32);
        assert_eq!(*a.client_write_key, *b.client_write_key);
        assert_eq!(a.server_write_iv, b.server_write_iv);
        assert_ne!(*a.client_write_key, *a.server_write_key);

        assert_eq!(
            client.verify_data(Role::Client, b"t").unwrap(),
            server.verify_data(Role::Client, b"t").unwrap()
        );
    }

    #[test]
    fn different_psk_different_keys() {
        let mut client = params(Role::Client);
        let mut server = params(Role::Server);
        client.derive_master_secret(b"secret").unwrap();
        server.derive_master_secret(b"other").unwrap();
        assert_ne!(
            client.verify_data(Role::Client, b"t").unwrap(),
            server.verify_data(Role::Client, b"t").unwrap()
        );
    }

    #[test]
    fn no_keys_before_master_secret() {
        let p = params(Role::Client);
        assert!(p.key_block().is_err());
    }

    #[test]
    fn legacy_suite_has_no_key_block() {
        let mut p = params(Role::Client);
        p.cipher_suite = CipherSuite::PSK_WITH_AES_128_CBC_SHA;
        p.derive_master_secret(b"secret").unwrap();
        assert!(matches!(
            p.key_block(),
            Err(Error::UnsupportedCipherSuite(0x008C))
        ));
    }
}
