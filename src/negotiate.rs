//! Version, cipher suite and compression agreement, plus the stateless
//! cookie that keeps the server from amplifying spoofed ClientHellos.

use std::net::{IpAddr, SocketAddr};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tinyvec::array_vec;
use zeroize::Zeroizing;

use crate::message::Cookie;
use crate::rng::SeededRng;
use crate::types::{CipherSuite, CipherSuiteVec, CompressionMethod, CompressionMethodVec};
use crate::types::ProtocolVersion;
use crate::Error;

type HmacSha256 = Hmac<Sha256>;

/// Length of the cookies we issue.
pub const COOKIE_LEN: usize = 32;

/// Only DTLS 1.2 is spoken.
pub fn check_version(version: ProtocolVersion) -> Result<(), Error> {
    if version != ProtocolVersion::DTLS1_2 {
        return Err(Error::BadProtocolVersion(ProtocolVersion::DTLS1_2, version));
    }
    Ok(())
}

/// The list a client puts in its ClientHello, in preference order.
pub fn offered_cipher_suites(configured: &[CipherSuite]) -> CipherSuiteVec {
    let mut out = CipherSuiteVec::default();
    for suite in configured.iter().filter(|s| s.is_known()) {
        if out.len() < out.capacity() && !out.contains(suite) {
            out.push(*suite);
        }
    }
    out
}

/// A suite is acceptable when it is known and can protect records.
pub fn check_cipher_suite(suite: CipherSuite) -> Result<(), Error> {
    if !suite.is_known() || suite.aead_params().is_none() {
        return Err(Error::UnsupportedCipherSuite(suite.as_u16()));
    }
    Ok(())
}

/// Server side choice: the first suite in the client's order that we have
/// configured and that can be activated.
pub fn select_cipher_suite(
    offered: &[CipherSuite],
    configured: &[CipherSuite],
) -> Result<CipherSuite, Error> {
    offered
        .iter()
        .copied()
        .find(|s| configured.contains(s) && check_cipher_suite(*s).is_ok())
        .ok_or(Error::NoCommonCipherSuite)
}

/// Client side check of the ServerHello choice.
pub fn check_selected_cipher_suite(
    selected: CipherSuite,
    offered: &[CipherSuite],
) -> Result<(), Error> {
    if !offered.contains(&selected) {
        return Err(Error::UnsupportedCipherSuite(selected.as_u16()));
    }
    check_cipher_suite(selected)
}

/// Compression methods offered by a client. Only null.
pub fn offered_compression_methods() -> CompressionMethodVec {
    array_vec![[CompressionMethod; 4] => CompressionMethod::Null]
}

/// Server side: the client must offer null compression.
pub fn select_compression(offered: &[CompressionMethod]) -> Result<CompressionMethod, Error> {
    if offered.contains(&CompressionMethod::Null) {
        Ok(CompressionMethod::Null)
    } else {
        let first = offered.first().map(|m| m.as_u8()).unwrap_or(0xff);
        Err(Error::UnsupportedCompression(first))
    }
}

/// Client side: the server must have picked null.
pub fn check_compression(selected: CompressionMethod) -> Result<(), Error> {
    if selected != CompressionMethod::Null {
        return Err(Error::UnsupportedCompression(selected.as_u8()));
    }
    Ok(())
}

/// Issues and checks cookies bound to the client transport address.
///
/// cookie = HMAC-SHA256(secret, client IP octets ‖ client port)
pub struct CookieGenerator {
    secret: Zeroizing<[u8; 32]>,
}

impl CookieGenerator {
    pub fn new(secret: [u8; 32]) -> Self {
        CookieGenerator {
            secret: Zeroizing::new(secret),
        }
    }

    /// A generator with a fresh random secret.
    pub fn random(rng: &mut SeededRng) -> Self {
        let mut secret = [0u8; 32];
        rng.fill(&mut secret);
        Self::new(secret)
    }

    fn mac(&self, peer: SocketAddr) -> Result<HmacSha256, Error> {
        let mut mac = HmacSha256::new_from_slice(&self.secret[..])
            .map_err(|_| Error::CryptoError("Invalid HMAC key".to_string()))?;
        match peer.ip() {
            IpAddr::V4(ip) => mac.update(&ip.octets()),
            IpAddr::V6(ip) => mac.update(&ip.octets()),
        }
        mac.update(&peer.port().to_be_bytes());
        Ok(mac)
    }

    pub fn generate(&self, peer: SocketAddr) -> Result<Cookie, Error> {
        let tag = self.mac(peer)?.finalize().into_bytes();
        Cookie::try_new(&tag[..COOKIE_LEN])
            .map_err(|_| Error::CryptoError("Failed to build cookie from HMAC output".to_string()))
    }

    /// Constant time check of an echoed cookie.
    pub fn verify(&self, peer: SocketAddr, cookie: &[u8]) -> bool {
        if cookie.len() != COOKIE_LEN {
            return false;
        }
        match self.mac(peer) {
            Ok(mac) => mac.verify_slice(cookie).is_ok(),
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for CookieGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieGenerator").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version() {
        assert!(check_version(ProtocolVersion::DTLS1_2).is_ok());
        assert!(matches!(
            check_version(ProtocolVersion::DTLS1_0),
            Err(Error::BadProtocolVersion(_, ProtocolVersion::DTLS1_0))
        ));
        assert!(check_version(ProtocolVersion::Unknown(0x0303)).is_err());
    }

    #[test]
    fn server_picks_in_client_order() {
        let offered = [
            CipherSuite::PSK_WITH_AES_128_CBC_SHA,
            CipherSuite::PSK_WITH_AES_256_CCM_8,
            CipherSuite::PSK_WITH_AES_128_CCM,
        ];
        let configured = CipherSuite::all();
        assert_eq!(
            select_cipher_suite(&offered, configured).unwrap(),
            CipherSuite::PSK_WITH_AES_256_CCM_8
        );
    }

    #[test]
    fn no_common_suite() {
        let offered = [CipherSuite::PSK_WITH_RC4_128_SHA];
        assert!(matches!(
            select_cipher_suite(&offered, CipherSuite::all()),
            Err(Error::NoCommonCipherSuite)
        ));
        assert!(select_cipher_suite(&[], CipherSuite::supported()).is_err());
    }

    #[test]
    fn client_rejects_unoffered_choice() {
        let offered = [CipherSuite::PSK_WITH_AES_128_CCM_8];
        assert!(check_selected_cipher_suite(CipherSuite::PSK_WITH_AES_128_CCM_8, &offered).is_ok());
        assert!(check_selected_cipher_suite(CipherSuite::PSK_WITH_AES_128_CCM, &offered).is_err());
        assert!(check_selected_cipher_suite(CipherSuite::Unknown(0xC02B), &offered).is_err());
    }

    #[test]
    fn offered_list_drops_unknown_and_duplicates() {
        let configured = [
            CipherSuite::PSK_WITH_AES_128_CCM,
            CipherSuite::Unknown(1),
            CipherSuite::PSK_WITH_AES_128_CCM,
        ];
        assert_eq!(
            offered_cipher_suites(&configured).as_slice(),
            &[CipherSuite::PSK_WITH_AES_128_CCM]
        );
    }

    #[test]
    fn compression() {
        assert_eq!(
            select_compression(&[CompressionMethod::Deflate, CompressionMethod::Null]).unwrap(),
            CompressionMethod::Null
        );
        assert!(matches!(
            select_compression(&[CompressionMethod::Deflate]),
            Err(Error::UnsupportedCompression(1))
        ));
        assert!(check_compression(CompressionMethod::Deflate).is_err());
        assert_eq!(offered_compression_methods().as_slice(), &[CompressionMethod::Null]);
    }

    #[test]
    fn cookie_bound_to_address_and_port() {
        let gen = CookieGenerator::new([7; 32]);
        let a: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let b: SocketAddr = "127.0.0.1:4001".parse().unwrap();
        let c: SocketAddr = "[::1]:4000".parse().unwrap();

        let cookie = gen.generate(a).unwrap();
        assert_eq!(cookie.len(), COOKIE_LEN);
        assert_eq!(cookie, gen.generate(a).unwrap());

        assert!(gen.verify(a, &cookie));
        assert!(!gen.verify(b, &cookie));
        assert!(!gen.verify(c, &cookie));
        assert!(!gen.verify(a, &[]));
        assert!(!gen.verify(a, &cookie[..31]));
    }

    #[test]
    fn cookie_depends_on_secret() {
        let a: SocketAddr = "10.0.0.1:5684".parse().unwrap();
        let one = CookieGenerator::new([1; 32]).generate(a).unwrap();
        let two = CookieGenerator::new([2; 32]).generate(a).unwrap();
        assert_ne!(one, two);
    }
}
