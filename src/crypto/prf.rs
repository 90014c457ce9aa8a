use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tinyvec::ArrayVec;
use zeroize::{Zeroize, Zeroizing};

use crate::message::VERIFY_DATA_LEN;

type HmacSha256 = Hmac<Sha256>;

/// Length of the TLS 1.2 master secret.
pub const MASTER_SECRET_LEN: usize = 48;

/// PRF for TLS 1.2
/// as specified in RFC 5246 Section 5.
///
/// PRF(secret, label, seed) = P_SHA256(secret, label + seed)
///
/// NOTE: The seed parameter here is the actual seed data WITHOUT the label.
pub fn prf_tls12(
    secret: &[u8],
    label: &str,
    seed: &[u8],
    output_len: usize,
) -> Result<ArrayVec<[u8; 128]>, String> {
    if output_len > 128 {
        return Err(format!("PRF output too long: {}", output_len));
    }

    let full_seed = compute_full_seed(label, seed);
    p_hash(secret, &full_seed, output_len)
}

fn compute_full_seed(label: &str, seed: &[u8]) -> ArrayVec<[u8; 128]> {
    debug_assert!(label.is_ascii());
    let mut full_seed = ArrayVec::default();
    full_seed.extend_from_slice(label.as_bytes());
    full_seed.extend_from_slice(seed);
    full_seed
}

fn hmac(secret: &[u8]) -> Result<HmacSha256, String> {
    HmacSha256::new_from_slice(secret).map_err(|_| "Invalid HMAC key".to_string())
}

fn p_hash(secret: &[u8], full_seed: &[u8], output_len: usize) -> Result<ArrayVec<[u8; 128]>, String> {
    let mut result = ArrayVec::default();

    // A(1) = HMAC_hash(secret, A(0)) where A(0) = seed
    let mut mac = hmac(secret)?;
    mac.update(full_seed);
    let mut a = mac.finalize().into_bytes();

    while result.len() < output_len {
        // HMAC_hash(secret, A(i) + seed)
        let mut mac = hmac(secret)?;
        mac.update(&a);
        mac.update(full_seed);
        let output = mac.finalize().into_bytes();

        let remaining = output_len - result.len();
        let to_copy = remaining.min(output.len());
        result.extend_from_slice(&output[..to_copy]);

        if result.len() < output_len {
            // A(i+1) = HMAC_hash(secret, A(i))
            let mut mac = hmac(secret)?;
            mac.update(&a);
            a = mac.finalize().into_bytes();
        }
    }

    Ok(result)
}

/// PSK premaster secret (RFC 4279 2): u16(N) ‖ N zero bytes ‖ u16(N) ‖ psk.
pub fn psk_pre_master_secret(psk: &[u8]) -> Zeroizing<Vec<u8>> {
    let n = (psk.len() as u16).to_be_bytes();
    let mut out = Zeroizing::new(Vec::with_capacity(4 + psk.len() * 2));
    out.extend_from_slice(&n);
    out.resize(2 + psk.len(), 0);
    out.extend_from_slice(&n);
    out.extend_from_slice(psk);
    out
}

/// master_secret = PRF(pre_master_secret, "master secret", client_random + server_random)[0..48]
pub fn master_secret(
    pre_master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> Result<Zeroizing<[u8; MASTER_SECRET_LEN]>, String> {
    let mut seed = [0u8; 64];
    seed[..32].copy_from_slice(client_random);
    seed[32..].copy_from_slice(server_random);

    let mut out = prf_tls12(pre_master_secret, "master secret", &seed, MASTER_SECRET_LEN)?;
    let mut master = Zeroizing::new([0u8; MASTER_SECRET_LEN]);
    master.copy_from_slice(&out);
    out.as_mut_slice().zeroize();
    Ok(master)
}

/// Key expansion for TLS 1.2
/// as specified in RFC 5246 Section 6.3
pub fn key_expansion(
    master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    key_material_length: usize,
) -> Result<Zeroizing<Vec<u8>>, String> {
    // For key expansion, the seed is server_random + client_random
    let mut seed = [0u8; 64];
    seed[..32].copy_from_slice(server_random);
    seed[32..].copy_from_slice(client_random);

    let mut out = prf_tls12(master_secret, "key expansion", &seed, key_material_length)?;
    let key_block = Zeroizing::new(out.to_vec());
    out.as_mut_slice().zeroize();
    Ok(key_block)
}

/// verify_data = PRF(master_secret, finished_label, SHA-256(handshake_messages))[0..12]
pub fn verify_data(
    master_secret: &[u8],
    label: &str,
    transcript: &[u8],
) -> Result<[u8; VERIFY_DATA_LEN], String> {
    let hash = Sha256::digest(transcript);
    let out = prf_tls12(master_secret, label, &hash, VERIFY_DATA_LEN)?;
    let mut verify_data = [0u8; VERIFY_DATA_LEN];
    verify_data.copy_from_slice(&out);
    Ok(verify_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Published P_SHA256 vector for the TLS 1.2 PRF.
    const SECRET: [u8; 16] = [
        0x9b, 0xbe, 0x43, 0x6b, 0xa9, 0x40, 0xf0, 0x17, 0xb1, 0x76, 0x52, 0x84, 0x9a, 0x71, 0xdb,
        0x35,
    ];
    const SEED: [u8; 16] = [
        0xa0, 0xba, 0x9f, 0x93, 0x6c, 0xda, 0x31, 0x18, 0x27, 0xa6, 0xf7, 0x96, 0xff, 0xd5, 0x19,
        0x8c,
    ];
    const EXPECTED: [u8; 100] = [
        0xe3, 0xf2, 0x29, 0xba, 0x72, 0x7b, 0xe1, 0x7b, 0x8d, 0x12, 0x26, 0x20, 0x55, 0x7c, 0xd4,
        0x53, 0xc2, 0xaa, 0xb2, 0x1d, 0x07, 0xc3, 0xd4, 0x95, 0x32, 0x9b, 0x52, 0xd4, 0xe6, 0x1e,
        0xdb, 0x5a, 0x6b, 0x30, 0x17, 0x91, 0xe9, 0x0d, 0x35, 0xc9, 0xc9, 0xa4, 0x6b, 0x4e, 0x14,
        0xba, 0xf9, 0xaf, 0x0f, 0xa0, 0x22, 0xf7, 0x07, 0x7d, 0xef, 0x17, 0xab, 0xfd, 0x37, 0x97,
        0xc0, 0x56, 0x4b, 0xab, 0x4f, 0xbc, 0x91, 0x66, 0x6e, 0x9d, 0xef, 0x9b, 0x97, 0xfc, 0xe3,
        0x4f, 0x79, 0x67, 0x89, 0xba, 0xa4, 0x80, 0x82, 0xd1, 0x22, 0xee, 0x42, 0xc5, 0xa7, 0x2e,
        0x5a, 0x51, 0x10, 0xff, 0xf7, 0x01, 0x87, 0x34, 0x7b, 0x66,
    ];

    #[test]
    fn prf_sha256_vector() {
        let out = prf_tls12(&SECRET, "test label", &SEED, 100).unwrap();
        assert_eq!(out.as_slice(), &EXPECTED[..]);
    }

    #[test]
    fn prf_prefix_is_stable() {
        let short = prf_tls12(&SECRET, "test label", &SEED, 20).unwrap();
        assert_eq!(short.as_slice(), &EXPECTED[..20]);
    }

    #[test]
    fn psk_premaster_layout() {
        let pre = psk_pre_master_secret(&[0xAA, 0xBB, 0xCC]);
        assert_eq!(
            pre.as_slice(),
            &[0x00, 0x03, 0, 0, 0, 0x00, 0x03, 0xAA, 0xBB, 0xCC]
        );
    }

    #[test]
    fn verify_data_depends_on_label() {
        let master = [5u8; 48];
        let c = verify_data(&master, "client finished", b"transcript").unwrap();
        let s = verify_data(&master, "server finished", b"transcript").unwrap();
        assert_ne!(c, s);
    }

    #[test]
    fn expansion_swaps_randoms() {
        let master = [1u8; 48];
        let a = [2u8; 32];
        let b = [3u8; 32];
        let k1 = key_expansion(&master, &a, &b, 40).unwrap();
        let k2 = key_expansion(&master, &b, &a, 40).unwrap();
        assert_eq!(k1.len(), 40);
        assert_ne!(k1.as_slice(), k2.as_slice());
    }
}
