use nom::number::complete::be_u16;
use nom::IResult;
use tinyvec::ArrayVec;

use crate::buffer::Buf;

/// Bounded list of cipher suites as carried in a ClientHello.
pub type CipherSuiteVec = ArrayVec<[CipherSuite; 32]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
/// PSK cipher suites known to the engine.
pub enum CipherSuite {
    // Legacy PSK suites (RFC 4279). Negotiable, but without an AEAD transform.
    /// TLS_PSK_WITH_RC4_128_SHA
    PSK_WITH_RC4_128_SHA, // 0x008A
    /// TLS_PSK_WITH_3DES_EDE_CBC_SHA
    PSK_WITH_3DES_EDE_CBC_SHA, // 0x008B
    /// TLS_PSK_WITH_AES_128_CBC_SHA
    PSK_WITH_AES_128_CBC_SHA, // 0x008C
    /// TLS_PSK_WITH_AES_256_CBC_SHA
    PSK_WITH_AES_256_CBC_SHA, // 0x008D

    // AES-CCM suites (RFC 6655).
    /// TLS_PSK_WITH_AES_128_CCM
    PSK_WITH_AES_128_CCM, // 0xC0A4
    /// TLS_PSK_WITH_AES_256_CCM
    PSK_WITH_AES_256_CCM, // 0xC0A5
    /// TLS_PSK_WITH_AES_128_CCM_8
    PSK_WITH_AES_128_CCM_8, // 0xC0A8
    /// TLS_PSK_WITH_AES_256_CCM_8
    PSK_WITH_AES_256_CCM_8, // 0xC0A9

    /// Unknown or unsupported cipher suite by its IANA value
    Unknown(u16),
}

/// Record protection parameters of an AEAD suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AeadParams {
    /// Length of each direction's write key.
    pub key_len: usize,
    /// Length of the implicit (fixed) part of the nonce.
    pub fixed_iv_len: usize,
    /// Length of the authentication tag appended to every record.
    pub tag_len: usize,
}

impl Default for CipherSuite {
    fn default() -> Self {
        Self::Unknown(0)
    }
}

impl CipherSuite {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x008A => CipherSuite::PSK_WITH_RC4_128_SHA,
            0x008B => CipherSuite::PSK_WITH_3DES_EDE_CBC_SHA,
            0x008C => CipherSuite::PSK_WITH_AES_128_CBC_SHA,
            0x008D => CipherSuite::PSK_WITH_AES_256_CBC_SHA,
            0xC0A4 => CipherSuite::PSK_WITH_AES_128_CCM,
            0xC0A5 => CipherSuite::PSK_WITH_AES_256_CCM,
            0xC0A8 => CipherSuite::PSK_WITH_AES_128_CCM_8,
            0xC0A9 => CipherSuite::PSK_WITH_AES_256_CCM_8,
            _ => CipherSuite::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CipherSuite::PSK_WITH_RC4_128_SHA => 0x008A,
            CipherSuite::PSK_WITH_3DES_EDE_CBC_SHA => 0x008B,
            CipherSuite::PSK_WITH_AES_128_CBC_SHA => 0x008C,
            CipherSuite::PSK_WITH_AES_256_CBC_SHA => 0x008D,
            CipherSuite::PSK_WITH_AES_128_CCM => 0xC0A4,
            CipherSuite::PSK_WITH_AES_256_CCM => 0xC0A5,
            CipherSuite::PSK_WITH_AES_128_CCM_8 => 0xC0A8,
            CipherSuite::PSK_WITH_AES_256_CCM_8 => 0xC0A9,
            CipherSuite::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], CipherSuite> {
        let (input, value) = be_u16(input)?;
        Ok((input, CipherSuite::from_u16(value)))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.extend_from_slice(&self.as_u16().to_be_bytes());
    }

    /// Every suite the engine recognises, AEAD suites first.
    pub const fn all() -> &'static [CipherSuite] {
        &[
            CipherSuite::PSK_WITH_AES_128_CCM,
            CipherSuite::PSK_WITH_AES_256_CCM,
            CipherSuite::PSK_WITH_AES_128_CCM_8,
            CipherSuite::PSK_WITH_AES_256_CCM_8,
            CipherSuite::PSK_WITH_RC4_128_SHA,
            CipherSuite::PSK_WITH_3DES_EDE_CBC_SHA,
            CipherSuite::PSK_WITH_AES_128_CBC_SHA,
            CipherSuite::PSK_WITH_AES_256_CBC_SHA,
        ]
    }

    /// Suites that can actually protect records.
    pub const fn supported() -> &'static [CipherSuite] {
        &[
            CipherSuite::PSK_WITH_AES_128_CCM,
            CipherSuite::PSK_WITH_AES_256_CCM,
            CipherSuite::PSK_WITH_AES_128_CCM_8,
            CipherSuite::PSK_WITH_AES_256_CCM_8,
        ]
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, CipherSuite::Unknown(_))
    }

    /// Key, IV and tag sizes for the AEAD suites. `None` for the legacy
    /// stream/block suites, which have no record transform here.
    pub fn aead_params(&self) -> Option<AeadParams> {
        let (key_len, tag_len) = match self {
            CipherSuite::PSK_WITH_AES_128_CCM => (16, 16),
            CipherSuite::PSK_WITH_AES_256_CCM => (32, 16),
            CipherSuite::PSK_WITH_AES_128_CCM_8 => (16, 8),
            CipherSuite::PSK_WITH_AES_256_CCM_8 => (32, 8),
            _ => return None,
        };
        Some(AeadParams {
            key_len,
            fixed_iv_len: 4,
            tag_len,
        })
    }
}
