use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::{be_u16, be_u8};
use nom::{Err, IResult};

use super::{Cookie, SessionId};
use crate::buffer::Buf;
use crate::types::{CipherSuite, CipherSuiteVec, CompressionMethod, CompressionMethodVec};
use crate::types::{ProtocolVersion, Random};
use crate::util::skip_extensions;

#[derive(Debug, PartialEq, Eq)]
pub struct ClientHello {
    pub client_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cookie: Cookie,
    pub cipher_suites: CipherSuiteVec,
    pub compression_methods: CompressionMethodVec,
}

impl ClientHello {
    pub fn new(
        client_version: ProtocolVersion,
        random: Random,
        session_id: SessionId,
        cookie: Cookie,
        cipher_suites: CipherSuiteVec,
        compression_methods: CompressionMethodVec,
    ) -> Self {
        ClientHello {
            client_version,
            random,
            session_id,
            cookie,
            cipher_suites,
            compression_methods,
        }
    }

    /// The same hello with a cookie, as sent in the second ClientHello.
    pub fn with_cookie(mut self, cookie: Cookie) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ClientHello> {
        let (input, client_version) = ProtocolVersion::parse(input)?;
        let (input, random) = Random::parse(input)?;
        let (input, session_id) = SessionId::parse(input)?;
        let (input, cookie) = Cookie::parse(input)?;

        let (input, cipher_suites_len) = be_u16(input)?;
        if cipher_suites_len < 2 || cipher_suites_len % 2 != 0 {
            return Err(Err::Failure(Error::new(input, ErrorKind::LengthValue)));
        }
        let (input, input_cipher) = take(cipher_suites_len)(input)?;
        let cipher_suites = known_cipher_suites(input_cipher);

        let (input, compression_methods_len) = be_u8(input)?;
        if compression_methods_len == 0 {
            return Err(Err::Failure(Error::new(input, ErrorKind::LengthValue)));
        }
        let (input, input_compression) = take(compression_methods_len)(input)?;
        let compression_methods = listed_compression_methods(input_compression);

        let (input, _) = skip_extensions(input)?;

        Ok((
            input,
            ClientHello {
                client_version,
                random,
                session_id,
                cookie,
                cipher_suites,
                compression_methods,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        self.client_version.serialize(output);
        self.random.serialize(output);
        self.session_id.serialize(output);
        self.cookie.serialize(output);

        output.extend_from_slice(&((self.cipher_suites.len() * 2) as u16).to_be_bytes());
        for suite in &self.cipher_suites {
            suite.serialize(output);
        }

        output.push(self.compression_methods.len() as u8);
        for method in &self.compression_methods {
            output.push(method.as_u8());
        }
    }
}

// Suites we do not know are dropped while parsing. A client may offer far
// more than we can hold, and only the known ones matter for negotiation.
fn known_cipher_suites(input: &[u8]) -> CipherSuiteVec {
    let mut suites = CipherSuiteVec::default();
    for pair in input.chunks_exact(2) {
        let suite = CipherSuite::from_u16(u16::from_be_bytes([pair[0], pair[1]]));
        if suite.is_known() && suites.len() < suites.capacity() {
            suites.push(suite);
        }
    }
    suites
}

// The list may hold up to 255 entries. Repeats are dropped, and once we are
// full only null still gets in, replacing the last entry, since it is the
// one method that matters.
fn listed_compression_methods(input: &[u8]) -> CompressionMethodVec {
    let mut methods = CompressionMethodVec::default();
    for &value in input {
        let method = CompressionMethod::from_u8(value);
        if methods.contains(&method) {
            continue;
        }
        if methods.len() < methods.capacity() {
            methods.push(method);
        } else if method == CompressionMethod::Null {
            if let Some(last) = methods.last_mut() {
                *last = method;
            }
        }
    }
    methods
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinyvec::array_vec;

    const MESSAGE: &[u8] = &[
        0xFE, 0xFD, // ProtocolVersion::DTLS1_2
        // Random
        0x00, 0x00, 0x00, 0x01, // gmt_unix_time
        0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02,
        0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02,
        0x00, // SessionId length
        0x02, 0xAA, 0xBB, // Cookie
        0x00, 0x04, // CipherSuites length
        0xC0, 0xA8, // PSK_WITH_AES_128_CCM_8
        0x00, 0x8C, // PSK_WITH_AES_128_CBC_SHA
        0x01, // CompressionMethods length
        0x00, // CompressionMethod::Null
    ];

    fn hello() -> ClientHello {
        ClientHello::new(
            ProtocolVersion::DTLS1_2,
            Random {
                gmt_unix_time: 1,
                random_bytes: [2; 28],
            },
            SessionId::empty(),
            Cookie::try_new(&[0xAA, 0xBB]).unwrap(),
            array_vec![[CipherSuite; 32] =>
                CipherSuite::PSK_WITH_AES_128_CCM_8,
                CipherSuite::PSK_WITH_AES_128_CBC_SHA
            ],
            array_vec![[CompressionMethod; 4] => CompressionMethod::Null],
        )
    }

    #[test]
    fn roundtrip() {
        let client_hello = hello();

        let mut serialized = Buf::new();
        client_hello.serialize(&mut serialized);
        assert_eq!(&*serialized, MESSAGE);

        let (rest, parsed) = ClientHello::parse(&serialized).unwrap();
        assert_eq!(parsed, client_hello);
        assert!(rest.is_empty());
    }

    #[test]
    fn unknown_suites_and_extensions_are_ignored() {
        let mut message = MESSAGE.to_vec();
        // Offer an extra ECDHE suite we do not know.
        message[39] = 0x06;
        message.splice(40..40, [0xC0, 0x2B]);
        // Trailing extensions block.
        message.extend_from_slice(&[0x00, 0x04, 0x00, 0x17, 0x00, 0x00]);

        let (rest, parsed) = ClientHello::parse(&message).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed.cipher_suites, hello().cipher_suites);
    }

    #[test]
    fn odd_cipher_suites_length() {
        let mut message = MESSAGE.to_vec();
        message[39] = 0x03;
        assert!(ClientHello::parse(&message).is_err());
    }

    #[test]
    fn long_compression_list_still_finds_null() {
        let _ = env_logger::try_init();
        let mut message = MESSAGE.to_vec();
        // Six methods, null last: deflate, four unknown, null.
        let at = message.len() - 2;
        message.truncate(at);
        message.extend_from_slice(&[0x06, 0x01, 0x40, 0x41, 0x42, 0x43, 0x00]);

        let (rest, parsed) = ClientHello::parse(&message).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed.compression_methods.len(), 4);
        assert_eq!(parsed.compression_methods[0], CompressionMethod::Deflate);
        assert!(parsed.compression_methods.contains(&CompressionMethod::Null));
    }

    #[test]
    fn repeated_compression_methods_collapse() {
        let _ = env_logger::try_init();
        let mut message = MESSAGE.to_vec();
        let at = message.len() - 2;
        message.truncate(at);
        message.extend_from_slice(&[0x05, 0x00, 0x00, 0x00, 0x00, 0x00]);

        let (_, parsed) = ClientHello::parse(&message).unwrap();
        assert_eq!(parsed.compression_methods.as_slice(), &[CompressionMethod::Null]);
    }

    #[test]
    fn empty_compression_list_fails() {
        let _ = env_logger::try_init();
        let mut message = MESSAGE.to_vec();
        let at = message.len() - 2;
        message.truncate(at);
        message.push(0x00);
        assert!(ClientHello::parse(&message).is_err());
    }

    #[test]
    fn with_cookie_keeps_everything_else() {
        let first = hello().with_cookie(Cookie::empty());
        let second = hello();
        assert!(first.cookie.is_empty());
        assert_eq!(first.random, second.random);
        assert_eq!(first.cipher_suites, second.cipher_suites);
    }
}
