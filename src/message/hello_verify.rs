//! HelloVerifyRequest (RFC 6347 4.2.1).
//!
//! The server's stateless reply to a ClientHello without a valid cookie.
//! The client must echo `cookie` in its next ClientHello.

use nom::error::{Error, ErrorKind};
use nom::IResult;

use super::id::Cookie;
use crate::buffer::Buf;
use crate::types::ProtocolVersion;

#[derive(Debug, PartialEq, Eq)]
pub struct HelloVerifyRequest {
    /// Always DTLS 1.2 when we send it. Peers may put DTLS 1.0 here.
    pub server_version: ProtocolVersion,
    pub cookie: Cookie,
}

impl HelloVerifyRequest {
    pub fn new(server_version: ProtocolVersion, cookie: Cookie) -> Self {
        HelloVerifyRequest {
            server_version,
            cookie,
        }
    }

    /// An empty cookie can never verify, so it fails the parse.
    pub fn parse(input: &[u8]) -> IResult<&[u8], HelloVerifyRequest> {
        let (rest, server_version) = ProtocolVersion::parse(input)?;
        let (rest, cookie) = Cookie::parse(rest)?;

        if cookie.is_empty() {
            return Err(nom::Err::Failure(Error::new(rest, ErrorKind::LengthValue)));
        }

        Ok((rest, HelloVerifyRequest::new(server_version, cookie)))
    }

    pub fn serialize(&self, output: &mut Buf) {
        self.server_version.serialize(output);
        self.cookie.serialize(output);
    }
}
