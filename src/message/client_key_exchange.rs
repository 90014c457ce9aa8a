use crate::buffer::Buf;
use crate::util::opaque16;
use nom::IResult;

/// PSK ClientKeyExchange (RFC 4279 2). Names the key the client wants to use.
#[derive(Debug, PartialEq, Eq)]
pub struct ClientKeyExchange {
    pub psk_identity: Buf,
}

impl ClientKeyExchange {
    pub fn new(psk_identity: &[u8]) -> Self {
        ClientKeyExchange {
            psk_identity: Buf::from_slice(psk_identity),
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ClientKeyExchange> {
        let (input, identity) = opaque16(input)?;
        Ok((input, ClientKeyExchange::new(identity)))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.extend_from_slice(&(self.psk_identity.len() as u16).to_be_bytes());
        output.extend_from_slice(&self.psk_identity);
    }
}
