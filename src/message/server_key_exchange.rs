use crate::buffer::Buf;
use crate::util::opaque16;
use nom::IResult;

/// PSK ServerKeyExchange (RFC 4279 2). Carries only the identity hint.
#[derive(Debug, PartialEq, Eq)]
pub struct ServerKeyExchange {
    pub psk_identity_hint: Buf,
}

impl ServerKeyExchange {
    pub fn new(psk_identity_hint: &[u8]) -> Self {
        ServerKeyExchange {
            psk_identity_hint: Buf::from_slice(psk_identity_hint),
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ServerKeyExchange> {
        let (input, hint) = opaque16(input)?;
        Ok((input, ServerKeyExchange::new(hint)))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.extend_from_slice(&(self.psk_identity_hint.len() as u16).to_be_bytes());
        output.extend_from_slice(&self.psk_identity_hint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let ske = ServerKeyExchange::new(b"hint");
        let mut serialized = Buf::new();
        ske.serialize(&mut serialized);
        assert_eq!(&*serialized, &[0x00, 0x04, b'h', b'i', b'n', b't']);

        let (rest, parsed) = ServerKeyExchange::parse(&serialized).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, ske);
    }

    #[test]
    fn empty_hint() {
        let (_, parsed) = ServerKeyExchange::parse(&[0x00, 0x00]).unwrap();
        assert!(parsed.psk_identity_hint.is_empty());
    }
}
