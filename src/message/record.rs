use nom::bytes::complete::take;
use nom::number::complete::be_u16;
use nom::IResult;

use crate::buffer::Buf;
use crate::types::{ContentType, ProtocolVersion, Sequence, MAX_SEQUENCE_NUMBER};
use crate::util::be_u48;
use crate::Error;

/// Largest plaintext fragment of a record (2^14).
pub const MAX_FRAGMENT_LEN: usize = 16_384;

/// Largest protected fragment a peer may send (2^14 + 2048).
pub const MAX_CIPHERTEXT_LEN: usize = MAX_FRAGMENT_LEN + 2048;

#[derive(Debug, PartialEq, Eq)]
pub struct DTLSRecord<'a> {
    pub content_type: ContentType,
    pub version: ProtocolVersion,
    pub sequence: Sequence,
    pub length: u16,
    pub fragment: &'a [u8],
}

impl<'a> DTLSRecord<'a> {
    /// DTLS record header length: content_type(1) + version(2) + epoch(2) + seq(6) + length(2)
    pub const HEADER_LEN: usize = 13;

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], DTLSRecord<'a>> {
        let (input, content_type) = ContentType::parse(input)?;
        let (input, version) = ProtocolVersion::parse(input)?;
        let (input, epoch) = be_u16(input)?;
        let (input, sequence_number) = be_u48(input)?;
        let (input, length) = be_u16(input)?;
        let (input, fragment) = take(length as usize)(input)?;

        Ok((
            input,
            DTLSRecord {
                content_type,
                version,
                sequence: Sequence {
                    epoch,
                    sequence_number,
                },
                length,
                fragment,
            },
        ))
    }

    /// Decode the next record of a datagram.
    ///
    /// Unlike [`DTLSRecord::parse`] this reports why a record is unusable: a
    /// truncated header, a length field above the protocol maximum, or a
    /// length field claiming more bytes than the datagram holds.
    pub fn decode(input: &'a [u8]) -> Result<(&'a [u8], DTLSRecord<'a>), Error> {
        if input.len() < Self::HEADER_LEN {
            return Err(Error::TooShort);
        }

        let declared = u16::from_be_bytes([input[11], input[12]]) as usize;
        if declared > MAX_CIPHERTEXT_LEN {
            return Err(Error::TooBigLength {
                len: declared,
                max: MAX_CIPHERTEXT_LEN,
            });
        }

        let available = input.len() - Self::HEADER_LEN;
        // Leftover bytes too short for another header mean the length
        // field itself is wrong.
        let trailing = available.saturating_sub(declared);
        if declared > available || (1..Self::HEADER_LEN).contains(&trailing) {
            return Err(Error::LengthMismatch {
                declared,
                available,
            });
        }

        let (rest, record) = Self::parse(input)?;
        Ok((rest, record))
    }

    pub fn serialize(&self, output: &mut Buf) {
        debug_assert_eq!(self.length as usize, self.fragment.len());
        debug_assert!(self.sequence.sequence_number <= MAX_SEQUENCE_NUMBER);

        output.push(self.content_type.as_u8());
        self.version.serialize(output);
        output.extend_from_slice(&self.sequence.epoch.to_be_bytes());
        output.extend_from_slice(&self.sequence.sequence_number.to_be_bytes()[2..]);
        output.extend_from_slice(&self.length.to_be_bytes());
        output.extend_from_slice(self.fragment);
    }
}
