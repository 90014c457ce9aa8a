use std::ops::RangeFrom;

use nom::bytes::complete::take;
use nom::error::{make_error, ErrorKind, ParseError};
use nom::number::complete::be_u16;
use nom::{Err, IResult, InputIter, InputLength, Slice};

pub fn be_u48<I, E: ParseError<I>>(input: I) -> IResult<I, u64, E>
where
    I: Slice<RangeFrom<usize>> + InputIter<Item = u8> + InputLength,
{
    let bound: usize = 6;

    if input.input_len() < bound {
        Err(Err::Error(make_error(input, ErrorKind::Eof)))
    } else {
        let mut res = 0u64;

        for byte in input.iter_elements().take(bound) {
            res = (res << 8) + byte as u64;
        }

        Ok((input.slice(bound..), res))
    }
}

/// A u16 length-prefixed opaque value, as used for PSK identities.
pub fn opaque16(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, len) = be_u16(input)?;
    take(len as usize)(input)
}

/// Consume an optional trailing extensions block. Hello extensions are
/// accepted on the wire but none are acted on.
pub fn skip_extensions(input: &[u8]) -> IResult<&[u8], ()> {
    if input.is_empty() {
        return Ok((input, ()));
    }
    let (input, len) = be_u16(input)?;
    let (input, _) = take(len as usize)(input)?;
    Ok((input, ()))
}
