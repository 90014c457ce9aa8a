use crate::buffer::Buf;
use nom::bytes::complete::take;
use nom::IResult;

/// Length of verify_data for every suite negotiated here.
pub const VERIFY_DATA_LEN: usize = 12;

#[derive(Debug, PartialEq, Eq)]
pub struct Finished {
    pub verify_data: [u8; VERIFY_DATA_LEN],
}

impl Finished {
    pub fn new(verify_data: [u8; VERIFY_DATA_LEN]) -> Self {
        Finished { verify_data }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Finished> {
        let (input, data) = take(VERIFY_DATA_LEN)(input)?;
        let mut verify_data = [0u8; VERIFY_DATA_LEN];
        verify_data.copy_from_slice(data);
        Ok((input, Finished { verify_data }))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.extend_from_slice(&self.verify_data);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrip() {
        let verify_data = [
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C,
        ];
        let finished = Finished::new(verify_data);

        // Serialize
        let mut serialized = Buf::new();
        finished.serialize(&mut serialized);
        assert_eq!(&*serialized, &verify_data);

        // Parse and compare with original
        let (rest, parsed) = Finished::parse(&serialized).unwrap();
        assert_eq!(parsed, finished);

        assert!(rest.is_empty());
    }

    #[test]
    fn short_verify_data() {
        assert!(Finished::parse(&[0; 11]).is_err());
    }
}
