use std::time::{SystemTime, UNIX_EPOCH};

use nom::bytes::complete::take;
use nom::number::complete::be_u32;
use nom::IResult;

use crate::buffer::Buf;
use crate::rng::SeededRng;

/// Hello random: a timestamp followed by 28 random bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Random {
    pub gmt_unix_time: u32,
    pub random_bytes: [u8; 28],
}

impl Random {
    pub const LEN: usize = 32;

    pub fn new(now: SystemTime, rng: &mut SeededRng) -> Self {
        // A clock before the epoch is not worth failing a handshake over.
        let gmt_unix_time = now
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);

        let mut random_bytes = [0u8; 28];
        rng.fill(&mut random_bytes);

        Self {
            gmt_unix_time,
            random_bytes,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Random> {
        let (input, gmt_unix_time) = be_u32(input)?;
        let (input, input_rand) = take(28_usize)(input)?;
        let mut random_bytes = [0u8; 28];
        random_bytes.copy_from_slice(input_rand);

        Ok((
            input,
            Random {
                gmt_unix_time,
                random_bytes,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.extend_from_slice(&self.gmt_unix_time.to_be_bytes());
        output.extend_from_slice(&self.random_bytes);
    }

    /// The 32 wire bytes, as used in PRF seeds.
    pub fn to_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[..4].copy_from_slice(&self.gmt_unix_time.to_be_bytes());
        out[4..].copy_from_slice(&self.random_bytes);
        out
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn random_parse() {
        let data = [
            0x5F, 0x37, 0xA9, 0x4B, // gmt_unix_time
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
            0x0F, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x1B, 0x1C,
        ];

        let (rest, parsed) = Random::parse(&data).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed.gmt_unix_time, 0x5F37A94B);
        assert_eq!(parsed.random_bytes[0], 0x01);
        assert_eq!(parsed.random_bytes[27], 0x1C);
        assert_eq!(parsed.to_bytes(), data);
    }

    #[test]
    fn random_uses_clock_and_rng() {
        let now = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let a = Random::new(now, &mut SeededRng::new(Some(1)));
        let b = Random::new(now, &mut SeededRng::new(Some(1)));
        let c = Random::new(now, &mut SeededRng::new(Some(2)));

        assert_eq!(a.gmt_unix_time, 1_700_000_000);
        assert_eq!(a, b);
        assert_ne!(a.random_bytes, c.random_bytes);
    }
}
