//! Wire-level value types shared by the record layer and the handshake.

use std::cmp::Ordering;
use std::fmt;

mod cipher_suite;
mod comp_meth;
mod ctype;
mod random;
mod version;

pub use cipher_suite::{CipherSuite, CipherSuiteVec};
pub use comp_meth::{CompressionMethod, CompressionMethodVec};
pub use ctype::ContentType;
pub use random::Random;
pub use version::ProtocolVersion;

/// Which side of the association we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Server => write!(f, "server"),
        }
    }
}

/// Largest sequence number representable in the 48-bit record field.
pub const MAX_SEQUENCE_NUMBER: u64 = (1 << 48) - 1;

/// Epoch and sequence number of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Sequence {
    /// The epoch (incremented on key change).
    pub epoch: u16,
    /// The sequence number within the epoch (technically u48).
    pub sequence_number: u64,
}

impl Sequence {
    /// Create a new sequence with the given epoch and sequence number 0.
    pub fn new(epoch: u16) -> Self {
        Self {
            epoch,
            sequence_number: 0,
        }
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[epoch: {}, sequence_number: {}]",
            self.epoch, self.sequence_number,
        )
    }
}

impl Ord for Sequence {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then(self.sequence_number.cmp(&other.sequence_number))
    }
}

impl PartialOrd for Sequence {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_orders_by_epoch_first() {
        let a = Sequence {
            epoch: 0,
            sequence_number: 100,
        };
        let b = Sequence {
            epoch: 1,
            sequence_number: 0,
        };
        assert!(a < b);
        assert_eq!(MAX_SEQUENCE_NUMBER, 0xFFFF_FFFF_FFFF);
    }
}
