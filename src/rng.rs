//! Seedable random number generator for deterministic testing.
//!
//! When a seed is provided via [`Config::rng_seed`][crate::Config::rng_seed],
//! hello randoms, cookie secrets and retransmission jitter become
//! deterministic. This is useful for testing and debugging and must never be
//! used in production.

use rand::distributions::{Distribution, Standard};
use rand::rngs::{OsRng, StdRng};
use rand::{Rng, RngCore, SeedableRng};

/// A random number generator that can be seeded for deterministic behavior.
///
/// When created with a seed, it produces deterministic random values.
/// When created without a seed, it uses the operating system generator.
pub struct SeededRng {
    inner: Option<StdRng>,
}

/// Independent uses of the configured seed.
///
/// Each stream gets its own generator so a seeded listener never hands out
/// the same bytes as cookie secret and hello random, and each association
/// on a transport draws fresh randoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// The cookie secret of a listener.
    Cookie,
    /// The handshake engine of the n-th association on a transport.
    Session(u64),
}

impl Stream {
    fn tweak(self) -> u64 {
        match self {
            // "cookie\0\0"
            Stream::Cookie => 0x636F_6F6B_6965_0000,
            Stream::Session(n) => n.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15),
        }
    }
}

impl SeededRng {
    /// Create a new RNG with an optional seed.
    pub fn new(seed: Option<u64>) -> Self {
        let inner = seed.map(StdRng::seed_from_u64);
        Self { inner }
    }

    /// Create the generator for one [`Stream`] of `seed`.
    pub fn for_stream(seed: Option<u64>, stream: Stream) -> Self {
        Self::new(seed.map(|s| s ^ stream.tweak()))
    }

    /// Generate a random value of type T.
    pub fn random<T>(&mut self) -> T
    where
        Standard: Distribution<T>,
    {
        match self.inner.as_mut() {
            Some(rng) => rng.gen(),
            None => OsRng.gen(),
        }
    }

    /// Fill `dest` with random bytes.
    pub fn fill(&mut self, dest: &mut [u8]) {
        match self.inner.as_mut() {
            Some(rng) => rng.fill_bytes(dest),
            None => OsRng.fill_bytes(dest),
        }
    }
}

impl std::fmt::Debug for SeededRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let is_seeded = self.inner.is_some();
        f.debug_struct("SeededRng")
            .field("seeded", &is_seeded)
            .finish()
    }
}
