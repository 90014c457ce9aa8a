//! Handshake timers: the deadlines themselves and the flight backoff.

use std::ops::Mul;
use std::time::{Duration, Instant};

use crate::rng::SeededRng;

// Fraction of the current RTO.
const JITTER_RANGE: f32 = 0.5;

/// A deadline that is started first and armed on the next wait.
///
/// Arming is deferred so the time spent building and sending a flight does
/// not count against its timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    Disabled,
    Unarmed,
    Armed(Instant),
}

impl Timeout {
    /// Start the timer unless it already runs.
    pub fn start(&mut self) {
        if *self == Timeout::Disabled {
            *self = Timeout::Unarmed;
        }
    }

    /// Arm a started timer to fire `after` from `now`. Returns `true` when
    /// this call armed it.
    pub fn arm(&mut self, now: Instant, after: Duration) -> bool {
        if *self != Timeout::Unarmed {
            return false;
        }
        *self = Timeout::Armed(now + after);
        true
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self {
            Timeout::Armed(at) => Some(*at),
            _ => None,
        }
    }

    pub fn expired(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|at| now >= at)
    }
}

/// The earlier of two optional deadlines.
pub fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Retransmission backoff of a handshake flight.
///
/// Starts at `start_rto`, doubles on every attempt and carries a ±25% jitter
/// so two peers that lost the same datagram do not retransmit in lockstep.
pub struct ExponentialBackoff {
    start_rto: Duration,
    retries: usize,
    rto: Duration,
    jitter: f32,
    left: usize,
}

impl ExponentialBackoff {
    pub fn new(start_rto: Duration, retries: usize, rng: &mut SeededRng) -> Self {
        Self {
            start_rto,
            retries,
            rto: start_rto,
            jitter: Self::jitter(rng),
            left: retries,
        }
    }

    pub fn reset(&mut self, rng: &mut SeededRng) {
        self.rto = self.start_rto;
        self.jitter = Self::jitter(rng);
        self.left = self.retries;
    }

    pub fn rto(&self) -> Duration {
        let delta = self.rto.mul_f32(self.jitter.abs());
        if self.jitter < 0.0 {
            self.rto.saturating_sub(delta)
        } else {
            self.rto + delta
        }
        .max(Duration::from_millis(10))
    }

    // A value between -0.25 and 0.25
    fn jitter(rng: &mut SeededRng) -> f32 {
        rng.random::<f32>() * JITTER_RANGE - (JITTER_RANGE / 2.0)
    }

    pub fn attempt(&mut self, rng: &mut SeededRng) {
        let Some(n) = self.left.checked_sub(1) else {
            return;
        };

        self.left = n;
        self.jitter = Self::jitter(rng);
        self.rto = self.rto.mul(2);
    }

    pub fn can_retry(&self) -> bool {
        self.left > 0
    }
}

impl std::fmt::Debug for ExponentialBackoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExponentialBackoff")
            .field("rto", &self.rto())
            .field("left", &self.left)
            .finish()
    }
}
