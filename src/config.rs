use std::time::Duration;

use zeroize::Zeroizing;

use crate::message::MAX_FRAGMENT_LEN;
use crate::types::CipherSuite;
use crate::Error;

/// Longest PSK accepted (RFC 4279 2).
pub const MAX_PSK_LEN: usize = 64;

/// Longest PSK identity or identity hint.
pub const MAX_IDENTITY_LEN: usize = 128;

/// Smallest max fragment length. Handshake messages are never fragmented
/// and must fit one record.
pub const MIN_FRAGMENT_LEN: usize = 256;

/// DTLS configuration
#[derive(Clone)]
pub struct Config {
    psk: Zeroizing<Vec<u8>>,
    psk_identity: Vec<u8>,
    psk_identity_hint: Vec<u8>,
    cipher_suites: Vec<CipherSuite>,
    max_fragment_len: usize,
    flight_start_rto: Duration,
    flight_retries: usize,
    handshake_timeout: Duration,
    read_timeout: Option<Duration>,
    rng_seed: Option<u64>,
    cookie_secret: Option<[u8; 32]>,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            psk: Zeroizing::new(Vec::new()),
            psk_identity: Vec::new(),
            psk_identity_hint: Vec::new(),
            cipher_suites: CipherSuite::supported().to_vec(),
            max_fragment_len: MAX_FRAGMENT_LEN,
            flight_start_rto: Duration::from_secs(1),
            flight_retries: 4,
            handshake_timeout: Duration::from_secs(40),
            read_timeout: None,
            rng_seed: None,
            cookie_secret: None,
        }
    }

    /// The pre-shared key.
    #[inline(always)]
    pub fn psk(&self) -> &[u8] {
        &self.psk
    }

    /// Identity the client names in ClientKeyExchange, and the only one a
    /// server accepts.
    #[inline(always)]
    pub fn psk_identity(&self) -> &[u8] {
        &self.psk_identity
    }

    /// Hint a server sends in ServerKeyExchange.
    #[inline(always)]
    pub fn psk_identity_hint(&self) -> &[u8] {
        &self.psk_identity_hint
    }

    /// Suites in preference order.
    ///
    /// A client offers them in this order; a server accepts these.
    #[inline(always)]
    pub fn cipher_suites(&self) -> &[CipherSuite] {
        &self.cipher_suites
    }

    /// Largest plaintext fragment per record.
    #[inline(always)]
    pub fn max_fragment_len(&self) -> usize {
        self.max_fragment_len
    }

    /// Time of first retry.
    ///
    /// Every flight restarts with this value.
    /// Doubled for every retry with a ±25% jitter.
    #[inline(always)]
    pub fn flight_start_rto(&self) -> Duration {
        self.flight_start_rto
    }

    /// Max number of retries per flight.
    #[inline(always)]
    pub fn flight_retries(&self) -> usize {
        self.flight_retries
    }

    /// Timeout for the entire handshake, regardless of flights.
    #[inline(always)]
    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// How long `recv` waits for application data. `None` blocks.
    #[inline(always)]
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Seed for the random generator. Only for tests.
    #[inline(always)]
    pub fn rng_seed(&self) -> Option<u64> {
        self.rng_seed
    }

    /// Server cookie secret. Random per listener when unset.
    #[inline(always)]
    pub fn cookie_secret(&self) -> Option<[u8; 32]> {
        self.cookie_secret
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("psk_identity", &String::from_utf8_lossy(&self.psk_identity))
            .field("cipher_suites", &self.cipher_suites)
            .field("max_fragment_len", &self.max_fragment_len)
            .field("flight_start_rto", &self.flight_start_rto)
            .field("flight_retries", &self.flight_retries)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

/// Builder for DTLS configuration.
pub struct ConfigBuilder {
    psk: Zeroizing<Vec<u8>>,
    psk_identity: Vec<u8>,
    psk_identity_hint: Vec<u8>,
    cipher_suites: Vec<CipherSuite>,
    max_fragment_len: usize,
    flight_start_rto: Duration,
    flight_retries: usize,
    handshake_timeout: Duration,
    read_timeout: Option<Duration>,
    rng_seed: Option<u64>,
    cookie_secret: Option<[u8; 32]>,
}

impl ConfigBuilder {
    /// Set the pre-shared key and the identity it is known by.
    ///
    /// Required.
    pub fn psk(mut self, identity: &[u8], key: &[u8]) -> Self {
        self.psk_identity = identity.to_vec();
        self.psk = Zeroizing::new(key.to_vec());
        self
    }

    /// Set the identity hint a server sends.
    ///
    /// Defaults to empty.
    pub fn psk_identity_hint(mut self, hint: &[u8]) -> Self {
        self.psk_identity_hint = hint.to_vec();
        self
    }

    /// Set the cipher suites in preference order.
    ///
    /// Defaults to the four AES-CCM suites.
    pub fn cipher_suites(mut self, suites: &[CipherSuite]) -> Self {
        self.cipher_suites = suites.to_vec();
        self
    }

    /// Set the largest plaintext fragment per record.
    ///
    /// Defaults to 16384, which is also the maximum. The minimum is 256.
    pub fn max_fragment_len(mut self, len: usize) -> Self {
        self.max_fragment_len = len;
        self
    }

    /// Set the time of first retry.
    ///
    /// Every flight restarts with this value.
    /// Doubled for every retry with a ±25% jitter.
    /// Defaults to 1 second.
    pub fn flight_start_rto(mut self, rto: Duration) -> Self {
        self.flight_start_rto = rto;
        self
    }

    /// Set the max number of retries per flight.
    ///
    /// Defaults to 4.
    pub fn flight_retries(mut self, retries: usize) -> Self {
        self.flight_retries = retries;
        self
    }

    /// Set the timeout for the entire handshake, regardless of flights.
    ///
    /// Defaults to 40 seconds.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set how long `recv` waits for application data.
    ///
    /// Defaults to waiting forever.
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Seed the random generator for reproducible runs.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Use a fixed cookie secret instead of a random one.
    pub fn cookie_secret(mut self, secret: [u8; 32]) -> Self {
        self.cookie_secret = Some(secret);
        self
    }

    /// Build the configuration.
    ///
    /// Returns `Error::ConfigError` when a value is out of range.
    pub fn build(self) -> Result<Config, Error> {
        if self.psk.is_empty() || self.psk.len() > MAX_PSK_LEN {
            return Err(Error::ConfigError(format!(
                "PSK must be 1..={} bytes, got {}",
                MAX_PSK_LEN,
                self.psk.len()
            )));
        }

        if self.psk_identity.len() > MAX_IDENTITY_LEN
            || self.psk_identity_hint.len() > MAX_IDENTITY_LEN
        {
            return Err(Error::ConfigError(format!(
                "PSK identity and hint must be at most {} bytes",
                MAX_IDENTITY_LEN
            )));
        }

        if self.cipher_suites.is_empty() {
            return Err(Error::ConfigError("No cipher suites".to_string()));
        }

        if let Some(s) = self.cipher_suites.iter().find(|s| !s.is_known()) {
            return Err(Error::ConfigError(format!(
                "Unknown cipher suite: 0x{:04x}",
                s.as_u16()
            )));
        }

        if !self.cipher_suites.iter().any(|s| s.aead_params().is_some()) {
            return Err(Error::ConfigError(
                "At least one AES-CCM cipher suite is required".to_string(),
            ));
        }

        if self.max_fragment_len < MIN_FRAGMENT_LEN || self.max_fragment_len > MAX_FRAGMENT_LEN {
            return Err(Error::ConfigError(format!(
                "max_fragment_len must be {}..={}, got {}",
                MIN_FRAGMENT_LEN, MAX_FRAGMENT_LEN, self.max_fragment_len
            )));
        }

        if self.flight_start_rto.is_zero() || self.handshake_timeout.is_zero() {
            return Err(Error::ConfigError(
                "Flight and handshake timeouts must be non-zero".to_string(),
            ));
        }

        Ok(Config {
            psk: self.psk,
            psk_identity: self.psk_identity,
            psk_identity_hint: self.psk_identity_hint,
            cipher_suites: self.cipher_suites,
            max_fragment_len: self.max_fragment_len,
            flight_start_rto: self.flight_start_rto,
            flight_retries: self.flight_retries,
            handshake_timeout: self.handshake_timeout,
            read_timeout: self.read_timeout,
            rng_seed: self.rng_seed,
            cookie_secret: self.cookie_secret,
        })
    }
}
