use std::io;

use thiserror::Error;

use crate::types::{ProtocolVersion, Sequence};

/// Errors produced by the DTLS engine.
///
/// Every variant belongs to exactly one [`ErrorKind`], which tells the caller
/// what happened to the connection: transport and protocol failures leave it
/// unusable, while decode, crypto and replay failures only reject a single
/// record.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Transport error: {0}")]
    Io(#[from] io::Error),

    #[error("Peer transport is disconnected")]
    Disconnected,

    #[error("No peer address bound")]
    NoPeer,

    #[error("Too short")]
    TooShort,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Too big length field (> {max}) {len}")]
    TooBigLength { len: usize, max: usize },

    #[error("Record declares {declared} bytes but only {available} are available")]
    LengthMismatch { declared: usize, available: usize },

    #[error("Record for unreadable epoch {0}")]
    UnexpectedEpoch(u16),

    #[error("Invalid content type {0}")]
    InvalidContentType(u8),

    #[error("Fragment of {len} bytes exceeds max fragment length {max}")]
    FragmentTooLarge { len: usize, max: usize },

    #[error("Buffer capacity exceeded: needed {needed}, capacity {capacity}")]
    CapacityExceeded { needed: usize, capacity: usize },

    #[error("Expected protocol version {0} but got: {1}")]
    BadProtocolVersion(ProtocolVersion, ProtocolVersion),

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Cookie rejected by server")]
    CookieRejected,

    #[error("No cipher suite in common")]
    NoCommonCipherSuite,

    #[error("Cipher suite not offered or not supported: 0x{0:04x}")]
    UnsupportedCipherSuite(u16),

    #[error("Compression method not supported: {0}")]
    UnsupportedCompression(u8),

    #[error("Unknown PSK identity")]
    UnknownPskIdentity,

    #[error("Fragmented handshake messages are not supported")]
    FragmentedHandshake,

    #[error("Handshake failure: {0}")]
    HandshakeFailure(String),

    #[error("Sequence number space exhausted for epoch {0}")]
    SequenceExhausted(u16),

    #[error("Epoch is not allowed to wrap")]
    WrappedEpoch,

    #[error("Crypto error: {0}")]
    CryptoError(String),

    #[error("Replayed record {0}")]
    Replay(Sequence),

    #[error("Timeout: {0}")]
    Timeout(&'static str),

    #[error("Config error: {0}")]
    ConfigError(String),
}

/// Category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Socket failure or the peer went away. Fatal.
    Transport,
    /// Malformed or truncated input. The record is dropped.
    Decode,
    /// A payload or datagram did not fit the buffer it was meant for.
    Capacity,
    /// Version, negotiation or message-order failure. The handshake aborts.
    Protocol,
    /// The sequence space is used up. A fresh handshake is needed.
    Sequence,
    /// AEAD failure. The record is never delivered.
    Crypto,
    /// A record that was already seen.
    Replay,
    /// Flight retries or the handshake deadline ran out.
    Timeout,
    /// Invalid configuration.
    Config,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            Io(_) | Disconnected | NoPeer => ErrorKind::Transport,
            TooShort
            | ParseError(_)
            | TooBigLength { .. }
            | LengthMismatch { .. }
            | UnexpectedEpoch(_)
            | InvalidContentType(_) => ErrorKind::Decode,
            FragmentTooLarge { .. } | CapacityExceeded { .. } => ErrorKind::Capacity,
            BadProtocolVersion(_, _)
            | UnexpectedMessage(_)
            | CookieRejected
            | NoCommonCipherSuite
            | UnsupportedCipherSuite(_)
            | UnsupportedCompression(_)
            | UnknownPskIdentity
            | FragmentedHandshake
            | HandshakeFailure(_) => ErrorKind::Protocol,
            SequenceExhausted(_) | WrappedEpoch => ErrorKind::Sequence,
            CryptoError(_) => ErrorKind::Crypto,
            Replay(_) => ErrorKind::Replay,
            Timeout(_) => ErrorKind::Timeout,
            ConfigError(_) => ErrorKind::Config,
        }
    }

    /// Whether the error only concerns the record just received.
    ///
    /// The receiver drops such a record and keeps reading.
    pub fn is_record_local(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Decode | ErrorKind::Crypto | ErrorKind::Replay | ErrorKind::Capacity
        )
    }
}

impl<'a> From<nom::Err<nom::error::Error<&'a [u8]>>> for Error {
    fn from(value: nom::Err<nom::error::Error<&'a [u8]>>) -> Self {
        match value {
            nom::Err::Incomplete(_) => Error::TooShort,
            nom::Err::Error(e) | nom::Err::Failure(e) => match e.code {
                nom::error::ErrorKind::Eof => Error::TooShort,
                code => Error::ParseError(format!("{:?} ({} bytes left)", code, e.input.len())),
            },
        }
    }
}
