//! Blocking DTLS 1.2 with pre-shared keys.
//!
//! Implements the PSK key exchange of RFC 4279 with the AES-CCM suites of
//! RFC 6655 over any datagram [`Transport`]. One [`Connection`] is one
//! association with one peer.
//!
//! ```no_run
//! use std::net::{IpAddr, Ipv4Addr};
//! use std::sync::Arc;
//!
//! use pskdtls::{connect, Config};
//!
//! let config = Config::builder()
//!     .psk(b"Client_identity", b"secretPSK")
//!     .build()
//!     .unwrap();
//!
//! let mut conn = connect(IpAddr::V4(Ipv4Addr::LOCALHOST), 20220, Arc::new(config)).unwrap();
//! conn.send(b"hello").unwrap();
//! let reply = conn.recv().unwrap();
//! ```
#![forbid(unsafe_code)]
#![warn(clippy::all)]
// #![deny(missing_docs)]

#[macro_use]
extern crate log;

mod buffer;
mod config;
mod connection;
mod crypto;
mod error;
mod handshake;
pub(crate) mod message;
mod negotiate;
mod record;
mod rng;
mod timer;
mod transport;
mod types;
mod util;
mod window;

pub use config::{Config, ConfigBuilder, MAX_IDENTITY_LEN, MAX_PSK_LEN, MIN_FRAGMENT_LEN};
pub use connection::{connect, listen, serve, Connection};
pub use error::{Error, ErrorKind};
pub use message::MAX_FRAGMENT_LEN;
pub use transport::{MemoryTransport, Transport, UdpTransport};
pub use types::{CipherSuite, ContentType, ProtocolVersion, Role, Sequence};
