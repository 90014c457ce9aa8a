//! Wire formats of the record layer and the PSK handshake messages.

mod client_hello;
mod client_key_exchange;
mod finished;
mod handshake;
mod hello_verify;
mod id;
mod record;
mod server_hello;
mod server_key_exchange;

pub use client_hello::ClientHello;
pub use client_key_exchange::ClientKeyExchange;
pub use finished::{Finished, VERIFY_DATA_LEN};
pub use handshake::{Body, Handshake};
pub use hello_verify::HelloVerifyRequest;
pub use id::{Cookie, SessionId};
pub use record::{DTLSRecord, MAX_CIPHERTEXT_LEN, MAX_FRAGMENT_LEN};
pub use server_hello::ServerHello;
pub use server_key_exchange::ServerKeyExchange;
