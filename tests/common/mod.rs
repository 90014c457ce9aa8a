#![allow(unused)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use pskdtls::{CipherSuite, Config, ConfigBuilder, Connection, Error, MemoryTransport};

pub const IDENTITY: &[u8] = b"Client_identity";
pub const PSK: &[u8] = b"secretPSK";

pub fn client_addr() -> SocketAddr {
    "10.0.0.1:5684".parse().unwrap()
}

pub fn server_addr() -> SocketAddr {
    "10.0.0.2:5684".parse().unwrap()
}

/// Builder with the shared PSK and short timers.
pub fn fast_config() -> ConfigBuilder {
    Config::builder()
        .psk(IDENTITY, PSK)
        .psk_identity_hint(b"Server_hint")
        .flight_start_rto(Duration::from_millis(100))
        .flight_retries(4)
        .handshake_timeout(Duration::from_secs(10))
        .read_timeout(Some(Duration::from_secs(5)))
}

pub fn config() -> Arc<Config> {
    Arc::new(fast_config().build().unwrap())
}

pub fn suite_config(suite: CipherSuite) -> Arc<Config> {
    Arc::new(fast_config().cipher_suites(&[suite]).build().unwrap())
}

pub fn transports() -> (MemoryTransport, MemoryTransport) {
    MemoryTransport::pair(client_addr(), server_addr())
}

pub fn spawn_server(
    transport: MemoryTransport,
    config: Arc<Config>,
) -> JoinHandle<Result<Connection<MemoryTransport>, Error>> {
    thread::spawn(move || Connection::accept(transport, config))
}

/// Complete a handshake between two fresh ends.
pub fn connected(
    client: Arc<Config>,
    server: Arc<Config>,
) -> (Connection<MemoryTransport>, Connection<MemoryTransport>) {
    let _ = env_logger::try_init();
    let (tc, ts) = transports();
    let server = spawn_server(ts, server);
    let client = Connection::connect_with(tc, server_addr(), client).unwrap();
    (client, server.join().unwrap().unwrap())
}

/// Record content type and epoch of the first record in a datagram.
pub fn first_record(datagram: &[u8]) -> (u8, u16) {
    (datagram[0], u16::from_be_bytes([datagram[3], datagram[4]]))
}
