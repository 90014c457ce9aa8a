//! Established DTLS associations and the entry points that create them.

use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::error::ErrorKind;
use crate::handshake::{Client, Engine, Server};
use crate::negotiate::CookieGenerator;
use crate::rng::{SeededRng, Stream};
use crate::transport::{Transport, UdpTransport};
use crate::types::{CipherSuite, ContentType, Role, MAX_SEQUENCE_NUMBER};
use crate::Error;

/// A DTLS association with one peer whose handshake has completed.
///
/// All state, the transport binding included, belongs to the connection.
/// Dropping it (or calling [`Connection::close`]) releases the transport
/// and wipes the key material.
pub struct Connection<T> {
    engine: Engine<T>,
}

impl<T: Transport> Connection<T> {
    /// Run the client handshake with `peer` over `transport`.
    ///
    /// Blocks until the handshake is done, or fails with the flight or
    /// handshake timeout from `config`.
    pub fn connect_with(transport: T, peer: SocketAddr, config: Arc<Config>) -> Result<Self, Error> {
        Self::client_session(transport, peer, config, 0)
    }

    /// Run the server handshake over `transport` with the first client
    /// that completes the cookie exchange.
    pub fn accept(transport: T, config: Arc<Config>) -> Result<Self, Error> {
        Self::server_session(transport, config, 0)
    }

    fn client_session(
        transport: T,
        peer: SocketAddr,
        config: Arc<Config>,
        session: u64,
    ) -> Result<Self, Error> {
        info!("Connecting to {}", peer);
        let mut engine = Engine::new(transport, Some(peer), config, Role::Client, session);
        Client::new(&mut engine).run()?;
        Ok(Connection { engine })
    }

    fn server_session(transport: T, config: Arc<Config>, session: u64) -> Result<Self, Error> {
        let cookies = cookie_generator(&config);
        let mut engine = Engine::new(transport, None, config, Role::Server, session);
        Server::new(&mut engine, &cookies).run()?;
        Ok(Connection { engine })
    }

    /// Discard the keys and run a fresh handshake over the same transport.
    ///
    /// This is how an association continues after
    /// [`Error::SequenceExhausted`]. Both ends call it: a client handshakes
    /// again with its peer, a server waits for the next client that
    /// completes the cookie exchange. The old keys are wiped before the new
    /// handshake starts.
    pub fn rehandshake(self) -> Result<Self, Error> {
        let role = self.role();
        let peer = self.peer_addr();
        let config = self.engine.shared_config();
        let session = self.engine.session() + 1;
        let transport = self.into_transport();

        info!("Rehandshake as {} (association {})", role, session);
        match (role, peer) {
            (Role::Client, Some(peer)) => Self::client_session(transport, peer, config, session),
            _ => Self::server_session(transport, config, session),
        }
    }

    /// True while the association can carry application data.
    ///
    /// A connection only exists once its handshake completed, so this turns
    /// false only when the write sequence of the current epoch is used up.
    pub fn is_ready(&self) -> bool {
        let epoch = self.engine.record.write_epoch();
        self.engine.record.next_sequence(epoch) <= MAX_SEQUENCE_NUMBER
    }

    /// Send `data` as application data.
    ///
    /// Data longer than the max fragment length goes out as consecutive
    /// records. Returns at the first record that fails.
    pub fn send(&mut self, data: &[u8]) -> Result<(), Error> {
        let count = self
            .engine
            .record
            .send_stream(ContentType::ApplicationData, data)?;
        trace!("Sent {} bytes in {} records", data.len(), count);
        Ok(())
    }

    /// Receive the next application data record.
    ///
    /// Waits at most the configured read timeout. Handshake retransmissions
    /// from the peer are answered here and never returned.
    pub fn recv(&mut self) -> Result<Vec<u8>, Error> {
        if let Some(data) = self.engine.take_early_data() {
            return Ok(data.to_vec());
        }

        let deadline = self
            .engine
            .config()
            .read_timeout()
            .map(|t| Instant::now() + t);

        loop {
            let record = match self.engine.record.recv_record(deadline) {
                Ok(Some(record)) => record,
                Ok(None) => return Err(Error::Timeout("read")),
                Err(e) if e.is_record_local() => {
                    debug!("Dropping record: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            match record.content_type {
                ContentType::ApplicationData if record.sequence.epoch > 0 => {
                    return Ok(record.fragment.into_vec());
                }
                ContentType::Handshake => {
                    let result = self.engine.handle_late_handshake(&record.fragment);
                    self.engine.record.recycle(record.fragment);
                    result?;
                }
                content_type => {
                    debug!("Ignoring {:?} record {}", content_type, record.sequence);
                    self.engine.record.recycle(record.fragment);
                }
            }
        }
    }

    /// End the association.
    ///
    /// Keys are wiped and the transport is closed.
    pub fn close(self) {
        debug!("Closing {} connection", self.role());
        drop(self.into_transport());
    }

    /// End the association but keep the transport.
    pub fn into_transport(self) -> T {
        self.engine.into_transport()
    }

    pub fn role(&self) -> Role {
        self.engine.role()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.engine.record.peer()
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        self.engine.record.local_addr()
    }

    /// The negotiated cipher suite.
    pub fn cipher_suite(&self) -> CipherSuite {
        self.engine.params.cipher_suite
    }

    pub fn write_epoch(&self) -> u16 {
        self.engine.record.write_epoch()
    }
}

impl<T> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("engine", &self.engine)
            .finish()
    }
}

fn cookie_generator(config: &Config) -> CookieGenerator {
    match config.cookie_secret() {
        Some(secret) => CookieGenerator::new(secret),
        None => {
            CookieGenerator::random(&mut SeededRng::for_stream(config.rng_seed(), Stream::Cookie))
        }
    }
}

/// Serve one peer at a time over `transport`.
///
/// Every application record of the current peer goes to `on_accept`. When
/// it returns [`ControlFlow::Break`] the session is dropped and the next
/// peer is accepted. Handshake and session failures are logged and end
/// only that peer; transport failures are returned.
pub fn serve<T, F>(mut transport: T, config: Arc<Config>, mut on_accept: F) -> Result<Infallible, Error>
where
    T: Transport,
    F: FnMut(&mut Connection<T>, &[u8]) -> ControlFlow<()>,
{
    let cookies = cookie_generator(&config);
    info!("Serving on {}", transport.local_addr()?);

    let mut session = 0;
    loop {
        let mut engine = Engine::new(transport, None, config.clone(), Role::Server, session);
        let result = Server::new(&mut engine, &cookies).run();
        let mut conn = Connection { engine };

        match result {
            Ok(peer) => {
                if let Err(e) = run_session(&mut conn, peer, &mut on_accept) {
                    return Err(e);
                }
            }
            Err(e) if e.kind() == ErrorKind::Transport => return Err(e),
            Err(e) => warn!("Handshake failed: {}", e),
        }

        transport = conn.into_transport();
        session += 1;
    }
}

// Ok when the session ended and the next peer may be served.
fn run_session<T, F>(conn: &mut Connection<T>, peer: SocketAddr, on_accept: &mut F) -> Result<(), Error>
where
    T: Transport,
    F: FnMut(&mut Connection<T>, &[u8]) -> ControlFlow<()>,
{
    loop {
        match conn.recv() {
            Ok(data) => {
                if on_accept(conn, &data).is_break() {
                    info!("Session with {} done", peer);
                    return Ok(());
                }
            }
            Err(e) if e.kind() == ErrorKind::Transport => return Err(e),
            Err(e) => {
                warn!("Session with {} ended: {}", peer, e);
                return Ok(());
            }
        }
    }
}

/// Bind UDP `port` on all IPv4 interfaces and [`serve`] on it.
pub fn listen<F>(port: u16, config: Arc<Config>, on_accept: F) -> Result<Infallible, Error>
where
    F: FnMut(&mut Connection<UdpTransport>, &[u8]) -> ControlFlow<()>,
{
    let transport = UdpTransport::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))?;
    serve(transport, config, on_accept)
}

/// Connect to `address`:`port` from an ephemeral UDP port of the same
/// address family.
pub fn connect(
    address: IpAddr,
    port: u16,
    config: Arc<Config>,
) -> Result<Connection<UdpTransport>, Error> {
    let peer = SocketAddr::new(address, port);
    let transport = UdpTransport::bind_for(peer)?;
    Connection::connect_with(transport, peer, config)
}
