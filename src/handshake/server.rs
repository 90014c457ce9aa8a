// DTLS 1.2 PSK Server Handshake Flow (RFC 6347, RFC 4279):
//
// 1. Client sends ClientHello. Without a valid cookie the server answers
//    HelloVerifyRequest from a stateless path (flight 2) and forgets it.
// 2. Client repeats ClientHello with the cookie. The server binds to the
//    client address from here on.
// 3. Server sends ServerHello, ServerKeyExchange (PSK hint),
//    ServerHelloDone (flight 4)
// 4. Client sends ClientKeyExchange, ChangeCipherSpec, Finished (flight 5)
// 5. Server sends ChangeCipherSpec, Finished (flight 6)

use std::net::SocketAddr;
use std::time::SystemTime;

use subtle::ConstantTimeEq;

use crate::buffer::Buf;
use crate::handshake::{Engine, Incoming};
use crate::message::{Body, ClientHello, Finished, HelloVerifyRequest, ServerHello};
use crate::message::{ServerKeyExchange, SessionId};
use crate::negotiate::{self, CookieGenerator};
use crate::transport::Transport;
use crate::types::{ProtocolVersion, Random, Role};
use crate::Error;

/// DTLS 1.2 PSK server handshake.
pub(crate) struct Server<'a, T> {
    state: State,

    /// Engine in common between server and client.
    engine: &'a mut Engine<T>,

    /// Issues and checks the cookies of the stateless phase.
    cookies: &'a CookieGenerator,

    /// The ClientHello being looked at, with its wire bytes, message_seq
    /// and sender.
    client_hello: Option<(ClientHello, Buf, u16, SocketAddr)>,
}

impl<'a, T: Transport> Server<'a, T> {
    pub fn new(engine: &'a mut Engine<T>, cookies: &'a CookieGenerator) -> Self {
        Server {
            state: State::Init,
            engine,
            cookies,
            client_hello: None,
        }
    }

    /// Drive the handshake until it is done or fails. Returns the address
    /// of the client.
    pub fn run(mut self) -> Result<SocketAddr, Error> {
        while self.state != State::Done {
            let prev_state = self.state;
            let new_state = prev_state.make_progress(&mut self)?;
            if prev_state != new_state {
                trace!("{:?} -> {:?}", prev_state, new_state);
            }
            self.state = new_state;
        }

        self.engine.flight_stop_resend_timers();
        let peer = self.engine.record.peer().ok_or(Error::NoPeer)?;
        info!(
            "Server handshake done with {} using {:?}",
            peer, self.engine.params.cipher_suite
        );
        Ok(peer)
    }

    /// Wait for a ClientHello from anyone. Everything else is ignored.
    fn wait_client_hello(&mut self) -> Result<(), Error> {
        loop {
            match self.engine.recv_incoming()? {
                Incoming::Handshake {
                    message,
                    raw,
                    from,
                    ..
                } => {
                    let seq = message.header.message_seq;
                    if let Body::ClientHello(client_hello) = message.body {
                        self.client_hello = Some((client_hello, raw, seq, from));
                        return Ok(());
                    }
                    debug!(
                        "Ignoring {:?} from {} before ClientHello",
                        message.header.msg_type, from
                    );
                }
                Incoming::ChangeCipherSpec => {
                    debug!("Ignoring ChangeCipherSpec before ClientHello");
                }
            }
        }
    }

    /// Next handshake message from the bound client, or the
    /// ChangeCipherSpec when `want_ccs`.
    fn recv_expected(&mut self, want_ccs: bool) -> Result<Incoming, Error> {
        loop {
            let incoming = self.engine.recv_incoming()?;
            if matches!(incoming, Incoming::ChangeCipherSpec) && !want_ccs {
                debug!("Ignoring unexpected ChangeCipherSpec");
                continue;
            }
            return Ok(incoming);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    ClientHelloUnverified,
    HelloVerifySent,
    ClientHelloVerified,
    ServerHelloSent,
    ServerKeyExchangeSent,
    ServerHelloDoneSent,
    ClientKeyExchangeReceived,
    ChangeCipherReceived,
    FinishedReceived,
    Done,
}

impl State {
    fn make_progress<T: Transport>(self, server: &mut Server<'_, T>) -> Result<Self, Error> {
        match self {
            State::Init => self.init(server),
            State::ClientHelloUnverified => self.client_hello_unverified(server),
            State::HelloVerifySent => self.hello_verify_sent(server),
            State::ClientHelloVerified => self.client_hello_verified(server),
            State::ServerHelloSent => self.server_hello_sent(server),
            State::ServerKeyExchangeSent => self.server_key_exchange_sent(server),
            State::ServerHelloDoneSent => self.server_hello_done_sent(server),
            State::ClientKeyExchangeReceived => self.client_key_exchange_received(server),
            State::ChangeCipherReceived => self.change_cipher_received(server),
            State::FinishedReceived => self.finished_received(server),
            State::Done => Ok(self),
        }
    }

    fn init<T: Transport>(self, server: &mut Server<'_, T>) -> Result<Self, Error> {
        server.wait_client_hello()?;
        Ok(State::ClientHelloUnverified)
    }

    fn client_hello_unverified<T: Transport>(
        self,
        server: &mut Server<'_, T>,
    ) -> Result<Self, Error> {
        let Some((client_hello, _, seq, from)) = &server.client_hello else {
            return Err(Error::HandshakeFailure("No ClientHello".to_string()));
        };
        let (seq, from) = (*seq, *from);

        negotiate::check_version(client_hello.client_version)?;

        if !client_hello.cookie.is_empty() && server.cookies.verify(from, &client_hello.cookie) {
            debug!("Valid cookie from {}", from);
            server.engine.bind_peer(from, seq);
            return Ok(State::ClientHelloVerified);
        }

        if client_hello.cookie.is_empty() {
            debug!("ClientHello without cookie from {}", from);
        } else {
            debug!("Invalid cookie from {}", from);
        }

        let cookie = server.cookies.generate(from)?;
        let hello_verify = HelloVerifyRequest::new(ProtocolVersion::DTLS1_2, cookie);
        server
            .engine
            .send_stateless(from, seq, Body::HelloVerifyRequest(hello_verify))?;
        server.client_hello = None;

        Ok(State::HelloVerifySent)
    }

    fn hello_verify_sent<T: Transport>(self, server: &mut Server<'_, T>) -> Result<Self, Error> {
        server.wait_client_hello()?;
        Ok(State::ClientHelloUnverified)
    }

    fn client_hello_verified<T: Transport>(
        self,
        server: &mut Server<'_, T>,
    ) -> Result<Self, Error> {
        let Some((client_hello, raw, _, _)) = server.client_hello.take() else {
            return Err(Error::HandshakeFailure("No ClientHello".to_string()));
        };

        let suite = negotiate::select_cipher_suite(
            &client_hello.cipher_suites,
            server.engine.config().cipher_suites(),
        )?;
        let compression = negotiate::select_compression(&client_hello.compression_methods)?;
        debug!("Selected cipher suite {:?}", suite);

        let random = Random::new(SystemTime::now(), &mut server.engine.rng);

        let params = &mut server.engine.params;
        params.cipher_suite = suite;
        params.compression_method = compression;
        params.client_random = client_hello.random;
        params.server_random = random;

        server.engine.transcript_push(&raw);

        server.engine.flight_begin(4);
        let server_hello = ServerHello::new(
            ProtocolVersion::DTLS1_2,
            random,
            SessionId::empty(),
            suite,
            compression,
        );
        server
            .engine
            .send_handshake(Body::ServerHello(server_hello), true)?;

        Ok(State::ServerHelloSent)
    }

    fn server_hello_sent<T: Transport>(self, server: &mut Server<'_, T>) -> Result<Self, Error> {
        let hint = server.engine.config().psk_identity_hint().to_vec();
        let ske = ServerKeyExchange::new(&hint);
        server
            .engine
            .send_handshake(Body::ServerKeyExchange(ske), true)?;
        Ok(State::ServerKeyExchangeSent)
    }

    fn server_key_exchange_sent<T: Transport>(
        self,
        server: &mut Server<'_, T>,
    ) -> Result<Self, Error> {
        server.engine.send_handshake(Body::ServerHelloDone, true)?;
        Ok(State::ServerHelloDoneSent)
    }

    fn server_hello_done_sent<T: Transport>(
        self,
        server: &mut Server<'_, T>,
    ) -> Result<Self, Error> {
        let Incoming::Handshake { message, raw, .. } = server.recv_expected(false)? else {
            return Err(Error::UnexpectedMessage("ChangeCipherSpec".to_string()));
        };

        let Body::ClientKeyExchange(cke) = message.body else {
            return Err(Error::UnexpectedMessage(format!(
                "{:?} in ServerHelloDoneSent",
                message.header.msg_type
            )));
        };

        let known = server.engine.config().psk_identity();
        if !bool::from(known.ct_eq(&cke.psk_identity[..])) {
            warn!(
                "Unknown PSK identity: {:?}",
                String::from_utf8_lossy(&cke.psk_identity)
            );
            return Err(Error::UnknownPskIdentity);
        }

        server.engine.transcript_push(&raw);
        server.engine.derive_keys()?;

        Ok(State::ClientKeyExchangeReceived)
    }

    fn client_key_exchange_received<T: Transport>(
        self,
        server: &mut Server<'_, T>,
    ) -> Result<Self, Error> {
        match server.recv_expected(true)? {
            Incoming::ChangeCipherSpec => {
                server.engine.activate_read()?;
                debug!("Received ChangeCipherSpec");
                Ok(State::ChangeCipherReceived)
            }
            Incoming::Handshake { message, .. } => Err(Error::UnexpectedMessage(format!(
                "{:?} in ClientKeyExchangeReceived",
                message.header.msg_type
            ))),
        }
    }

    fn change_cipher_received<T: Transport>(
        self,
        server: &mut Server<'_, T>,
    ) -> Result<Self, Error> {
        let Incoming::Handshake {
            message,
            raw,
            epoch,
            ..
        } = server.recv_expected(false)?
        else {
            return Err(Error::UnexpectedMessage("ChangeCipherSpec".to_string()));
        };

        let Body::Finished(finished) = message.body else {
            return Err(Error::UnexpectedMessage(format!(
                "{:?} in ChangeCipherReceived",
                message.header.msg_type
            )));
        };

        if epoch == 0 {
            return Err(Error::UnexpectedMessage(
                "Unprotected Finished".to_string(),
            ));
        }

        let expected = server
            .engine
            .params
            .verify_data(Role::Client, server.engine.transcript())?;
        if !bool::from(expected[..].ct_eq(&finished.verify_data[..])) {
            return Err(Error::HandshakeFailure(
                "Client Finished verify_data mismatch".to_string(),
            ));
        }

        server.engine.transcript_push(&raw);
        Ok(State::FinishedReceived)
    }

    fn finished_received<T: Transport>(self, server: &mut Server<'_, T>) -> Result<Self, Error> {
        server.engine.flight_begin(6);
        server.engine.send_change_cipher_spec()?;
        server.engine.activate_write()?;

        let verify_data = server
            .engine
            .params
            .verify_data(Role::Server, server.engine.transcript())?;
        server
            .engine
            .send_handshake(Body::Finished(Finished::new(verify_data)), true)?;

        Ok(State::Done)
    }
}
