// DTLS 1.2 PSK Client Handshake Flow (RFC 6347, RFC 4279):
//
// 1. Client sends ClientHello without cookie (flight 1)
// 2. Server answers HelloVerifyRequest with a cookie (flight 2)
// 3. Client repeats ClientHello with the cookie (flight 3)
// 4. Server sends ServerHello, ServerKeyExchange (optional, PSK hint),
//    ServerHelloDone (flight 4)
// 5. Client sends ClientKeyExchange (PSK identity), ChangeCipherSpec,
//    Finished (flight 5)
// 6. Server sends ChangeCipherSpec, Finished (flight 6)
//
// A server that skips the cookie exchange answers the first ClientHello
// with flight 4 directly.

use std::time::SystemTime;

use subtle::ConstantTimeEq;

use crate::buffer::Buf;
use crate::handshake::{Engine, Incoming};
use crate::message::{Body, ClientHello, ClientKeyExchange, Cookie, Finished, Handshake};
use crate::message::{SessionId, ServerHello};
use crate::negotiate;
use crate::transport::Transport;
use crate::types::{CipherSuiteVec, ProtocolVersion, Random, Role};
use crate::Error;

/// DTLS 1.2 PSK client handshake.
pub(crate) struct Client<'a, T> {
    state: State,

    /// Engine in common between server and client.
    engine: &'a mut Engine<T>,

    /// Random unique data. Used for both ClientHellos.
    random: Random,

    /// Cookie from the HelloVerifyRequest, empty until one arrives.
    cookie: Cookie,

    /// Suites offered in the ClientHello.
    offered: CipherSuiteVec,

    /// Wire bytes of the last ClientHello. Enters the transcript once the
    /// server accepts it with a ServerHello.
    client_hello: Buf,

    /// Whether a ServerKeyExchange was seen in this flight.
    server_key_exchange: bool,
}

impl<'a, T: Transport> Client<'a, T> {
    pub fn new(engine: &'a mut Engine<T>) -> Self {
        let random = Random::new(SystemTime::now(), &mut engine.rng);
        let offered = negotiate::offered_cipher_suites(engine.config().cipher_suites());

        Client {
            state: State::Init,
            engine,
            random,
            cookie: Cookie::empty(),
            offered,
            client_hello: Buf::new(),
            server_key_exchange: false,
        }
    }

    /// Drive the handshake until it is done or fails.
    pub fn run(mut self) -> Result<(), Error> {
        self.engine.start_handshake_timer();

        while self.state != State::Done {
            let prev_state = self.state;
            let new_state = prev_state.make_progress(&mut self)?;
            if prev_state != new_state {
                trace!("{:?} -> {:?}", prev_state, new_state);
            }
            self.state = new_state;
        }

        self.engine.flight_stop_resend_timers();
        info!(
            "Client handshake done with {:?}",
            self.engine.params.cipher_suite
        );
        Ok(())
    }

    fn send_client_hello(&mut self) -> Result<(), Error> {
        let client_hello = ClientHello::new(
            ProtocolVersion::DTLS1_2,
            self.random,
            SessionId::empty(),
            self.cookie,
            self.offered.clone(),
            negotiate::offered_compression_methods(),
        );
        self.client_hello = self
            .engine
            .send_handshake(Body::ClientHello(client_hello), false)?;
        Ok(())
    }

    fn handle_server_hello(&mut self, server_hello: &ServerHello, raw: &[u8]) -> Result<(), Error> {
        negotiate::check_version(server_hello.server_version)?;
        negotiate::check_selected_cipher_suite(server_hello.cipher_suite, &self.offered)?;
        negotiate::check_compression(server_hello.compression_method)?;

        debug!(
            "Received ServerHello with cipher suite: {:?}",
            server_hello.cipher_suite
        );

        let params = &mut self.engine.params;
        params.cipher_suite = server_hello.cipher_suite;
        params.compression_method = server_hello.compression_method;
        params.client_random = self.random;
        params.server_random = server_hello.random;

        // The transcript starts at the ClientHello the server accepted.
        let client_hello = std::mem::take(&mut self.client_hello);
        self.engine.transcript_push(&client_hello);
        self.engine.transcript_push(raw);
        Ok(())
    }

    /// Next handshake message, skipping ChangeCipherSpecs that are not
    /// expected yet.
    fn recv_handshake(&mut self) -> Result<(Handshake, Buf, u16), Error> {
        loop {
            match self.engine.recv_incoming()? {
                Incoming::Handshake {
                    message,
                    raw,
                    epoch,
                    ..
                } => return Ok((message, raw, epoch)),
                Incoming::ChangeCipherSpec => {
                    debug!("Ignoring early ChangeCipherSpec");
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    ClientHelloSent,
    HelloVerifyReceived,
    ClientHelloRetried,
    ServerHelloReceived,
    ClientKeyExchangeSent,
    ChangeCipherSent,
    FinishedSent,
    Done,
}

impl State {
    fn make_progress<T: Transport>(self, client: &mut Client<'_, T>) -> Result<Self, Error> {
        match self {
            State::Init => self.init(client),
            State::ClientHelloSent => self.client_hello_sent(client),
            State::HelloVerifyReceived => self.hello_verify_received(client),
            State::ClientHelloRetried => self.client_hello_retried(client),
            State::ServerHelloReceived => self.server_hello_received(client),
            State::ClientKeyExchangeSent => self.client_key_exchange_sent(client),
            State::ChangeCipherSent => self.change_cipher_sent(client),
            State::FinishedSent => self.finished_sent(client),
            State::Done => Ok(self),
        }
    }

    fn init<T: Transport>(self, client: &mut Client<'_, T>) -> Result<Self, Error> {
        client.engine.flight_begin(1);
        client.send_client_hello()?;
        Ok(State::ClientHelloSent)
    }

    fn client_hello_sent<T: Transport>(self, client: &mut Client<'_, T>) -> Result<Self, Error> {
        let (handshake, raw, _) = client.recv_handshake()?;

        match handshake.body {
            Body::HelloVerifyRequest(hello_verify) => {
                negotiate::check_version(hello_verify.server_version)?;
                debug!("Received HelloVerifyRequest");
                client.cookie = hello_verify.cookie;
                Ok(State::HelloVerifyReceived)
            }
            Body::ServerHello(server_hello) => {
                client.handle_server_hello(&server_hello, &raw)?;
                Ok(State::ServerHelloReceived)
            }
            body => Err(Error::UnexpectedMessage(format!(
                "{:?} in ClientHelloSent",
                body.message_type()
            ))),
        }
    }

    fn hello_verify_received<T: Transport>(
        self,
        client: &mut Client<'_, T>,
    ) -> Result<Self, Error> {
        client.engine.flight_begin(3);
        client.send_client_hello()?;
        Ok(State::ClientHelloRetried)
    }

    fn client_hello_retried<T: Transport>(
        self,
        client: &mut Client<'_, T>,
    ) -> Result<Self, Error> {
        let (handshake, raw, _) = client.recv_handshake()?;

        match handshake.body {
            // A fresh HelloVerifyRequest in answer to our cookie.
            Body::HelloVerifyRequest(_) => Err(Error::CookieRejected),
            Body::ServerHello(server_hello) => {
                client.handle_server_hello(&server_hello, &raw)?;
                Ok(State::ServerHelloReceived)
            }
            body => Err(Error::UnexpectedMessage(format!(
                "{:?} in ClientHelloRetried",
                body.message_type()
            ))),
        }
    }

    fn server_hello_received<T: Transport>(
        self,
        client: &mut Client<'_, T>,
    ) -> Result<Self, Error> {
        let (handshake, raw, _) = client.recv_handshake()?;

        match handshake.body {
            Body::ServerKeyExchange(ske) if !client.server_key_exchange => {
                debug!(
                    "PSK identity hint: {:?}",
                    String::from_utf8_lossy(&ske.psk_identity_hint)
                );
                client.server_key_exchange = true;
                client.engine.transcript_push(&raw);
                Ok(self)
            }
            Body::ServerHelloDone => {
                client.engine.transcript_push(&raw);
                client.engine.derive_keys()?;

                client.engine.flight_begin(5);
                let identity = client.engine.config().psk_identity().to_vec();
                let cke = ClientKeyExchange::new(&identity);
                client
                    .engine
                    .send_handshake(Body::ClientKeyExchange(cke), true)?;
                Ok(State::ClientKeyExchangeSent)
            }
            body => Err(Error::UnexpectedMessage(format!(
                "{:?} in ServerHelloReceived",
                body.message_type()
            ))),
        }
    }

    fn client_key_exchange_sent<T: Transport>(
        self,
        client: &mut Client<'_, T>,
    ) -> Result<Self, Error> {
        client.engine.send_change_cipher_spec()?;
        client.engine.activate_write()?;
        Ok(State::ChangeCipherSent)
    }

    fn change_cipher_sent<T: Transport>(self, client: &mut Client<'_, T>) -> Result<Self, Error> {
        let verify_data = client
            .engine
            .params
            .verify_data(Role::Client, client.engine.transcript())?;
        client
            .engine
            .send_handshake(Body::Finished(Finished::new(verify_data)), true)?;
        Ok(State::FinishedSent)
    }

    fn finished_sent<T: Transport>(self, client: &mut Client<'_, T>) -> Result<Self, Error> {
        match client.engine.recv_incoming()? {
            Incoming::ChangeCipherSpec => {
                if client.engine.activate_read()? {
                    debug!("Received ChangeCipherSpec");
                }
                Ok(self)
            }
            Incoming::Handshake {
                message, epoch, ..
            } => {
                let Body::Finished(finished) = message.body else {
                    return Err(Error::UnexpectedMessage(format!(
                        "{:?} in FinishedSent",
                        message.header.msg_type
                    )));
                };

                if epoch == 0 || client.engine.pending_read.is_some() {
                    return Err(Error::UnexpectedMessage(
                        "Finished before ChangeCipherSpec".to_string(),
                    ));
                }

                let expected = client
                    .engine
                    .params
                    .verify_data(Role::Server, client.engine.transcript())?;
                if !bool::from(expected[..].ct_eq(&finished.verify_data[..])) {
                    return Err(Error::HandshakeFailure(
                        "Server Finished verify_data mismatch".to_string(),
                    ));
                }

                Ok(State::Done)
            }
        }
    }
}
