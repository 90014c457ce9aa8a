//! Handshake engine in common between the client and server state machines.
//!
//! The engine owns the record layer during the handshake. It sends and saves
//! flights, resends them when the flight timer fires or the peer repeats the
//! end of its previous flight, enforces handshake message_seq order, and
//! keeps the transcript the Finished messages are computed over.

use std::collections::VecDeque;
use std::mem;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use zeroize::Zeroizing;

use crate::buffer::Buf;
use crate::config::Config;
use crate::crypto::{CipherSuiteAdapter, SecurityParameters};
use crate::message::{Body, Handshake};
use crate::record::{Record, RecordLayer};
use crate::rng::{SeededRng, Stream};
use crate::timer::{earliest, ExponentialBackoff, Timeout};
use crate::transport::Transport;
use crate::types::{ContentType, Role};
use crate::Error;

mod client;
mod server;

pub(crate) use client::Client;
pub(crate) use server::Server;

pub(crate) struct Engine<T> {
    config: Arc<Config>,

    /// Seedable random generator for hello randoms and jitter.
    pub(crate) rng: SeededRng,
    /// Index of this association among those run on the transport.
    session: u64,

    pub(crate) record: RecordLayer<T>,

    /// Pending session, becomes active at ChangeCipherSpec.
    pub(crate) params: SecurityParameters,

    /// Write side protection, activated when we send ChangeCipherSpec.
    pub(crate) pending_write: Option<CipherSuiteAdapter>,

    /// Read side protection, activated when the peer's ChangeCipherSpec arrives.
    pub(crate) pending_read: Option<CipherSuiteAdapter>,

    /// Expected message_seq of the next handshake message from the peer.
    peer_handshake_seq_no: u16,

    /// message_seq of the next handshake message we send.
    next_handshake_seq_no: u16,

    /// Handshake messages, header included, that Finished covers.
    transcript: Buf,

    /// The records of the last flight, kept for resends.
    flight_saved_records: Vec<Entry>,

    /// Backoff of the flight timer.
    flight_backoff: ExponentialBackoff,

    flight_timeout: Timeout,

    handshake_timeout: Timeout,

    /// Before the cookie exchange a server keeps no peer state and
    /// accepts any message_seq.
    stateless: bool,

    /// Messages decoded from a record but not yet handed out.
    queue: VecDeque<Incoming>,

    /// Application data that arrived in the new epoch before our handshake
    /// was done.
    early_data: VecDeque<Zeroizing<Buf>>,
}

/// A saved flight record.
struct Entry {
    content_type: ContentType,
    epoch: u16,
    fragment: Buf,
}

/// Next thing the peer sent that a state machine must look at.
#[derive(Debug)]
pub(crate) enum Incoming {
    Handshake {
        message: Handshake,
        /// Wire bytes of the message, header included.
        raw: Buf,
        epoch: u16,
        from: SocketAddr,
    },
    ChangeCipherSpec,
}

impl<T: Transport> Engine<T> {
    pub fn new(
        transport: T,
        peer: Option<SocketAddr>,
        config: Arc<Config>,
        role: Role,
        session: u64,
    ) -> Self {
        let mut rng = SeededRng::for_stream(config.rng_seed(), Stream::Session(session));
        let flight_backoff = ExponentialBackoff::new(
            config.flight_start_rto(),
            config.flight_retries(),
            &mut rng,
        );
        let record = RecordLayer::new(transport, peer, config.max_fragment_len());

        Engine {
            config,
            session,
            rng,
            record,
            params: SecurityParameters::new(role),
            pending_write: None,
            pending_read: None,
            peer_handshake_seq_no: 0,
            next_handshake_seq_no: 0,
            transcript: Buf::new(),
            flight_saved_records: Vec::new(),
            flight_backoff,
            flight_timeout: Timeout::Disabled,
            handshake_timeout: Timeout::Disabled,
            stateless: role == Role::Server,
            queue: VecDeque::new(),
            early_data: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shared_config(&self) -> Arc<Config> {
        self.config.clone()
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn role(&self) -> Role {
        self.params.role
    }

    pub fn into_transport(self) -> T {
        self.record.into_transport()
    }

    /// Start the overall handshake deadline.
    pub fn start_handshake_timer(&mut self) {
        self.handshake_timeout.start();
    }

    /// The server has verified a cookie: bind to the peer and track
    /// message_seq from the given ClientHello on.
    pub fn bind_peer(&mut self, peer: SocketAddr, client_hello_seq: u16) {
        info!("Binding to peer {}", peer);
        self.record.set_peer(Some(peer));
        self.stateless = false;
        self.peer_handshake_seq_no = client_hello_seq.wrapping_add(1);
        // The server's first message_seq mirrors the ClientHello it answers.
        self.next_handshake_seq_no = client_hello_seq;
        self.start_handshake_timer();
    }

    pub fn transcript(&self) -> &[u8] {
        &self.transcript
    }

    pub fn transcript_push(&mut self, raw: &[u8]) {
        self.transcript.extend_from_slice(raw);
    }

    pub fn flight_begin(&mut self, flight_no: u8) {
        debug!("Begin flight {}", flight_no);
        self.flight_backoff.reset(&mut self.rng);
        self.flight_saved_records.clear();
        self.flight_timeout = Timeout::Unarmed;
    }

    /// The handshake is complete. Timers stop, but the last flight is
    /// kept so a peer that missed it can trigger a resend.
    pub fn flight_stop_resend_timers(&mut self) {
        debug!("Stop handshake and flight timeouts");
        self.flight_timeout = Timeout::Disabled;
        self.handshake_timeout = Timeout::Disabled;
    }

    fn flight_resend(&mut self, reason: &str) -> Result<(), Error> {
        if self.flight_saved_records.is_empty() {
            return Ok(());
        }
        debug!("Resending flight due to {}", reason);
        let records = mem::take(&mut self.flight_saved_records);

        let mut result = Ok(());
        for entry in &records {
            if let Err(e) = self
                .record
                .send_record(entry.content_type, entry.epoch, &entry.fragment)
            {
                result = Err(e);
                break;
            }
        }

        self.flight_saved_records = records;
        result
    }

    /// Send a handshake message as part of the current flight.
    ///
    /// Returns the wire bytes of the message.
    pub fn send_handshake(&mut self, body: Body, in_transcript: bool) -> Result<Buf, Error> {
        let handshake = Handshake::new(self.next_handshake_seq_no, body);
        self.next_handshake_seq_no = self.next_handshake_seq_no.wrapping_add(1);

        let mut raw = Buf::new();
        handshake.serialize(&mut raw);
        if in_transcript {
            self.transcript.extend_from_slice(&raw);
        }

        debug!(
            "Send {:?} (message_seq {})",
            handshake.header.msg_type, handshake.header.message_seq
        );

        self.save_and_send(ContentType::Handshake, raw.clone())?;
        Ok(raw)
    }

    /// Send a message outside any flight to `addr`, without touching
    /// handshake state. Used for HelloVerifyRequest.
    pub fn send_stateless(
        &mut self,
        addr: SocketAddr,
        message_seq: u16,
        body: Body,
    ) -> Result<(), Error> {
        let handshake = Handshake::new(message_seq, body);
        let mut raw = Buf::new();
        handshake.serialize(&mut raw);
        debug!("Send {:?} to {}", handshake.header.msg_type, addr);
        self.record
            .send_record_to(addr, ContentType::Handshake, 0, &raw)?;
        Ok(())
    }

    pub fn send_change_cipher_spec(&mut self) -> Result<(), Error> {
        debug!("Send ChangeCipherSpec");
        self.save_and_send(ContentType::ChangeCipherSpec, Buf::from_slice(&[1]))
    }

    fn save_and_send(&mut self, content_type: ContentType, fragment: Buf) -> Result<(), Error> {
        let epoch = self.record.write_epoch();
        self.record.send_record(content_type, epoch, &fragment)?;
        self.flight_saved_records.push(Entry {
            content_type,
            epoch,
            fragment,
        });
        Ok(())
    }

    /// Activate the pending write protection. Called right after our
    /// ChangeCipherSpec is sent.
    pub fn activate_write(&mut self) -> Result<(), Error> {
        let cipher = self
            .pending_write
            .take()
            .ok_or_else(|| Error::HandshakeFailure("No pending write keys".to_string()))?;
        self.record.change_write_epoch(cipher)
    }

    /// Activate the pending read protection. Returns `false` when it is
    /// already active, which means the ChangeCipherSpec was a duplicate.
    pub fn activate_read(&mut self) -> Result<bool, Error> {
        let Some(cipher) = self.pending_read.take() else {
            return Ok(false);
        };
        self.record.change_read_epoch(cipher)?;
        Ok(true)
    }

    /// Derive the master secret and both directions' record protection.
    /// Randoms and cipher suite must be set.
    pub fn derive_keys(&mut self) -> Result<(), Error> {
        self.params.derive_master_secret(self.config.psk())?;
        let key_block = self.params.key_block()?;
        let (write, read) =
            CipherSuiteAdapter::for_role(self.params.cipher_suite, &key_block, self.role())?;
        self.pending_write = Some(write);
        self.pending_read = Some(read);
        debug!("Derived keys for {:?}", self.params.cipher_suite);
        Ok(())
    }

    /// Take application data that arrived before the handshake finished.
    pub fn take_early_data(&mut self) -> Option<Zeroizing<Buf>> {
        self.early_data.pop_front()
    }

    /// Block until the peer sends something the state machine must handle.
    ///
    /// Flight and handshake timers are driven from here. Records that fail
    /// decoding, authentication or replay checks are dropped and the wait
    /// continues; other errors end the handshake.
    pub fn recv_incoming(&mut self) -> Result<Incoming, Error> {
        loop {
            if let Some(incoming) = self.queue.pop_front() {
                return Ok(incoming);
            }

            self.handle_timeout(Instant::now())?;

            let deadline = self.next_deadline();
            match self.record.recv_record(deadline) {
                Ok(Some(record)) => self.handle_record(record)?,
                // Timers are checked at the top of the loop.
                Ok(None) => {}
                Err(e) if e.is_record_local() => {
                    debug!("Dropping record: {}", e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn handle_timeout(&mut self, now: Instant) -> Result<(), Error> {
        let handshake_timeout = self.config.handshake_timeout();
        if self.handshake_timeout.arm(now, handshake_timeout) {
            debug!(
                "Handshake timeout in: {:.03}s",
                handshake_timeout.as_secs_f32()
            );
        }
        if self.flight_timeout.arm(now, self.flight_backoff.rto()) {
            debug!(
                "Flight timeout in: {:.03}s",
                self.flight_backoff.rto().as_secs_f32()
            );
        }

        if self.handshake_timeout.expired(now) {
            return Err(Error::Timeout("handshake"));
        }

        if !self.flight_timeout.expired(now) {
            return Ok(());
        }

        if !self.flight_backoff.can_retry() {
            return Err(Error::Timeout("flight"));
        }

        self.flight_backoff.attempt(&mut self.rng);
        debug!(
            "Re-arm flight timeout due to resend in {:.03}s",
            self.flight_backoff.rto().as_secs_f32()
        );
        self.flight_timeout = Timeout::Armed(now + self.flight_backoff.rto());
        self.flight_resend("flight timeout")
    }

    fn next_deadline(&self) -> Option<Instant> {
        earliest(self.handshake_timeout.deadline(), self.flight_timeout.deadline())
    }

    fn handle_record(&mut self, record: Record) -> Result<(), Error> {
        let Record {
            content_type,
            sequence,
            fragment,
            from,
        } = record;

        match content_type {
            ContentType::Handshake => {
                let result = self.handle_handshake_record(&fragment, sequence.epoch, from);
                self.record.recycle(fragment);
                result?;
            }
            ContentType::ChangeCipherSpec => {
                if &fragment[..] == [1] && sequence.epoch == 0 {
                    self.queue.push_back(Incoming::ChangeCipherSpec);
                } else {
                    debug!("Dropping malformed ChangeCipherSpec {}", sequence);
                }
                self.record.recycle(fragment);
            }
            ContentType::ApplicationData if sequence.epoch > 0 => {
                debug!("Holding application data received during handshake");
                self.early_data.push_back(Zeroizing::new(fragment));
            }
            ContentType::ApplicationData => {
                debug!("Dropping unprotected application data {}", sequence);
                self.record.recycle(fragment);
            }
            ContentType::Alert => {
                debug!("Ignoring alert {}", sequence);
                self.record.recycle(fragment);
            }
            ContentType::Unknown(v) => {
                debug!("Ignoring record with content type {}", v);
                self.record.recycle(fragment);
            }
        }

        Ok(())
    }

    fn handle_handshake_record(
        &mut self,
        fragment: &[u8],
        epoch: u16,
        from: SocketAddr,
    ) -> Result<(), Error> {
        let mut input = fragment;

        while !input.is_empty() {
            let (rest, message) = match Handshake::decode(input) {
                Ok(v) => v,
                Err(Error::FragmentedHandshake) => return Err(Error::FragmentedHandshake),
                Err(e) => {
                    debug!("Dropping undecodable handshake: {}", e);
                    return Ok(());
                }
            };
            let raw = Buf::from_slice(&input[..input.len() - rest.len()]);
            input = rest;

            if !self.accept_message_seq(&message)? {
                continue;
            }

            trace!(
                "Received {:?} (message_seq {})",
                message.header.msg_type,
                message.header.message_seq
            );

            self.queue.push_back(Incoming::Handshake {
                message,
                raw,
                epoch,
                from,
            });
        }

        Ok(())
    }

    // Whether the message is the next one in order. Older messages are
    // retransmissions and may trigger a resend of our last flight.
    fn accept_message_seq(&mut self, message: &Handshake) -> Result<bool, Error> {
        if self.stateless {
            return Ok(true);
        }

        let seq = message.header.message_seq;
        let expected = self.peer_handshake_seq_no;

        if seq < expected {
            if message.header.msg_type.dupe_triggers_resend() {
                self.flight_resend("duplicate handshake")?;
            } else {
                trace!("Ignoring duplicate message_seq {}", seq);
            }
            return Ok(false);
        }

        if seq > expected {
            debug!(
                "Dropping future handshake message_seq {} (expected {})",
                seq, expected
            );
            return Ok(false);
        }

        self.peer_handshake_seq_no = expected.wrapping_add(1);
        Ok(true)
    }

    /// Look at a handshake record that arrives after the handshake is done.
    ///
    /// A peer that missed our last flight repeats its own, which makes us
    /// resend. Nothing is ever delivered from here.
    pub fn handle_late_handshake(&mut self, fragment: &[u8]) -> Result<(), Error> {
        let mut input = fragment;
        while !input.is_empty() {
            let (rest, message) = match Handshake::decode(input) {
                Ok(v) => v,
                Err(e) => {
                    debug!("Dropping handshake after completion: {}", e);
                    return Ok(());
                }
            };
            input = rest;

            let seq = message.header.message_seq;
            if seq < self.peer_handshake_seq_no {
                if message.header.msg_type.dupe_triggers_resend() {
                    self.flight_resend("duplicate handshake after completion")?;
                }
            } else {
                debug!(
                    "Ignoring {:?} after handshake completion",
                    message.header.msg_type
                );
            }
        }
        Ok(())
    }
}

impl<T> std::fmt::Debug for Engine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("record", &self.record)
            .field("params", &self.params)
            .field("peer_handshake_seq_no", &self.peer_handshake_seq_no)
            .field("next_handshake_seq_no", &self.next_handshake_seq_no)
            .field("stateless", &self.stateless)
            .finish()
    }
}
