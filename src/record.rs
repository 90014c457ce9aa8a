//! Record layer: framing, sequencing, replay protection and record
//! protection on top of a [`Transport`].

use std::net::SocketAddr;
use std::time::Instant;

use crate::buffer::{Buf, BufferPool};
use crate::crypto::CipherSuiteAdapter;
use crate::message::{DTLSRecord, MAX_CIPHERTEXT_LEN, MAX_FRAGMENT_LEN};
use crate::transport::Transport;
use crate::types::{ContentType, ProtocolVersion, Sequence, MAX_SEQUENCE_NUMBER};
use crate::window::ReplayWindow;
use crate::Error;

/// Largest datagram we accept. Anything bigger is a capacity error rather
/// than a silently truncated read.
pub const MAX_DATAGRAM_LEN: usize = DTLSRecord::HEADER_LEN + MAX_CIPHERTEXT_LEN;

/// A received record after replay check and unprotection.
#[derive(Debug)]
pub struct Record {
    pub content_type: ContentType,
    pub sequence: Sequence,
    pub fragment: Buf,
    pub from: SocketAddr,
}

pub struct RecordLayer<T> {
    transport: T,
    peer: Option<SocketAddr>,
    max_fragment_len: usize,

    write_epoch: u16,
    /// Next sequence number for epoch 0 records. Kept apart from the later
    /// epoch so handshake retransmissions in epoch 0 never reuse a number.
    sequence_epoch_0: u64,
    /// Next sequence number for the current write epoch (> 0).
    sequence_epoch_n: u64,
    write_cipher: Option<CipherSuiteAdapter>,

    read_epoch: u16,
    read_cipher: Option<CipherSuiteAdapter>,
    replay_epoch_0: ReplayWindow,
    replay_epoch_n: ReplayWindow,

    recv_buf: Buf,
    datagram_len: usize,
    datagram_offset: usize,
    datagram_from: Option<SocketAddr>,

    pool: BufferPool,
}

impl<T: Transport> RecordLayer<T> {
    pub fn new(transport: T, peer: Option<SocketAddr>, max_fragment_len: usize) -> Self {
        let mut recv_buf = Buf::new();
        // One extra byte tells an exactly full read from a truncated one.
        recv_buf.resize(MAX_DATAGRAM_LEN + 1, 0);

        RecordLayer {
            transport,
            peer,
            max_fragment_len: max_fragment_len.min(MAX_FRAGMENT_LEN),
            write_epoch: 0,
            sequence_epoch_0: 0,
            sequence_epoch_n: 0,
            write_cipher: None,
            read_epoch: 0,
            read_cipher: None,
            replay_epoch_0: ReplayWindow::new(),
            replay_epoch_n: ReplayWindow::new(),
            recv_buf,
            datagram_len: 0,
            datagram_offset: 0,
            datagram_from: None,
            pool: BufferPool::default(),
        }
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Restrict receiving to, and send to, `peer`.
    pub fn set_peer(&mut self, peer: Option<SocketAddr>) {
        self.peer = peer;
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        self.transport.local_addr()
    }

    pub fn max_fragment_len(&self) -> usize {
        self.max_fragment_len
    }

    pub fn write_epoch(&self) -> u16 {
        self.write_epoch
    }

    pub fn read_epoch(&self) -> u16 {
        self.read_epoch
    }

    /// The sequence number the next record in `epoch` will carry.
    pub fn next_sequence(&self, epoch: u16) -> u64 {
        if epoch == 0 {
            self.sequence_epoch_0
        } else {
            self.sequence_epoch_n
        }
    }

    #[cfg(test)]
    pub(crate) fn skip_write_sequence(&mut self, next: u64) {
        if self.write_epoch == 0 {
            self.sequence_epoch_0 = next;
        } else {
            self.sequence_epoch_n = next;
        }
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Activate protection for everything we send from now on.
    ///
    /// Increments the write epoch and restarts its sequence at 0.
    pub fn change_write_epoch(&mut self, cipher: CipherSuiteAdapter) -> Result<(), Error> {
        self.write_epoch = self.write_epoch.checked_add(1).ok_or(Error::WrappedEpoch)?;
        self.sequence_epoch_n = 0;
        self.write_cipher = Some(cipher);
        debug!("Write epoch {} active", self.write_epoch);
        Ok(())
    }

    /// Expect protected records in the next epoch from now on.
    pub fn change_read_epoch(&mut self, cipher: CipherSuiteAdapter) -> Result<(), Error> {
        self.read_epoch = self.read_epoch.checked_add(1).ok_or(Error::WrappedEpoch)?;
        self.replay_epoch_n = ReplayWindow::new();
        self.read_cipher = Some(cipher);
        debug!("Read epoch {} active", self.read_epoch);
        Ok(())
    }

    /// Send one record to the bound peer.
    pub fn send_record(
        &mut self,
        content_type: ContentType,
        epoch: u16,
        payload: &[u8],
    ) -> Result<Sequence, Error> {
        let peer = self.peer.ok_or(Error::NoPeer)?;
        self.send_record_to(peer, content_type, epoch, payload)
    }

    /// Send one record in `epoch` (0 or the current write epoch) to `addr`.
    pub fn send_record_to(
        &mut self,
        addr: SocketAddr,
        content_type: ContentType,
        epoch: u16,
        payload: &[u8],
    ) -> Result<Sequence, Error> {
        if payload.len() > self.max_fragment_len {
            return Err(Error::FragmentTooLarge {
                len: payload.len(),
                max: self.max_fragment_len,
            });
        }

        if epoch != 0 && epoch != self.write_epoch {
            return Err(Error::UnexpectedEpoch(epoch));
        }

        let sequence_number = self.next_sequence(epoch);
        if sequence_number > MAX_SEQUENCE_NUMBER {
            return Err(Error::SequenceExhausted(epoch));
        }
        let sequence = Sequence {
            epoch,
            sequence_number,
        };

        let mut fragment = self.pool.pop();
        fragment.extend_from_slice(payload);

        if epoch > 0 {
            let Some(cipher) = &mut self.write_cipher else {
                self.pool.push(fragment);
                return Err(Error::CryptoError("No write cipher".to_string()));
            };
            if let Err(e) = cipher.protect(content_type, sequence, &mut fragment) {
                self.pool.push(fragment);
                return Err(e);
            }
        }

        let record = DTLSRecord {
            content_type,
            version: ProtocolVersion::DTLS1_2,
            sequence,
            length: fragment.len() as u16,
            fragment: &fragment,
        };

        let mut datagram = self.pool.pop();
        record.serialize(&mut datagram);
        let result = self.transport.send_to(&datagram, addr);

        self.pool.push(fragment);
        self.pool.push(datagram);
        result?;

        if epoch == 0 {
            self.sequence_epoch_0 += 1;
        } else {
            self.sequence_epoch_n += 1;
        }

        trace!(
            "Sent {:?} record {} ({} bytes)",
            content_type,
            sequence,
            payload.len()
        );
        Ok(sequence)
    }

    /// Send `data` as consecutive records of at most the max fragment length.
    ///
    /// Stops at the first failure.
    pub fn send_stream(&mut self, content_type: ContentType, data: &[u8]) -> Result<usize, Error> {
        let mut count = 0;
        for chunk in data.chunks(self.max_fragment_len) {
            self.send_record(content_type, self.write_epoch, chunk)?;
            count += 1;
        }
        Ok(count)
    }

    /// Receive the next record, waiting until `deadline` (`None` waits
    /// forever). `Ok(None)` means the deadline passed.
    ///
    /// Errors other than transport errors concern a single record; the rest
    /// of the datagram it arrived in is discarded and the caller may keep
    /// receiving.
    pub fn recv_record(&mut self, deadline: Option<Instant>) -> Result<Option<Record>, Error> {
        loop {
            if self.datagram_offset < self.datagram_len {
                return self.next_in_datagram().map(Some);
            }

            let timeout = match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Ok(None);
                    }
                    Some(d - now)
                }
                None => None,
            };

            let Some((n, from)) = self.transport.recv_from(&mut self.recv_buf, timeout)? else {
                return Ok(None);
            };

            if let Some(peer) = self.peer {
                if from != peer {
                    trace!("Ignoring datagram from {} (bound to {})", from, peer);
                    continue;
                }
            }

            if n > MAX_DATAGRAM_LEN {
                return Err(Error::CapacityExceeded {
                    needed: n,
                    capacity: MAX_DATAGRAM_LEN,
                });
            }

            self.datagram_len = n;
            self.datagram_offset = 0;
            self.datagram_from = Some(from);
        }
    }

    fn discard_datagram(&mut self) {
        self.datagram_offset = self.datagram_len;
    }

    fn next_in_datagram(&mut self) -> Result<Record, Error> {
        let from = self.datagram_from.ok_or(Error::NoPeer)?;

        let parsed = {
            let input = &self.recv_buf[self.datagram_offset..self.datagram_len];
            match DTLSRecord::decode(input) {
                Ok((rest, record)) => {
                    let mut fragment = self.pool.pop();
                    fragment.extend_from_slice(record.fragment);
                    Ok((
                        record.content_type,
                        record.version,
                        record.sequence,
                        input.len() - rest.len(),
                        fragment,
                    ))
                }
                Err(e) => Err(e),
            }
        };

        let (content_type, version, sequence, consumed, mut fragment) = match parsed {
            Ok(v) => v,
            Err(e) => {
                self.discard_datagram();
                debug!("Dropping undecodable record: {}", e);
                return Err(e);
            }
        };
        self.datagram_offset += consumed;

        if let Err(e) = self.check_record(content_type, version, sequence) {
            self.pool.push(fragment);
            self.discard_datagram();
            return Err(e);
        }

        if sequence.epoch > 0 {
            let Some(cipher) = &mut self.read_cipher else {
                self.pool.push(fragment);
                return Err(Error::UnexpectedEpoch(sequence.epoch));
            };
            if let Err(e) = cipher.unprotect(content_type, sequence, &mut fragment) {
                debug!("Record {} failed authentication", sequence);
                self.pool.push(fragment);
                return Err(e);
            }
        }

        if fragment.len() > MAX_FRAGMENT_LEN {
            let len = fragment.len();
            self.pool.push(fragment);
            return Err(Error::TooBigLength {
                len,
                max: MAX_FRAGMENT_LEN,
            });
        }

        // Only authenticated records move the window.
        if self.peer.is_some() {
            self.window_mut(sequence.epoch).mark(sequence.sequence_number);
        }

        trace!(
            "Received {:?} record {} ({} bytes)",
            content_type,
            sequence,
            fragment.len()
        );

        Ok(Record {
            content_type,
            sequence,
            fragment,
            from,
        })
    }

    fn check_record(
        &self,
        content_type: ContentType,
        version: ProtocolVersion,
        sequence: Sequence,
    ) -> Result<(), Error> {
        if version != ProtocolVersion::DTLS1_2 {
            return Err(Error::BadProtocolVersion(ProtocolVersion::DTLS1_2, version));
        }

        if let ContentType::Unknown(v) = content_type {
            return Err(Error::InvalidContentType(v));
        }

        if sequence.epoch != 0 && (sequence.epoch != self.read_epoch || self.read_cipher.is_none()) {
            return Err(Error::UnexpectedEpoch(sequence.epoch));
        }

        // An unbound listener keeps no per-client state, replay included.
        if self.peer.is_none() {
            return Ok(());
        }

        let window = if sequence.epoch == 0 {
            &self.replay_epoch_0
        } else {
            &self.replay_epoch_n
        };
        if !window.is_fresh(sequence.sequence_number) {
            debug!("Replayed record {}", sequence);
            return Err(Error::Replay(sequence));
        }

        Ok(())
    }

    fn window_mut(&mut self, epoch: u16) -> &mut ReplayWindow {
        if epoch == 0 {
            &mut self.replay_epoch_0
        } else {
            &mut self.replay_epoch_n
        }
    }

    /// Hand a record's buffer back for reuse.
    pub fn recycle(&mut self, fragment: Buf) {
        self.pool.push(fragment);
    }
}

impl<T> std::fmt::Debug for RecordLayer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordLayer")
            .field("peer", &self.peer)
            .field("write_epoch", &self.write_epoch)
            .field("read_epoch", &self.read_epoch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use zeroize::Zeroizing;

    use super::*;
    use crate::crypto::{Iv, KeyBlock};
    use crate::transport::MemoryTransport;
    use crate::types::{CipherSuite, Role};

    fn addrs() -> (SocketAddr, SocketAddr) {
        ("127.0.0.1:1000".parse().unwrap(), "127.0.0.1:2000".parse().unwrap())
    }

    fn layers() -> (RecordLayer<MemoryTransport>, RecordLayer<MemoryTransport>) {
        let (a, b) = addrs();
        let (ta, tb) = MemoryTransport::pair(a, b);
        (
            RecordLayer::new(ta, Some(b), MAX_FRAGMENT_LEN),
            RecordLayer::new(tb, Some(a), MAX_FRAGMENT_LEN),
        )
    }

    /// A raw end that sees the datagrams a record layer sends.
    fn layer_and_wire() -> (RecordLayer<MemoryTransport>, MemoryTransport) {
        let (a, b) = addrs();
        let (ta, tb) = MemoryTransport::pair(a, b);
        (RecordLayer::new(ta, Some(b), MAX_FRAGMENT_LEN), tb)
    }

    fn recv_datagram(wire: &mut MemoryTransport) -> Vec<u8> {
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        let (n, _) = wire
            .recv_from(&mut buf, Some(Duration::from_millis(200)))
            .unwrap()
            .unwrap();
        buf.truncate(n);
        buf
    }

    fn soon() -> Option<Instant> {
        Some(Instant::now() + Duration::from_millis(200))
    }

    fn activate(
        client: &mut RecordLayer<MemoryTransport>,
        server: &mut RecordLayer<MemoryTransport>,
    ) {
        let suite = CipherSuite::PSK_WITH_AES_128_CCM_8;
        let keys = KeyBlock {
            client_write_key: Zeroizing::new(vec![1; 16]),
            server_write_key: Zeroizing::new(vec![2; 16]),
            client_write_iv: Iv([3; 4]),
            server_write_iv: Iv([4; 4]),
        };
        let (cw, cr) = CipherSuiteAdapter::for_role(suite, &keys, Role::Client).unwrap();
        let (sw, sr) = CipherSuiteAdapter::for_role(suite, &keys, Role::Server).unwrap();
        client.change_write_epoch(cw).unwrap();
        client.change_read_epoch(cr).unwrap();
        server.change_write_epoch(sw).unwrap();
        server.change_read_epoch(sr).unwrap();
    }

    #[test]
    fn stream_of_40000_bytes_is_three_records() {
        let (mut layer, mut wire) = layer_and_wire();
        let data: Vec<u8> = (0..40_000).map(|i| i as u8).collect();

        let count = layer.send_stream(ContentType::ApplicationData, &data).unwrap();
        assert_eq!(count, 3);

        let mut lens = vec![];
        let mut joined = vec![];
        for expected_seq in 0..3 {
            let datagram = recv_datagram(&mut wire);
            let (rest, record) = DTLSRecord::decode(&datagram).unwrap();
            assert!(rest.is_empty());
            assert_eq!(record.sequence.sequence_number, expected_seq);
            lens.push(record.length as usize);
            joined.extend_from_slice(record.fragment);
        }
        assert_eq!(lens, vec![16384, 16384, 7232]);
        assert_eq!(joined, data);
    }

    #[test]
    fn sequence_numbers_are_monotonic() {
        let (mut layer, mut wire) = layer_and_wire();
        for i in 0..10u64 {
            let seq = layer
                .send_record(ContentType::Handshake, 0, &[i as u8])
                .unwrap();
            assert_eq!(seq.sequence_number, i);
        }
        for i in 0..10u64 {
            let datagram = recv_datagram(&mut wire);
            let (_, record) = DTLSRecord::decode(&datagram).unwrap();
            assert_eq!(record.sequence.sequence_number, i);
            assert_eq!(record.version, ProtocolVersion::DTLS1_2);
        }
    }

    #[test]
    fn epoch_change_restarts_sequence() {
        let (mut client, mut server) = layers();
        for _ in 0..3 {
            client.send_record(ContentType::Handshake, 0, b"hs").unwrap();
        }
        assert_eq!(client.next_sequence(0), 3);

        activate(&mut client, &mut server);
        assert_eq!(client.write_epoch(), 1);
        assert_eq!(client.next_sequence(1), 0);

        let seq = client
            .send_record(ContentType::ApplicationData, 1, b"data")
            .unwrap();
        assert_eq!(
            seq,
            Sequence {
                epoch: 1,
                sequence_number: 0
            }
        );

        // Epoch 0 keeps counting where it left off.
        let seq = client.send_record(ContentType::Handshake, 0, b"hs").unwrap();
        assert_eq!(seq.sequence_number, 3);

        for _ in 0..3 {
            server.recv_record(soon()).unwrap().unwrap();
        }
        let record = server.recv_record(soon()).unwrap().unwrap();
        assert_eq!(record.content_type, ContentType::ApplicationData);
        assert_eq!(&*record.fragment, b"data");
    }

    #[test]
    fn oversized_payload_rejected() {
        let (mut layer, _wire) = layer_and_wire();
        let err = layer
            .send_record(ContentType::ApplicationData, 0, &[0; MAX_FRAGMENT_LEN + 1])
            .unwrap_err();
        assert!(matches!(err, Error::FragmentTooLarge { .. }));
        assert_eq!(layer.next_sequence(0), 0);
    }

    #[test]
    fn sequence_exhaustion() {
        let (mut layer, _wire) = layer_and_wire();
        layer.sequence_epoch_0 = MAX_SEQUENCE_NUMBER;
        layer.send_record(ContentType::Handshake, 0, b"last").unwrap();
        let err = layer.send_record(ContentType::Handshake, 0, b"wrap").unwrap_err();
        assert!(matches!(err, Error::SequenceExhausted(0)));
    }

    #[test]
    fn replayed_record_rejected() {
        let (a, b) = addrs();
        let (ta, mut tb) = MemoryTransport::pair(a, b);
        let mut sender = RecordLayer::new(ta, Some(b), MAX_FRAGMENT_LEN);
        sender.send_record(ContentType::Handshake, 0, b"once").unwrap();
        let datagram = recv_datagram(&mut tb);

        // Feed the captured datagram twice into a fresh receiver.
        let (tc, td) = MemoryTransport::pair(a, b);
        let mut inject = tc;
        let mut receiver = RecordLayer::new(td, Some(a), MAX_FRAGMENT_LEN);
        inject.send_to(&datagram, b).unwrap();
        inject.send_to(&datagram, b).unwrap();

        assert!(receiver.recv_record(soon()).unwrap().is_some());
        let err = receiver.recv_record(soon()).unwrap_err();
        assert!(matches!(err, Error::Replay(_)));
    }

    #[test]
    fn tampered_record_is_crypto_error_and_not_marked() {
        let (a, b) = addrs();
        let (ta, mut wire_b) = MemoryTransport::pair(a, b);
        let (tc, td) = MemoryTransport::pair(a, b);
        let mut client = RecordLayer::new(ta, Some(b), MAX_FRAGMENT_LEN);
        let mut server = RecordLayer::new(td, Some(a), MAX_FRAGMENT_LEN);
        let mut inject = tc;
        activate(&mut client, &mut server);

        client
            .send_record(ContentType::ApplicationData, 1, b"secret")
            .unwrap();
        let good = recv_datagram(&mut wire_b);
        let mut bad = good.clone();
        let last = bad.len() - 1;
        bad[last] ^= 0x80;

        inject.send_to(&bad, b).unwrap();
        inject.send_to(&good, b).unwrap();

        let err = server.recv_record(soon()).unwrap_err();
        assert!(matches!(err, Error::CryptoError(_)));
        // The genuine record with the same sequence still gets through.
        let record = server.recv_record(soon()).unwrap().unwrap();
        assert_eq!(&*record.fragment, b"secret");
    }

    #[test]
    fn corrupted_length_is_decode_error() {
        let (a, b) = addrs();
        let (ta, mut wire) = MemoryTransport::pair(a, b);
        let mut receiver = RecordLayer::new(ta, Some(b), MAX_FRAGMENT_LEN);

        let mut datagram = vec![
            0x16, 0xFE, 0xFD, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x04,
        ];
        datagram.extend_from_slice(&[1, 2, 3, 4]);
        datagram[12] = 0xFF;
        wire.send_to(&datagram, a).unwrap();

        let err = receiver.recv_record(soon()).unwrap_err();
        assert!(matches!(err, Error::LengthMismatch { .. }));
    }

    #[test]
    fn shortened_length_drops_the_datagram() {
        let (a, b) = addrs();
        let (ta, mut wire) = MemoryTransport::pair(a, b);
        let mut receiver = RecordLayer::new(ta, Some(b), MAX_FRAGMENT_LEN);

        let datagram = [
            0x17, 0xFE, 0xFD, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x03, 1, 2,
            3, 4,
        ];
        wire.send_to(&datagram, a).unwrap();

        let err = receiver.recv_record(soon()).unwrap_err();
        assert!(matches!(
            err,
            Error::LengthMismatch {
                declared: 3,
                available: 4
            }
        ));
        // Nothing of the datagram is left over for the next call.
        assert!(receiver.recv_record(soon()).unwrap().is_none());
    }

    #[test]
    fn bad_record_version() {
        let (a, b) = addrs();
        let (ta, mut wire) = MemoryTransport::pair(a, b);
        let mut receiver = RecordLayer::new(ta, Some(b), MAX_FRAGMENT_LEN);
        let datagram = [
            0x16, 0xFE, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0xAA,
        ];
        wire.send_to(&datagram, a).unwrap();

        let err = receiver.recv_record(soon()).unwrap_err();
        assert!(matches!(
            err,
            Error::BadProtocolVersion(ProtocolVersion::DTLS1_2, ProtocolVersion::DTLS1_0)
        ));
    }

    #[test]
    fn unreadable_epoch() {
        let (a, b) = addrs();
        let (ta, mut wire) = MemoryTransport::pair(a, b);
        let mut receiver = RecordLayer::new(ta, Some(b), MAX_FRAGMENT_LEN);
        let datagram = [
            0x17, 0xFE, 0xFD, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0xAA,
        ];
        wire.send_to(&datagram, a).unwrap();
        assert!(matches!(
            receiver.recv_record(soon()),
            Err(Error::UnexpectedEpoch(1))
        ));
    }

    #[test]
    fn oversized_datagram_is_capacity_error() {
        let (a, b) = addrs();
        let (ta, mut wire) = MemoryTransport::pair(a, b);
        let mut receiver = RecordLayer::new(ta, Some(b), MAX_FRAGMENT_LEN);
        wire.send_to(&vec![0u8; MAX_DATAGRAM_LEN + 10], a).unwrap();
        assert!(matches!(
            receiver.recv_record(soon()),
            Err(Error::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn datagrams_from_strangers_are_ignored() {
        let (a, b) = addrs();
        let stranger: SocketAddr = "127.0.0.1:3000".parse().unwrap();
        let (ta, tb) = MemoryTransport::pair(a, stranger);
        let mut receiver = RecordLayer::new(ta, Some(b), MAX_FRAGMENT_LEN);
        let mut sender = RecordLayer::new(tb, Some(a), MAX_FRAGMENT_LEN);
        sender.send_record(ContentType::Handshake, 0, b"hi").unwrap();

        let deadline = Some(Instant::now() + Duration::from_millis(50));
        assert!(receiver.recv_record(deadline).unwrap().is_none());
    }

    #[test]
    fn deadline_passes() {
        let (mut layer, _wire) = layer_and_wire();
        let deadline = Some(Instant::now() + Duration::from_millis(10));
        assert!(layer.recv_record(deadline).unwrap().is_none());
    }

    #[test]
    fn unbound_listener_keeps_no_replay_state() {
        let (a, b) = addrs();
        let (mut inject, td) = MemoryTransport::pair(a, b);
        let mut listener = RecordLayer::new(td, None, MAX_FRAGMENT_LEN);

        let datagram = [
            0x16, 0xFE, 0xFD, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0xAA,
        ];
        inject.send_to(&datagram, b).unwrap();
        inject.send_to(&datagram, b).unwrap();

        assert!(listener.recv_record(soon()).unwrap().is_some());
        let again = listener.recv_record(soon()).unwrap().unwrap();
        assert_eq!(again.from, a);

        listener.set_peer(Some(a));
        inject.send_to(&datagram, b).unwrap();
        inject.send_to(&datagram, b).unwrap();
        assert!(listener.recv_record(soon()).unwrap().is_some());
        assert!(matches!(
            listener.recv_record(soon()),
            Err(Error::Replay(_))
        ));
    }
}
