//! Datagram transports the engine runs over.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::Error;

/// An unreliable, unordered datagram channel.
pub trait Transport: Send {
    /// Send one datagram to `addr`.
    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> Result<(), Error>;

    /// Receive one datagram into `buf`, waiting at most `timeout`
    /// (`None` waits forever).
    ///
    /// Returns `Ok(None)` when the timeout elapses. A datagram larger than
    /// `buf` is truncated to `buf.len()`.
    fn recv_from(
        &mut self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<Option<(usize, SocketAddr)>, Error>;

    /// The address this end is bound to.
    fn local_addr(&self) -> Result<SocketAddr, Error>;
}

/// [`Transport`] over a std UDP socket.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub fn bind(addr: SocketAddr) -> Result<Self, Error> {
        let socket = UdpSocket::bind(addr)?;
        debug!("UDP bound to {}", socket.local_addr()?);
        Ok(UdpTransport { socket })
    }

    /// Bind an ephemeral port of the same address family as `peer`.
    pub fn bind_for(peer: SocketAddr) -> Result<Self, Error> {
        let local: SocketAddr = match peer {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        Self::bind(local)
    }

    pub fn from_socket(socket: UdpSocket) -> Self {
        UdpTransport { socket }
    }

    pub fn into_inner(self) -> UdpSocket {
        self.socket
    }
}

impl Transport for UdpTransport {
    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> Result<(), Error> {
        let n = self.socket.send_to(buf, addr)?;
        if n != buf.len() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("Short datagram write: {} of {}", n, buf.len()),
            )));
        }
        Ok(())
    }

    fn recv_from(
        &mut self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<Option<(usize, SocketAddr)>, Error> {
        // A zero read timeout is rejected by the OS API.
        let timeout = timeout.map(|t| t.max(Duration::from_millis(1)));
        self.socket.set_read_timeout(timeout)?;

        match self.socket.recv_from(buf) {
            Ok((n, addr)) => Ok(Some((n, addr))),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.socket.local_addr()?)
    }
}

type Filter = Box<dyn FnMut(&[u8]) -> bool + Send>;

/// In-memory datagram pipe between two ends, for tests and simulations.
///
/// Each end only talks to the other. A filter on the sending side can
/// inspect outgoing datagrams and drop them to simulate loss.
pub struct MemoryTransport {
    local: SocketAddr,
    peer: SocketAddr,
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    filter: Option<Filter>,
}

impl MemoryTransport {
    /// Two connected ends with the given addresses.
    pub fn pair(a: SocketAddr, b: SocketAddr) -> (MemoryTransport, MemoryTransport) {
        let (tx_a, rx_b) = mpsc::channel();
        let (tx_b, rx_a) = mpsc::channel();
        (
            MemoryTransport {
                local: a,
                peer: b,
                tx: tx_a,
                rx: rx_a,
                filter: None,
            },
            MemoryTransport {
                local: b,
                peer: a,
                tx: tx_b,
                rx: rx_b,
                filter: None,
            },
        )
    }

    /// Inspect every outgoing datagram. Returning `false` drops it.
    pub fn set_filter<F>(&mut self, filter: F)
    where
        F: FnMut(&[u8]) -> bool + Send + 'static,
    {
        self.filter = Some(Box::new(filter));
    }

    pub fn clear_filter(&mut self) {
        self.filter = None;
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl Transport for MemoryTransport {
    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> Result<(), Error> {
        if addr != self.peer {
            trace!("Memory transport has no route to {}", addr);
            return Ok(());
        }
        if let Some(filter) = &mut self.filter {
            if !filter(buf) {
                trace!("Dropping datagram of {} bytes", buf.len());
                return Ok(());
            }
        }
        self.tx.send(buf.to_vec()).map_err(|_| Error::Disconnected)
    }

    fn recv_from(
        &mut self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<Option<(usize, SocketAddr)>, Error> {
        let datagram = match timeout {
            None => self.rx.recv().map_err(|_| Error::Disconnected)?,
            Some(t) => match self.rx.recv_timeout(t) {
                Ok(d) => d,
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => return Err(Error::Disconnected),
            },
        };

        let n = datagram.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram[..n]);
        Ok(Some((n, self.peer)))
    }

    fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.local)
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("local", &self.local)
            .field("peer", &self.peer)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn addrs() -> (SocketAddr, SocketAddr) {
        ("127.0.0.1:1000".parse().unwrap(), "127.0.0.1:2000".parse().unwrap())
    }

    #[test]
    fn memory_pair_delivers() {
        let (a_addr, b_addr) = addrs();
        let (mut a, mut b) = MemoryTransport::pair(a_addr, b_addr);
        a.send_to(b"ping", b_addr).unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = b
            .recv_from(&mut buf, Some(Duration::from_millis(100)))
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(from, a_addr);
    }

    #[test]
    fn memory_timeout_and_disconnect() {
        let (a_addr, b_addr) = addrs();
        let (a, mut b) = MemoryTransport::pair(a_addr, b_addr);
        let mut buf = [0u8; 16];
        assert!(b
            .recv_from(&mut buf, Some(Duration::from_millis(5)))
            .unwrap()
            .is_none());

        drop(a);
        assert!(matches!(
            b.recv_from(&mut buf, Some(Duration::from_millis(5))),
            Err(Error::Disconnected)
        ));
    }

    #[test]
    fn filter_drops_and_observes() {
        let (a_addr, b_addr) = addrs();
        let (mut a, mut b) = MemoryTransport::pair(a_addr, b_addr);
        let seen = Arc::new(Mutex::new(0));
        let seen2 = seen.clone();
        a.set_filter(move |d| {
            *seen2.lock().unwrap() += 1;
            d != b"drop"
        });

        a.send_to(b"drop", b_addr).unwrap();
        a.send_to(b"keep", b_addr).unwrap();

        let mut buf = [0u8; 16];
        let (n, _) = b
            .recv_from(&mut buf, Some(Duration::from_millis(100)))
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"keep");
        assert_eq!(*seen.lock().unwrap(), 2);
    }

    #[test]
    fn oversized_datagram_is_truncated() {
        let (a_addr, b_addr) = addrs();
        let (mut a, mut b) = MemoryTransport::pair(a_addr, b_addr);
        a.send_to(&[1; 32], b_addr).unwrap();
        let mut buf = [0u8; 8];
        let (n, _) = b.recv_from(&mut buf, None).unwrap().unwrap();
        assert_eq!(n, 8);
    }

    #[test]
    fn udp_loopback() {
        let mut a = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let mut b = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let b_addr = b.local_addr().unwrap();
        a.send_to(b"hello", b_addr).unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = b
            .recv_from(&mut buf, Some(Duration::from_secs(2)))
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(from, a.local_addr().unwrap());

        assert!(b
            .recv_from(&mut buf, Some(Duration::from_millis(10)))
            .unwrap()
            .is_none());
    }
}
