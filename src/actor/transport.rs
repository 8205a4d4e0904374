//! Byte level transports the [super::RpcSocket] sends and receives messages over.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

/// Largest UDP payload.
const MTU: usize = 65_535;
/// Ports a [MemoryNetwork] picks from when none is requested.
const FIRST_MEMORY_PORT: u16 = 10_001;
/// How long [Transport::recv] may block when no message is available.
pub const MAX_THREAD_BLOCK_DURATION: Duration = Duration::from_millis(1);

/// Sends and receives datagrams for a single node.
///
/// The actor thread polls [Transport::recv] in its loop, so implementations
/// should block for at most a short while.
pub trait Transport: Send + std::fmt::Debug {
    /// The address other nodes reach this transport at.
    fn local_addr(&self) -> SocketAddr;

    /// Send a payload to `to`, `timeout` is a hint for how long delivery may take.
    fn send(&mut self, payload: &[u8], to: SocketAddr, timeout: Duration)
        -> Result<(), TransportError>;

    /// Receive the next payload if any.
    fn recv(&mut self) -> Option<(Vec<u8>, SocketAddr)>;
}

#[derive(thiserror::Error, Debug)]
/// Transport errors
pub enum TransportError {
    #[error("Port {0} is already in use")]
    PortInUse(u16),

    #[error("Transport is already started")]
    AlreadyStarted,

    #[error("No endpoint reachable at {0}")]
    Unreachable(SocketAddr),

    /// Every port of a [MemoryNetwork] is bound.
    #[error("No free port left")]
    NoFreePort,

    #[error(transparent)]
    /// Transparent [std::io::Error]
    IO(#[from] std::io::Error),
}

// === UDP ===

#[derive(Debug)]
/// Non blocking [UdpSocket] transport.
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    buf: Vec<u8>,
}

impl UdpTransport {
    /// Bind to `port` on all interfaces, or to a random port if `None`.
    pub fn bind(port: Option<u16>) -> Result<Self, TransportError> {
        UdpTransport::bind_to(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port.unwrap_or(0))))
    }

    pub fn bind_to(address: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(address).map_err(|error| match error.kind() {
            ErrorKind::AddrInUse => TransportError::PortInUse(address.port()),
            _ => TransportError::IO(error),
        })?;

        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            buf: vec![0; MTU],
        })
    }
}

impl Transport for UdpTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn send(
        &mut self,
        payload: &[u8],
        to: SocketAddr,
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        self.socket.send_to(payload, to)?;
        Ok(())
    }

    fn recv(&mut self) -> Option<(Vec<u8>, SocketAddr)> {
        match self.socket.recv_from(&mut self.buf) {
            Ok((amt, from)) => Some((self.buf[..amt].to_vec(), from)),
            Err(error) => {
                match error.kind() {
                    ErrorKind::WouldBlock => {
                        std::thread::sleep(MAX_THREAD_BLOCK_DURATION);
                    }
                    _ => warn!("IO error {error}"),
                };

                None
            }
        }
    }
}

// === In memory ===

type Datagram = (Vec<u8>, SocketAddr);

#[derive(Debug, Default)]
struct MemoryNetworkInner {
    endpoints: HashMap<SocketAddr, flume::Sender<Datagram>>,
    next_port: u16,
}

#[derive(Debug, Clone, Default)]
/// In-process network connecting [MemoryTransport]s, used by [crate::Testnet].
pub struct MemoryNetwork {
    inner: Arc<Mutex<MemoryNetworkInner>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a new endpoint at `127.0.0.1:port`, or at the next free port if `None`.
    pub fn bind(&self, port: Option<u16>) -> Result<MemoryTransport, TransportError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let port = match port {
            Some(port) => port,
            None => (FIRST_MEMORY_PORT..=u16::MAX)
                .find_map(|_| {
                    inner.next_port = match inner.next_port {
                        port if port < FIRST_MEMORY_PORT || port == u16::MAX => FIRST_MEMORY_PORT,
                        port => port + 1,
                    };
                    let address = SocketAddr::from((Ipv4Addr::LOCALHOST, inner.next_port));

                    (!inner.endpoints.contains_key(&address)).then_some(inner.next_port)
                })
                .ok_or(TransportError::NoFreePort)?,
        };

        let local_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));

        if inner.endpoints.contains_key(&local_addr) {
            return Err(TransportError::PortInUse(port));
        }

        let (sender, receiver) = flume::unbounded();
        inner.endpoints.insert(local_addr, sender);

        Ok(MemoryTransport {
            network: self.clone(),
            local_addr,
            receiver,
        })
    }

    fn deliver(&self, payload: &[u8], from: SocketAddr, to: SocketAddr) -> Result<(), TransportError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let endpoint = inner
            .endpoints
            .get(&to)
            .ok_or(TransportError::Unreachable(to))?;

        endpoint
            .send((payload.to_vec(), from))
            .map_err(|_| TransportError::Unreachable(to))
    }

    fn unbind(&self, address: &SocketAddr) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.endpoints.remove(address);
    }
}

#[derive(Debug)]
/// Endpoint of a [MemoryNetwork].
pub struct MemoryTransport {
    network: MemoryNetwork,
    local_addr: SocketAddr,
    receiver: flume::Receiver<Datagram>,
}

impl Transport for MemoryTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn send(
        &mut self,
        payload: &[u8],
        to: SocketAddr,
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        self.network.deliver(payload, self.local_addr, to)
    }

    fn recv(&mut self) -> Option<(Vec<u8>, SocketAddr)> {
        match self.receiver.recv_timeout(MAX_THREAD_BLOCK_DURATION) {
            Ok(datagram) => Some(datagram),
            Err(flume::RecvTimeoutError::Timeout) => None,
            Err(flume::RecvTimeoutError::Disconnected) => {
                debug!(local_addr = ?self.local_addr, "MemoryTransport disconnected");
                None
            }
        }
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.network.unbind(&self.local_addr);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn memory_transport() {
        let network = MemoryNetwork::new();

        let mut a = network.bind(None).unwrap();
        let mut b = network.bind(None).unwrap();

        a.send(b"hello", b.local_addr(), Duration::from_secs(1))
            .unwrap();

        assert_eq!(b.recv(), Some((b"hello".to_vec(), a.local_addr())));
        assert_eq!(b.recv(), None);
    }

    #[test]
    fn memory_port_in_use() {
        let network = MemoryNetwork::new();

        let a = network.bind(Some(6881)).unwrap();

        assert!(matches!(
            network.bind(Some(6881)),
            Err(TransportError::PortInUse(6881))
        ));

        drop(a);

        assert!(network.bind(Some(6881)).is_ok());
    }

    #[test]
    fn memory_ports_exhausted() {
        let network = MemoryNetwork::new();

        let bound: Vec<MemoryTransport> = (FIRST_MEMORY_PORT..=u16::MAX)
            .map(|_| network.bind(None).unwrap())
            .collect();

        assert!(matches!(network.bind(None), Err(TransportError::NoFreePort)));
        // Explicit ports outside the picked range are still free.
        assert!(network.bind(Some(6881)).is_ok());

        drop(bound);

        assert!(network.bind(None).is_ok());
    }

    #[test]
    fn memory_unreachable() {
        let network = MemoryNetwork::new();
        let mut a = network.bind(None).unwrap();

        let nowhere = SocketAddr::from(([127, 0, 0, 1], 1));

        assert!(matches!(
            a.send(b"hello", nowhere, Duration::from_secs(1)),
            Err(TransportError::Unreachable(_))
        ));
    }

    #[test]
    fn udp_port_in_use() {
        let a = UdpTransport::bind_to(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).unwrap();
        let port = a.local_addr().port();

        assert!(matches!(
            UdpTransport::bind_to(SocketAddr::from((Ipv4Addr::LOCALHOST, port))),
            Err(TransportError::PortInUse(_))
        ));
    }

    #[test]
    fn udp_transport() {
        let mut a = UdpTransport::bind_to(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).unwrap();
        let mut b = UdpTransport::bind_to(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).unwrap();

        a.send(b"hello", b.local_addr(), Duration::from_secs(1))
            .unwrap();

        let received = loop {
            if let Some(received) = b.recv() {
                break received;
            }
        };

        assert_eq!(received, (b"hello".to_vec(), a.local_addr()));
    }
}
