//! Transport-layer abstraction sitting above [`super::socket::DatagramSocket`].
//!
//! Mirrors the reference implementation's `BaseConnection` interface:
//! protocol code (the RTP sender/receiver, handshake manager, ...) talks to
//! a `Connection` trait object and never touches a socket directly, so a
//! relay transport can be swapped in without touching the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use log::{debug, info, warn};

use super::socket::{DatagramSocket, SocketConfig};
use crate::error::{ErrorKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionType {
    /// LAN or routed UDP directly to a known peer endpoint.
    Direct,
    /// Routed through a relay/TURN-like server (interface-complete stub).
    Relay,
}

/// A remote IP/port pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    fn is_valid(&self) -> bool {
        !self.address.is_empty() && self.port != 0
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConnectionStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub send_failures: u64,
    pub recv_failures: u64,
}

/// Common surface every transport implementation exposes. Protocol code
/// depends on this trait, never on a concrete transport.
pub trait Connection: Send + Sync {
    fn open(&mut self) -> Result<()>;
    fn close(&mut self);
    fn is_open(&self) -> bool;
    fn send(&self, data: &[u8]) -> Result<usize>;
    fn recv(&self, buffer: &mut [u8], timeout_ms: i64) -> Result<usize>;
    fn connection_type(&self) -> ConnectionType;

    /// The locally bound port, once open. `None` for transports (e.g. a
    /// relay) with no local socket of their own.
    fn local_port(&self) -> Option<u16> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct DirectConnectionConfig {
    pub local_ip: String,
    pub local_port: u16,
    pub remote: Endpoint,
    pub socket_buffer_size: usize,
    pub recv_timeout_ms: i64,
}

impl Default for DirectConnectionConfig {
    fn default() -> Self {
        Self {
            local_ip: "0.0.0.0".to_string(),
            local_port: 0,
            remote: Endpoint::new("", 0),
            socket_buffer_size: 1024 * 1024,
            recv_timeout_ms: 1000,
        }
    }
}

/// A remote endpoint reached by UDP, with no relay in the path. The remote
/// may be fixed at construction (controller side) or left unset and learned
/// from the first inbound datagram (controlled side, which listens for
/// whichever peer connects first).
pub struct DirectConnection {
    config: DirectConnectionConfig,
    socket: DatagramSocket,
    remote: Mutex<Option<Endpoint>>,
    stats: ConnectionStatsCell,
}

#[derive(Default)]
struct ConnectionStatsCell {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    send_failures: AtomicU64,
    recv_failures: AtomicU64,
}

impl DirectConnection {
    pub fn new(config: DirectConnectionConfig) -> Self {
        let socket = DatagramSocket::new(SocketConfig {
            local_ip: config.local_ip.clone(),
            local_port: config.local_port,
            socket_buffer_size: config.socket_buffer_size,
            recv_timeout_ms: config.recv_timeout_ms,
        });
        let remote = config.remote.is_valid().then(|| config.remote.clone());
        Self {
            config,
            socket,
            remote: Mutex::new(remote),
            stats: ConnectionStatsCell::default(),
        }
    }

    pub fn set_remote(&self, endpoint: Endpoint) -> Result<()> {
        if !endpoint.is_valid() {
            return Result::err(ErrorKind::InvalidParameter, "invalid remote endpoint");
        }
        debug!("remote endpoint set: {}:{}", endpoint.address, endpoint.port);
        *self.remote.lock().unwrap() = Some(endpoint);
        Result::ok(())
    }

    /// The endpoint currently in use, whether configured up front or
    /// learned from an inbound datagram.
    pub fn remote(&self) -> Option<Endpoint> {
        self.remote.lock().unwrap().clone()
    }

    /// The locally bound port, once `open()` has succeeded. Mainly useful
    /// in tests that need to wire up a peer's remote endpoint dynamically.
    pub fn local_port(&self) -> Option<u16> {
        self.socket.local_addr().map(|a| a.port())
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            bytes_sent: self.stats.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.stats.bytes_received.load(Ordering::Relaxed),
            packets_sent: self.stats.packets_sent.load(Ordering::Relaxed),
            packets_received: self.stats.packets_received.load(Ordering::Relaxed),
            send_failures: self.stats.send_failures.load(Ordering::Relaxed),
            recv_failures: self.stats.recv_failures.load(Ordering::Relaxed),
        }
    }
}

impl Connection for DirectConnection {
    fn open(&mut self) -> Result<()> {
        if self.socket.is_open() {
            return Result::err(ErrorKind::AlreadyRunning, "connection already open");
        }
        if let Result::Err(e) = self.socket.open() {
            return Result::Err(e);
        }
        info!(
            "direct connection opened: local={}:{}, remote={:?}",
            self.config.local_ip,
            self.config.local_port,
            self.remote.lock().unwrap()
        );
        Result::ok(())
    }

    fn close(&mut self) {
        self.socket.close();
        debug!("direct connection closed");
    }

    fn is_open(&self) -> bool {
        self.socket.is_open()
    }

    fn send(&self, data: &[u8]) -> Result<usize> {
        if !self.is_open() {
            return Result::err(ErrorKind::NotInitialized, "connection not open");
        }
        if data.is_empty() {
            return Result::err(ErrorKind::InvalidParameter, "empty send buffer");
        }
        let remote = match self.remote.lock().unwrap().clone() {
            Some(r) => r,
            None => return Result::err(ErrorKind::NetworkError, "remote endpoint not set"),
        };
        match self.socket.send_to(data, &remote.address, remote.port) {
            Result::Ok(n) => {
                self.stats.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
                self.stats.packets_sent.fetch_add(1, Ordering::Relaxed);
                Result::ok(n)
            }
            Result::Err(e) => {
                self.stats.send_failures.fetch_add(1, Ordering::Relaxed);
                Result::Err(e)
            }
        }
    }

    fn recv(&self, buffer: &mut [u8], timeout_ms: i64) -> Result<usize> {
        if !self.is_open() {
            return Result::err(ErrorKind::NotInitialized, "connection not open");
        }
        match self.socket.recv_from(buffer, timeout_ms) {
            Result::Ok((n, ip, port)) => {
                self.stats
                    .bytes_received
                    .fetch_add(n as u64, Ordering::Relaxed);
                self.stats.packets_received.fetch_add(1, Ordering::Relaxed);
                let mut remote = self.remote.lock().unwrap();
                if remote.is_none() {
                    info!("learned remote endpoint from first inbound datagram: {ip}:{port}");
                    *remote = Some(Endpoint::new(ip, port));
                }
                Result::ok(n)
            }
            Result::Err(e) => {
                if e.kind() != ErrorKind::Timeout {
                    self.stats.recv_failures.fetch_add(1, Ordering::Relaxed);
                }
                Result::Err(e)
            }
        }
    }

    fn connection_type(&self) -> ConnectionType {
        ConnectionType::Direct
    }

    fn local_port(&self) -> Option<u16> {
        self.socket.local_addr().map(|a| a.port())
    }
}

/// Routed through a relay server. Phase 2 of the reference design; this is
/// an interface-complete stub with no TURN wire protocol behind it yet, kept
/// so `ConnectionManager`-shaped callers can select a transport by type
/// without special-casing "not implemented" at every call site.
pub struct RelayConnection {
    relay: Endpoint,
    open: bool,
}

impl RelayConnection {
    pub fn new(relay: Endpoint) -> Self {
        Self { relay, open: false }
    }
}

impl Connection for RelayConnection {
    fn open(&mut self) -> Result<()> {
        warn!(
            "relay connection to {}:{} requested but no relay transport is implemented",
            self.relay.address, self.relay.port
        );
        Result::err(ErrorKind::NotSupported, "relay transport not implemented")
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn send(&self, _data: &[u8]) -> Result<usize> {
        Result::err(ErrorKind::NotSupported, "relay transport not implemented")
    }

    fn recv(&self, _buffer: &mut [u8], _timeout_ms: i64) -> Result<usize> {
        Result::err(ErrorKind::NotSupported, "relay transport not implemented")
    }

    fn connection_type(&self) -> ConnectionType {
        ConnectionType::Relay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_without_remote_fails() {
        let mut conn = DirectConnection::new(DirectConnectionConfig {
            local_ip: "127.0.0.1".into(),
            ..Default::default()
        });
        assert!(conn.open().is_ok());
        let r = conn.send(b"hi");
        assert!(r.is_err());
    }

    #[test]
    fn direct_connection_round_trip() {
        let mut b = DirectConnection::new(DirectConnectionConfig {
            local_ip: "127.0.0.1".into(),
            ..Default::default()
        });
        assert!(b.open().is_ok());
        let b_port = b.local_port().unwrap();

        let mut a = DirectConnection::new(DirectConnectionConfig {
            local_ip: "127.0.0.1".into(),
            remote: Endpoint::new("127.0.0.1", b_port),
            ..Default::default()
        });
        assert!(a.open().is_ok());

        assert!(a.send(b"ping").is_ok());
        let mut buf = [0u8; 16];
        let n = b.recv(&mut buf, 1000);
        assert!(n.is_ok());
    }

    #[test]
    fn relay_connection_reports_not_supported() {
        let mut r = RelayConnection::new(Endpoint::new("relay.example", 3478));
        assert!(r.open().is_err());
        assert!(!r.is_open());
    }
}
