//! Thin OS-portable UDP wrapper.
//!
//! Grounded on the reference implementation's `UdpSocket`: no connected-
//! socket assumption (every send carries its destination, every recv
//! yields its source), a configurable receive timeout, and byte/packet
//! counters. Built on `std::net::UdpSocket`; no async runtime.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket as StdUdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::debug;

use crate::error::{ErrorKind, Result};

#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub local_ip: String,
    pub local_port: u16,
    pub socket_buffer_size: usize,
    pub recv_timeout_ms: i64,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            local_ip: "0.0.0.0".to_string(),
            local_port: 0,
            socket_buffer_size: 1024 * 1024,
            recv_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SocketStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
}

/// OS-portable UDP socket. Every send carries its destination; every recv
/// yields its source — this type never assumes a "connected" peer.
pub struct DatagramSocket {
    config: SocketConfig,
    socket: Option<StdUdpSocket>,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
}

impl DatagramSocket {
    pub fn new(config: SocketConfig) -> Self {
        Self {
            config,
            socket: None,
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
        }
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    pub fn open(&mut self) -> Result<()> {
        let bind_addr = format!("{}:{}", self.config.local_ip, self.config.local_port);
        let socket = match StdUdpSocket::bind(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                return Result::err(
                    ErrorKind::SocketBindFailed,
                    format!("bind {} failed: {}", bind_addr, e),
                )
            }
        };

        if let Err(e) = set_buffer_sizes(&socket, self.config.socket_buffer_size) {
            debug!("could not set socket buffer sizes: {e}");
        }

        let timeout = recv_timeout_duration(self.config.recv_timeout_ms);
        if let Err(e) = socket.set_read_timeout(timeout) {
            return Result::err(
                ErrorKind::SocketBindFailed,
                format!("set_read_timeout failed: {e}"),
            );
        }

        self.socket = Some(socket);
        Result::ok(())
    }

    pub fn close(&mut self) {
        self.socket = None;
    }

    pub fn send_to(&self, bytes: &[u8], ip: &str, port: u16) -> Result<usize> {
        let socket = match &self.socket {
            Some(s) => s,
            None => return Result::err(ErrorKind::NotInitialized, "socket not open"),
        };
        let addr = match resolve(ip, port) {
            Some(a) => a,
            None => {
                return Result::err(ErrorKind::InvalidAddress, format!("bad address {ip}:{port}"))
            }
        };
        match socket.send_to(bytes, addr) {
            Ok(n) => {
                self.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
                self.packets_sent.fetch_add(1, Ordering::Relaxed);
                Result::ok(n)
            }
            Err(e) => Result::err(ErrorKind::SocketSendFailed, e.to_string()),
        }
    }

    /// `timeout_ms == 0` polls without blocking; `timeout_ms < 0` uses the
    /// socket's configured default.
    pub fn recv_from(&self, buffer: &mut [u8], timeout_ms: i64) -> Result<(usize, String, u16)> {
        let socket = match &self.socket {
            Some(s) => s,
            None => return Result::err(ErrorKind::NotInitialized, "socket not open"),
        };

        let effective = if timeout_ms < 0 {
            self.config.recv_timeout_ms
        } else {
            timeout_ms
        };

        let result = if effective == 0 {
            if let Err(e) = socket.set_nonblocking(true) {
                return Result::err(ErrorKind::SocketRecvFailed, e.to_string());
            }
            let result = socket.recv_from(buffer);
            if let Err(e) = socket.set_nonblocking(false) {
                return Result::err(ErrorKind::SocketRecvFailed, e.to_string());
            }
            result
        } else {
            if let Err(e) = socket.set_read_timeout(recv_timeout_duration(effective)) {
                return Result::err(ErrorKind::SocketRecvFailed, e.to_string());
            }
            socket.recv_from(buffer)
        };

        match result {
            Ok((n, from)) => {
                self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
                self.packets_received.fetch_add(1, Ordering::Relaxed);
                let (ip, port) = match from {
                    SocketAddr::V4(a) => (a.ip().to_string(), a.port()),
                    SocketAddr::V6(a) => (a.ip().to_string(), a.port()),
                };
                Result::ok((n, ip, port))
            }
            Err(e) if is_timeout(&e) => Result::err(ErrorKind::Timeout, "recv timed out"),
            Err(e) => Result::err(ErrorKind::SocketRecvFailed, e.to_string()),
        }
    }

    /// Blocks up to `timeout_ms` until the socket is readable. `0` polls
    /// without blocking; negative uses the socket's configured default.
    pub fn wait_for_read(&self, timeout_ms: i64) -> bool {
        let mut probe = [0u8; 1];
        self.recv_from_peek(&mut probe, timeout_ms).is_ok()
    }

    fn recv_from_peek(&self, buffer: &mut [u8], timeout_ms: i64) -> std::io::Result<usize> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotConnected, "not open"))?;

        let effective = if timeout_ms < 0 {
            self.config.recv_timeout_ms
        } else {
            timeout_ms
        };

        if effective == 0 {
            socket.set_nonblocking(true)?;
            let result = socket.peek(buffer);
            socket.set_nonblocking(false)?;
            return result;
        }

        socket.set_read_timeout(recv_timeout_duration(effective))?;
        socket.peek(buffer)
    }

    /// The locally bound address, once `open()` has succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    pub fn stats(&self) -> SocketStats {
        SocketStats {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
        }
    }

    /// Raw OS handle, for advanced callers (e.g. external `select`/`poll`
    /// integration). Matches the reference implementation's `GetHandle`.
    #[cfg(unix)]
    pub fn raw_fd(&self) -> Option<std::os::unix::io::RawFd> {
        use std::os::unix::io::AsRawFd;
        self.socket.as_ref().map(|s| s.as_raw_fd())
    }
}

/// `recv_from` resolves `timeout_ms == 0` to a non-blocking poll itself and
/// never reaches this helper with a zero value; `None` here is reserved for
/// callers outside that path (e.g. `recv_from_peek`) passing a negative
/// "use the default" value that itself resolves to 0.
fn recv_timeout_duration(timeout_ms: i64) -> Option<Duration> {
    if timeout_ms <= 0 {
        None
    } else {
        Some(Duration::from_millis(timeout_ms as u64))
    }
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

fn resolve(ip: &str, port: u16) -> Option<SocketAddr> {
    (ip, port).to_socket_addrs().ok()?.next()
}

#[cfg(unix)]
fn set_buffer_sizes(socket: &StdUdpSocket, size: usize) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;
    let fd = socket.as_raw_fd();
    let size_i32 = size as libc::c_int;
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_SNDBUF,
            &size_i32 as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            &size_i32 as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_buffer_sizes(_socket: &StdUdpSocket, _size: usize) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_recv_loopback() {
        let mut a = DatagramSocket::new(SocketConfig {
            local_ip: "127.0.0.1".into(),
            local_port: 0,
            ..Default::default()
        });
        assert!(a.open().is_ok());
        let mut b = DatagramSocket::new(SocketConfig {
            local_ip: "127.0.0.1".into(),
            local_port: 0,
            ..Default::default()
        });
        assert!(b.open().is_ok());

        let b_port = b.socket.as_ref().unwrap().local_addr().unwrap().port();
        let r = a.send_to(b"hello", "127.0.0.1", b_port);
        assert!(r.is_ok());

        let mut buf = [0u8; 64];
        let recvd = b.recv_from(&mut buf, 1000);
        assert!(recvd.is_ok());
        let (n, _ip, _port) = match recvd {
            Result::Ok(v) => v,
            Result::Err(_) => unreachable!(),
        };
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn recv_without_data_times_out() {
        let mut a = DatagramSocket::new(SocketConfig {
            local_ip: "127.0.0.1".into(),
            local_port: 0,
            recv_timeout_ms: 50,
            ..Default::default()
        });
        assert!(a.open().is_ok());
        let mut buf = [0u8; 16];
        let r = a.recv_from(&mut buf, 50);
        assert!(r.is_err());
        assert_eq!(r.code(), Some(ErrorKind::Timeout));
    }
}
