//! Datagram transport boundary.
//!
//! The session layer only needs non-blocking, possibly lossy datagram
//! delivery. `UdpTransport` is the plain socket implementation; anything
//! else (a link conditioner, an encrypted transport) plugs in behind the
//! same trait.

use std::io;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs, UdpSocket};

use super::protocol::DEFAULT_PORT;
use crate::error::{NetError, Result};

pub trait Transport {
    fn local_addr(&self) -> SocketAddr;

    fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<usize>;

    /// Returns `Ok(None)` when nothing is waiting. Must not block.
    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;

    /// Receives the owner's simulation clock once per tick.
    fn advance_time(&mut self, _time: f64) {}
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn local_addr(&self) -> SocketAddr {
        (**self).local_addr()
    }

    fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        (**self).send_to(data, addr)
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        (**self).recv_from(buf)
    }

    fn advance_time(&mut self, time: f64) {
        (**self).advance_time(time)
    }
}

#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpTransport {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;

        Ok(Self { socket, local_addr })
    }
}

impl Transport for UdpTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(data, addr)
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        loop {
            match self.socket.recv_from(buf) {
                Ok(received) => return Ok(Some(received)),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                // ICMP port unreachable from an earlier send surfaces here on
                // some platforms; it says nothing about this datagram.
                Err(ref e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Parses `host:port`, or a bare `host` which gets [`DEFAULT_PORT`].
pub fn parse_address(input: &str) -> Result<SocketAddr> {
    let input = input.trim();
    if let Ok(addr) = input.parse::<SocketAddr>() {
        return Ok(addr);
    }

    let bare = input.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    let resolved = if input.contains(':') {
        input.to_socket_addrs()
    } else {
        (input, DEFAULT_PORT).to_socket_addrs()
    };

    resolved
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| NetError::InvalidAddress(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port() {
        let addr = parse_address("127.0.0.1:30000").unwrap();
        assert_eq!(addr, "127.0.0.1:30000".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn bare_host_gets_default_port() {
        assert_eq!(parse_address("127.0.0.1").unwrap().port(), DEFAULT_PORT);
        assert_eq!(parse_address("[::1]").unwrap().port(), DEFAULT_PORT);
        assert_eq!(parse_address("localhost").unwrap().port(), DEFAULT_PORT);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_address("not an address:xx"),
            Err(NetError::InvalidAddress(_))
        ));
    }

    #[test]
    fn udp_loopback() {
        let mut a = UdpTransport::bind("127.0.0.1:0").unwrap();
        let mut b = UdpTransport::bind("127.0.0.1:0").unwrap();
        let mut buf = [0u8; 64];

        assert!(b.recv_from(&mut buf).unwrap().is_none());

        a.send_to(b"ping", b.local_addr()).unwrap();

        let mut received = None;
        for _ in 0..200 {
            if let Some(r) = b.recv_from(&mut buf).unwrap() {
                received = Some(r);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }

        let (len, from) = received.expect("no datagram");
        assert_eq!(&buf[..len], b"ping");
        assert_eq!(from, a.local_addr());
    }
}
