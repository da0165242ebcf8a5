//! A bound UDP socket and its local Address (spec §3 "Socket", §4.2). Lifetime equals its owning
//! Server or client-side Connection; dropping the `Socket` closes every Connection referencing it,
//! which in this crate falls naturally out of Rust ownership (`Rc<Socket>`, see `connection.rs`)
//! rather than needing an explicit close-cascade.

use crate::address::Address;
use crate::error::NetworkError;
use mio::net::UdpSocket as MioUdpSocket;
use std::io;
use std::net::{SocketAddr, UdpSocket as StdUdpSocket};

/// Maximum size of a single datagram this core will read. Oversized datagrams are a Non-goal
/// (spec §1 — no fragmentation), so a datagram that doesn't fit is simply never delivered whole;
/// reads always ask for at most this many bytes.
pub const MAX_DATAGRAM_SIZE: usize = 8192;

pub struct Socket {
    inner: MioUdpSocket,
    local_address: Address,
}

impl Socket {
    /// Creates and binds a non-blocking UDP socket to `address`.
    pub fn bind(address: Address) -> Result<Socket, NetworkError> {
        let inner = MioUdpSocket::bind(address.to_socket_addr())?;
        let local_address = Address::from_socket_addr(inner.local_addr()?);
        Ok(Socket { inner, local_address })
    }

    pub fn local_address(&self) -> Address {
        self.local_address
    }

    /// Returns `Ok(false)` immediately if no datagram is ready. Otherwise decodes up to
    /// `MAX_DATAGRAM_SIZE` bytes into `buf` and returns `Ok(true)` with `buf` truncated to the
    /// datagram length and the sender's address.
    pub fn receive_one_datagram(&self, buf: &mut Vec<u8>) -> Result<Option<Address>, NetworkError> {
        let mut scratch = [0u8; MAX_DATAGRAM_SIZE];
        match self.inner.recv_from(&mut scratch) {
            Ok((len, from)) => {
                buf.clear();
                buf.extend_from_slice(&scratch[..len]);
                Ok(Some(Address::from_socket_addr(from)))
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Best-effort, unreliable send — not retried on `EAGAIN`/`WouldBlock`.
    pub fn send_one_datagram(&self, payload: &[u8], to: Address) -> Result<(), NetworkError> {
        match self.inner.send_to(payload, to.to_socket_addr()) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Enumerates the host's public (non-loopback) IPv4 addresses. Used by `Server` when asked to
/// listen on `*` (spec §4.7): selects the first public IPv4, falling back to localhost if none.
///
/// No example in the retrieval pack carries a NIC-enumeration crate; rather than fabricate one,
/// this walks `UdpSocket::connect` against a handful of well-known public IPv4s purely to ask the
/// OS routing table which local interface it would use — a narrower, fully offline-safe version of
/// "enumerate all interfaces" that is sufficient for "pick the address that would be used to reach
/// the outside world".
pub fn public_ipv4_addresses() -> Vec<Address> {
    const PROBES: [&str; 2] = ["8.8.8.8:80", "1.1.1.1:80"];
    let mut found = Vec::new();
    for probe in PROBES {
        if let Ok(socket) = StdUdpSocket::bind("0.0.0.0:0") {
            if socket.connect(probe).is_ok() {
                if let Ok(SocketAddr::V4(addr)) = socket.local_addr() {
                    if !addr.ip().is_loopback() && !found.contains(&Address::V4 { octets: addr.ip().octets(), port: 0 }) {
                        found.push(Address::V4 { octets: addr.ip().octets(), port: 0 });
                    }
                }
            }
        }
    }
    found
}
