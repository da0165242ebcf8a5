//! Listens on a shared socket and turns ConnectionRequest datagrams from unknown peers into new
//! Connections (spec §3 "Server", §4.6 "Server-side ConnectionRequest handling").

use crate::address::Address;
use crate::config::Configuration;
use crate::connection::Connection;
use crate::error::{NetworkError, NetworkResult};
use crate::host::{ConnectionId, HostHandler};
use crate::socket::{public_ipv4_addresses, Socket};
use crate::wire::{Command, ConnectionAckResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use slog::Logger;
use std::io::Cursor;
use std::rc::Rc;

/// A Server listening on a single bound socket, shared by every Connection it accepts.
pub struct Server {
    socket: Rc<Socket>,
    config: Configuration,
    log: Logger,
}

impl Server {
    /// Binds to `address`. Passing `None` listens on `*`: the first public IPv4 address reported
    /// by `public_ipv4_addresses()`, falling back to loopback if the host has none (spec §4.7).
    pub fn listen(address: Option<Address>, config: Configuration, log: Logger) -> NetworkResult<Server> {
        let bind_address = match address {
            Some(address) => address,
            None => public_ipv4_addresses().into_iter().next().unwrap_or_default(),
        };
        let socket = Rc::new(Socket::bind(bind_address)?);
        slog::info!(log, "server listening"; "address" => %socket.local_address());
        Ok(Server { socket, config, log })
    }

    pub fn local_address(&self) -> Address {
        self.socket.local_address()
    }

    pub fn socket(&self) -> &Rc<Socket> {
        &self.socket
    }

    pub fn matches(&self, socket: &Rc<Socket>) -> bool {
        Rc::ptr_eq(&self.socket, socket)
    }

    /// Handles one ConnectionRequest datagram from `remote`. Returns the freshly accepted
    /// Connection, or `None` if the request was rejected (an ack was still sent in that case).
    pub fn handle_request(
        &self,
        datagram: &[u8],
        remote: Address,
        next_id: ConnectionId,
        supported_protocols: &[u16],
        host: &mut dyn HostHandler,
    ) -> NetworkResult<Option<Connection>> {
        let mut reader = Cursor::new(datagram);
        let command = reader.read_u8()?;
        if Command::from_byte(command)? != Command::ConnectionRequest {
            return Err(NetworkError::InvalidProtocolFrame("expected ConnectionRequest"));
        }

        let count = reader.read_u16::<LittleEndian>()?;
        let mut client_protocols = Vec::with_capacity(count as usize);
        for _ in 0..count {
            client_protocols.push(reader.read_u16::<LittleEndian>()?);
        }

        let agreed = supported_protocols.iter().find(|p| client_protocols.contains(p)).copied();

        let Some(protocol) = agreed else {
            self.send_rejection(remote, ConnectionAckResult::NoCommonProtocol)?;
            slog::warn!(self.log, "rejected connection, no common protocol"; "remote" => %remote);
            return Ok(None);
        };

        self.send_accept(remote, protocol)?;
        let connection = Connection::accept(next_id, self.socket.clone(), remote, protocol, self.config, self.log.clone());
        host.client_connected(next_id);
        slog::info!(self.log, "accepted connection"; "remote" => %remote, "connection" => next_id);
        Ok(Some(connection))
    }

    /// `[ConnectionAck][Accepted][protocol:u16]` — the protocol word is present only here (spec
    /// §6.1); `original_source/debnServer.cpp:124` writes it solely on the accept path.
    fn send_accept(&self, remote: Address, protocol: u16) -> NetworkResult<()> {
        let mut datagram = Vec::with_capacity(4);
        datagram.push(Command::ConnectionAck as u8);
        datagram.push(ConnectionAckResult::Accepted as u8);
        datagram.write_u16::<LittleEndian>(protocol)?;
        self.socket.send_one_datagram(&datagram, remote)
    }

    /// `[ConnectionAck][result]` — two bytes, no protocol word (spec §8 scenario S2's `[0x01][0x01]`).
    fn send_rejection(&self, remote: Address, result: ConnectionAckResult) -> NetworkResult<()> {
        let datagram = [Command::ConnectionAck as u8, result as u8];
        self.socket.send_one_datagram(&datagram, remote)
    }
}
