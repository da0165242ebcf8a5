//! Owns every Server and Connection and drives one cooperative tick: no internal threads, no
//! blocking reads — a single `process` call ages reliables, flushes link updates, then drains
//! every readable datagram once and routes it (spec §3 "Dispatcher", §4.1, §4.6).

use crate::address::Address;
use crate::config::Configuration;
use crate::connection::{Connection, ConnectionState};
use crate::error::NetworkResult;
use crate::host::{ConnectionId, HostHandler};
use crate::server::Server;
use crate::socket::Socket;
use crate::wire::Command;
use indexmap::IndexMap;
use slog::Logger;
use std::rc::Rc;
use std::time::Duration;

pub type ServerId = usize;

#[derive(Default)]
pub struct Dispatcher {
    servers: IndexMap<ServerId, Server>,
    connections: IndexMap<ConnectionId, Connection>,
    next_server_id: ServerId,
    next_connection_id: ConnectionId,
    supported_protocols: Vec<u16>,
    config: Configuration,
    log: Option<Logger>,
}

impl Dispatcher {
    pub fn new(supported_protocols: Vec<u16>, config: Configuration, log: Logger) -> Dispatcher {
        Dispatcher {
            servers: IndexMap::new(),
            connections: IndexMap::new(),
            next_server_id: 0,
            next_connection_id: 0,
            supported_protocols,
            config,
            log: Some(log),
        }
    }

    fn log(&self) -> &Logger {
        self.log.as_ref().expect("Dispatcher constructed through new()")
    }

    pub fn listen(&mut self, address: Option<Address>) -> NetworkResult<ServerId> {
        let server = Server::listen(address, self.config, self.log().clone())?;
        let id = self.next_server_id;
        self.next_server_id += 1;
        self.servers.insert(id, server);
        Ok(id)
    }

    pub fn connect(&mut self, remote: Address) -> NetworkResult<ConnectionId> {
        let id = self.next_connection_id;
        self.next_connection_id += 1;
        let connection = Connection::connect(id, remote, &self.supported_protocols, self.config, self.log().clone())?;
        self.connections.insert(id, connection);
        Ok(id)
    }

    pub fn disconnect(&mut self, connection_id: ConnectionId, host: &mut dyn HostHandler) {
        if let Some(connection) = self.connections.get_mut(&connection_id) {
            connection.disconnect(true, host);
        }
        self.connections.shift_remove(&connection_id);
    }

    pub fn connection(&self, connection_id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&connection_id)
    }

    pub fn connection_mut(&mut self, connection_id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&connection_id)
    }

    pub fn server(&self, server_id: ServerId) -> Option<&Server> {
        self.servers.get(&server_id)
    }

    /// One cooperative tick: ages/retransmits/flushes every Connection, then drains and routes
    /// every datagram currently sitting in any owned socket's receive buffer.
    pub fn process(&mut self, elapsed: Duration, host: &mut dyn HostHandler) -> NetworkResult<()> {
        for connection in self.connections.values_mut() {
            connection.process(elapsed, host)?;
        }

        let mut closed = Vec::new();
        for (&id, connection) in self.connections.iter() {
            if connection.connection_state() == ConnectionState::Disconnected {
                closed.push(id);
            }
        }
        for id in closed {
            self.connections.shift_remove(&id);
        }

        self.drain_sockets(host)
    }

    fn distinct_sockets(&self) -> Vec<Rc<Socket>> {
        let mut sockets: Vec<Rc<Socket>> = Vec::new();
        for server in self.servers.values() {
            if !sockets.iter().any(|s| Rc::ptr_eq(s, server.socket())) {
                sockets.push(server.socket().clone());
            }
        }
        for connection in self.connections.values() {
            let socket = connection.socket_handle();
            if !sockets.iter().any(|s| Rc::ptr_eq(s, &socket)) {
                sockets.push(socket);
            }
        }
        sockets
    }

    fn drain_sockets(&mut self, host: &mut dyn HostHandler) -> NetworkResult<()> {
        let sockets = self.distinct_sockets();
        let mut buf = Vec::new();

        for socket in &sockets {
            while let Some(from) = socket.receive_one_datagram(&mut buf)? {
                self.route_datagram(socket, from, &buf, host)?;
            }
        }
        Ok(())
    }

    fn route_datagram(&mut self, socket: &Rc<Socket>, from: Address, datagram: &[u8], host: &mut dyn HostHandler) -> NetworkResult<()> {
        if let Some((_, connection)) = self.connections.iter_mut().find(|(_, c)| c.matches(socket, from)) {
            return connection.dispatch(datagram, host);
        }

        if let Some(server) = self.servers.values().find(|s| s.matches(socket)) {
            if datagram.first().copied() == Some(Command::ConnectionRequest as u8) {
                let id = self.next_connection_id;
                if let Some(connection) = server.handle_request(datagram, from, id, &self.supported_protocols, host)? {
                    self.next_connection_id += 1;
                    self.connections.insert(id, connection);
                }
            } else {
                slog::debug!(self.log(), "datagram from unknown peer on server socket, dropped"; "remote" => %from);
            }
            return Ok(());
        }

        slog::debug!(self.log(), "datagram could not be routed to any connection or server, dropped"; "remote" => %from);
        Ok(())
    }
}
