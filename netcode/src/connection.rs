//! One-to-one peer relationship (spec §3 "Connection", §4.6). Owns the reliable send/receive
//! windows, the StateLinks mirroring the peer's States, and per-tick timeout/flush processing.

use crate::address::Address;
use crate::config::Configuration;
use crate::error::{NetworkError, NetworkResult};
use crate::host::{ConnectionId, HostHandler, StateId};
use crate::message::{Message, MessageQueue, MessageState};
use crate::seq;
use crate::socket::Socket;
use crate::state::StateHandle;
use crate::state_link::{LinkState, StateLink, StateLinkId};
use crate::wire::{AckCode, Command};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use slog::Logger;
use std::cell::RefCell;
use std::io::{Cursor, Read};
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

struct LinkEntry {
    link: Rc<RefCell<StateLink>>,
    state: StateHandle,
    state_id: StateId,
}

/// Allocates StateLink identifiers by linear probe modulo 65535 from a rolling cursor (spec §3
/// invariant: identifiers are unique within a Connection at any instant).
struct LinkIdPool {
    cursor: u16,
}

impl LinkIdPool {
    fn new() -> LinkIdPool {
        LinkIdPool { cursor: 0 }
    }

    fn allocate(&mut self, in_use: &impl Fn(StateLinkId) -> bool) -> NetworkResult<StateLinkId> {
        let start = self.cursor;
        loop {
            let candidate = self.cursor;
            self.cursor = seq::add(self.cursor, 1);
            if !in_use(candidate) {
                return Ok(candidate);
            }
            if self.cursor == start {
                return Err(NetworkError::OutOfResources("state link identifier pool exhausted"));
            }
        }
    }
}

pub struct Connection {
    id: ConnectionId,
    socket: Rc<Socket>,
    remote: Address,
    state: ConnectionState,
    protocol: u16,

    send_queue: MessageQueue,
    recv_queue: MessageQueue,
    next_send: u16,
    next_recv: u16,
    window_size: u16,

    links: Vec<LinkEntry>,
    link_ids: LinkIdPool,

    /// Set only while Connecting: the ConnectionRequest datagram, resent every
    /// `connectResendInterval` until a ConnectionAck arrives or `connectTimeout` elapses.
    connect_request: Option<Vec<u8>>,
    connect_elapsed: f32,
    connect_since_resend: f32,

    config: Configuration,
    log: Logger,
}

fn frame_header(buf: &mut Vec<u8>, command: Command) {
    buf.push(command as u8);
}

impl Connection {
    /// Client-side connect: binds a private socket to IPv4-any, sends ConnectionRequest with the
    /// client's supported protocol list, transitions to Connecting.
    pub fn connect(id: ConnectionId, remote: Address, supported_protocols: &[u16], config: Configuration, log: Logger) -> NetworkResult<Connection> {
        let socket = Rc::new(Socket::bind(Address::V4 { octets: [0, 0, 0, 0], port: 0 })?);

        let mut connection = Connection {
            id,
            socket,
            remote,
            state: ConnectionState::Connecting,
            protocol: 0,
            send_queue: MessageQueue::new(),
            recv_queue: MessageQueue::new(),
            next_send: 0,
            next_recv: 0,
            window_size: config.window_size,
            links: Vec::new(),
            link_ids: LinkIdPool::new(),
            connect_request: None,
            connect_elapsed: 0.0,
            connect_since_resend: 0.0,
            config,
            log,
        };

        let mut payload = Vec::new();
        frame_header(&mut payload, Command::ConnectionRequest);
        payload.write_u16::<LittleEndian>(supported_protocols.len() as u16)?;
        for protocol in supported_protocols {
            payload.write_u16::<LittleEndian>(*protocol)?;
        }
        connection.socket.send_one_datagram(&payload, connection.remote)?;
        connection.connect_request = Some(payload);

        Ok(connection)
    }

    /// Server-side accept, driven by `Server`: the socket is shared with the Server, the
    /// connection transitions directly to Connected.
    pub fn accept(id: ConnectionId, socket: Rc<Socket>, remote: Address, protocol: u16, config: Configuration, log: Logger) -> Connection {
        Connection {
            id,
            socket,
            remote,
            state: ConnectionState::Connected,
            protocol,
            send_queue: MessageQueue::new(),
            recv_queue: MessageQueue::new(),
            next_send: 0,
            next_recv: 0,
            window_size: config.window_size,
            links: Vec::new(),
            link_ids: LinkIdPool::new(),
            connect_request: None,
            connect_elapsed: 0.0,
            connect_since_resend: 0.0,
            config,
            log,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote(&self) -> Address {
        self.remote
    }

    pub fn local_address(&self) -> Address {
        self.socket.local_address()
    }

    pub fn socket_handle(&self) -> Rc<Socket> {
        self.socket.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn protocol(&self) -> u16 {
        self.protocol
    }

    /// Current `LinkState` of a StateLink previously created on this Connection, if it still
    /// exists.
    pub fn link_status(&self, link_id: StateLinkId) -> Option<LinkState> {
        self.links.iter().find(|entry| entry.link.borrow().id() == link_id).map(|entry| entry.link.borrow().link_state())
    }

    /// Number of reliable messages currently awaiting ack (state `Sent`). Never exceeds the
    /// configured send window size.
    pub fn in_flight_count(&self) -> usize {
        self.send_queue.iter().filter(|m| m.state == MessageState::Sent).count()
    }

    fn socket_matches(&self, socket: &Rc<Socket>) -> bool {
        Rc::ptr_eq(&self.socket, socket)
    }

    pub fn matches(&self, socket: &Rc<Socket>, remote: Address) -> bool {
        self.socket_matches(socket) && self.remote == remote
    }

    /// Peer-initiated or local teardown. If Connected, best-effort notifies the peer first.
    pub fn disconnect(&mut self, notify_peer: bool, host: &mut dyn HostHandler) {
        if self.state == ConnectionState::Connected && notify_peer {
            let mut payload = Vec::new();
            frame_header(&mut payload, Command::ConnectionClose);
            let _ = self.socket.send_one_datagram(&payload, self.remote);
        }

        for entry in self.links.drain(..) {
            entry.link.borrow_mut().mark_down();
        }
        self.send_queue.clear();
        self.recv_queue.clear();
        self.state = ConnectionState::Disconnected;

        host.connection_closed(self.id);
    }

    /// Per-tick processing. While Connecting, resends the ConnectionRequest at
    /// `connectResendInterval` and gives up after `connectTimeout` with no ack (spec §7). While
    /// Connected, ages and retransmits timed-out reliables, then flushes dirty StateLinks.
    pub fn process(&mut self, elapsed: Duration, host: &mut dyn HostHandler) -> NetworkResult<()> {
        match self.state {
            ConnectionState::Connecting => self.process_connecting(elapsed, host),
            ConnectionState::Connected => {
                self.retransmit_timed_out(elapsed, host)?;
                self.flush_link_updates()
            }
            ConnectionState::Disconnected => Ok(()),
        }
    }

    fn process_connecting(&mut self, elapsed: Duration, host: &mut dyn HostHandler) -> NetworkResult<()> {
        self.connect_elapsed += elapsed.as_secs_f32();
        if self.connect_elapsed > self.config.connect_timeout {
            slog::warn!(self.log, "connect attempt timed out, no ConnectionAck received");
            self.disconnect(false, host);
            return Ok(());
        }

        self.connect_since_resend += elapsed.as_secs_f32();
        if self.connect_since_resend > self.config.connect_resend_interval {
            self.connect_since_resend = 0.0;
            if let Some(payload) = &self.connect_request {
                self.socket.send_one_datagram(payload, self.remote)?;
            }
        }
        Ok(())
    }

    fn retransmit_timed_out(&mut self, elapsed: Duration, host: &mut dyn HostHandler) -> NetworkResult<()> {
        let timeout = self.config.reliable_timeout;
        let max_retries = self.config.max_reliable_retries;
        let socket = self.socket.clone();
        let remote = self.remote;

        let mut terminate = false;
        for message in self.send_queue.iter_mut() {
            if message.state != MessageState::Sent {
                continue;
            }
            message.age(elapsed);
            if message.seconds_since_sent > timeout {
                if max_retries > 0 && message.retries >= max_retries {
                    terminate = true;
                    break;
                }
                socket.send_one_datagram(&message.packet, remote)?;
                message.mark_retransmitted();
                slog::debug!(self.log, "retransmitted reliable message"; "sequence" => message.sequence);
            }
        }

        if terminate {
            slog::warn!(self.log, "reliable message exceeded max retries, terminating connection"; "connection" => self.id);
            self.disconnect(false, host);
        }
        Ok(())
    }

    fn flush_link_updates(&mut self) -> NetworkResult<()> {
        let dirty_ids: Vec<StateLinkId> = self
            .links
            .iter()
            .filter(|entry| entry.link.borrow().link_state() == LinkState::Up && entry.link.borrow().changed())
            .take(255)
            .map(|entry| entry.link.borrow().id())
            .collect();

        if dirty_ids.is_empty() {
            return Ok(());
        }

        let mut payload = Vec::new();
        frame_header(&mut payload, Command::LinkUpdate);
        payload.write_u8(dirty_ids.len() as u8)?;

        for link_id in &dirty_ids {
            let entry = self.links.iter().find(|entry| entry.link.borrow().id() == *link_id).unwrap();
            payload.write_u16::<LittleEndian>(*link_id)?;
            entry.state.borrow().link_write_values_for(&mut payload, &entry.link)?;
        }

        self.socket.send_one_datagram(&payload, self.remote)?;
        Ok(())
    }

    /// Unreliable send: fire-and-forget.
    pub fn send_message(&self, payload: &[u8]) -> NetworkResult<()> {
        if self.state != ConnectionState::Connected {
            return Err(NetworkError::NotConnected);
        }
        let mut datagram = Vec::with_capacity(payload.len() + 1);
        frame_header(&mut datagram, Command::Message);
        datagram.extend_from_slice(payload);
        self.socket.send_one_datagram(&datagram, self.remote)
    }

    /// Reliable send: assigns the next contiguous sequence number, transmits immediately if inside
    /// the send window.
    pub fn send_reliable_message(&mut self, payload: &[u8]) -> NetworkResult<u16> {
        if self.state != ConnectionState::Connected {
            return Err(NetworkError::NotConnected);
        }

        let sequence = seq::add(self.next_send, self.send_queue.len() as u16);
        let mut datagram = Vec::with_capacity(payload.len() + 3);
        frame_header(&mut datagram, Command::ReliableMessage);
        datagram.write_u16::<LittleEndian>(sequence)?;
        datagram.extend_from_slice(payload);

        self.enqueue_reliable(sequence, datagram)?;
        Ok(sequence)
    }

    fn enqueue_reliable(&mut self, sequence: u16, datagram: Vec<u8>) -> NetworkResult<()> {
        let queue_depth_before = self.send_queue.len();
        let mut message = Message::new(sequence, datagram);

        if queue_depth_before < self.window_size as usize {
            self.socket.send_one_datagram(&message.packet, self.remote)?;
            message.mark_sent();
        }
        self.send_queue.push(message);
        Ok(())
    }

    /// Allocates a fresh StateLink id, enqueues a reliable ReliableLinkState datagram, and
    /// transitions the new link to Listening.
    pub fn link_state(&mut self, state: StateHandle, state_id: StateId, identify: &[u8], read_only: bool) -> NetworkResult<StateLinkId> {
        if self.state != ConnectionState::Connected {
            return Err(NetworkError::NotConnected);
        }

        let value_count = state.borrow().value_count();
        let links = &self.links;
        let in_use = |candidate: StateLinkId| links.iter().any(|entry| entry.link.borrow().id() == candidate);
        let link_id = self.link_ids.allocate(&in_use)?;

        let link = Rc::new(RefCell::new(StateLink::new(link_id, value_count, read_only)));
        state.borrow_mut().register_link(&link);

        let sequence = seq::add(self.next_send, self.send_queue.len() as u16);
        let mut datagram = Vec::new();
        frame_header(&mut datagram, Command::ReliableLinkState);
        datagram.write_u16::<LittleEndian>(sequence)?;
        datagram.write_u16::<LittleEndian>(link_id)?;
        let flags: u8 = if read_only { 1 } else { 0 };
        datagram.write_u8(flags)?;
        datagram.write_u16::<LittleEndian>(identify.len() as u16)?;
        datagram.extend_from_slice(identify);
        state.borrow().link_write_values_with_verify(&mut datagram)?;

        self.enqueue_reliable(sequence, datagram)?;

        link.borrow_mut().begin_listening();
        self.links.push(LinkEntry { link, state, state_id });
        Ok(link_id)
    }

    /// Reads the command byte and routes the remainder of `datagram`. Decode errors on the
    /// datagram body are logged and the datagram is dropped — the connection itself is never torn
    /// down by a malformed frame (spec §7).
    pub fn dispatch(&mut self, datagram: &[u8], host: &mut dyn HostHandler) -> NetworkResult<()> {
        let mut reader = Cursor::new(datagram);
        let command_byte = reader.read_u8()?;
        let command = Command::from_byte(command_byte)?;

        match command {
            Command::ConnectionRequest => {
                slog::warn!(self.log, "ConnectionRequest is only valid against a Server, dropped");
            }
            Command::ConnectionAck => self.on_connection_ack(&mut reader, host)?,
            Command::ConnectionClose => self.disconnect(false, host),
            Command::Message => self.on_unreliable_message(&mut reader, host)?,
            Command::ReliableMessage | Command::ReliableLinkState => {
                self.on_reliable_frame(command_byte, &mut reader, host)?;
            }
            Command::ReliableAck => self.on_reliable_ack(&mut reader)?,
            Command::LinkUp => self.on_link_up(&mut reader)?,
            Command::LinkDown => self.on_link_down(&mut reader)?,
            Command::LinkUpdate => self.on_link_update(&mut reader, host)?,
        }
        Ok(())
    }

    fn on_connection_ack(&mut self, reader: &mut Cursor<&[u8]>, host: &mut dyn HostHandler) -> NetworkResult<()> {
        if self.state != ConnectionState::Connecting {
            return Ok(());
        }
        let result = reader.read_u8()?;
        match result {
            0 => {
                let protocol = reader.read_u16::<LittleEndian>()?;
                self.protocol = protocol;
                self.state = ConnectionState::Connected;
                self.connect_request = None;
                slog::info!(self.log, "connection accepted"; "protocol" => protocol);
            }
            _ => {
                self.state = ConnectionState::Disconnected;
                host.connection_closed(self.id);
            }
        }
        Ok(())
    }

    fn on_unreliable_message(&mut self, reader: &mut Cursor<&[u8]>, host: &mut dyn HostHandler) -> NetworkResult<()> {
        let mut payload = Vec::new();
        reader.read_to_end(&mut payload)?;
        host.message_received(self.id, &payload);
        Ok(())
    }

    /// Shared receive-window bookkeeping for ReliableMessage and ReliableLinkState: accept iff the
    /// sequence lies in `[nextRecv, nextRecv+window)`, ack unconditionally before any dispatch,
    /// then deliver in order, draining consecutive buffered out-of-order frames.
    fn on_reliable_frame(&mut self, command_byte: u8, reader: &mut Cursor<&[u8]>, host: &mut dyn HostHandler) -> NetworkResult<()> {
        let sequence = reader.read_u16::<LittleEndian>()?;
        if !seq::in_window(sequence, self.next_recv, self.window_size) {
            slog::debug!(self.log, "reliable frame outside receive window, dropped"; "sequence" => sequence);
            return Ok(());
        }

        self.send_ack(sequence, AckCode::Success)?;

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest)?;
        // Store as [command_byte] ++ payload so the recv queue (generic MessageQueue) can hold
        // either frame kind and dispatch correctly once it is its turn.
        let mut stored = Vec::with_capacity(rest.len() + 1);
        stored.push(command_byte);
        stored.extend_from_slice(&rest);

        if sequence == self.next_recv {
            self.next_recv = seq::next(self.next_recv);
            self.deliver_reliable(command_byte, &rest, host)?;
            self.drain_ready_buffered(host)?;
        } else if self.recv_queue.find_by_sequence(sequence).is_none() {
            self.recv_queue.push(Message::new(sequence, stored));
        }
        Ok(())
    }

    fn drain_ready_buffered(&mut self, host: &mut dyn HostHandler) -> NetworkResult<()> {
        loop {
            let next = self.next_recv;
            let Some(message) = self.recv_queue.remove_by_sequence(next) else { break };
            let command_byte = message.packet[0];
            let payload = &message.packet[1..];
            self.next_recv = seq::next(self.next_recv);
            self.deliver_reliable(command_byte, payload, host)?;
        }
        Ok(())
    }

    fn deliver_reliable(&mut self, command_byte: u8, payload: &[u8], host: &mut dyn HostHandler) -> NetworkResult<()> {
        match Command::from_byte(command_byte)? {
            Command::ReliableMessage => {
                host.message_received(self.id, payload);
                Ok(())
            }
            Command::ReliableLinkState => self.process_link_state_request(payload, host),
            _ => Err(NetworkError::InvalidProtocolFrame("unexpected command in reliable window")),
        }
    }

    fn send_ack(&self, sequence: u16, code: AckCode) -> NetworkResult<()> {
        let mut datagram = Vec::with_capacity(4);
        frame_header(&mut datagram, Command::ReliableAck);
        datagram.write_u16::<LittleEndian>(sequence)?;
        datagram.write_u8(code as u8)?;
        self.socket.send_one_datagram(&datagram, self.remote)
    }

    fn on_reliable_ack(&mut self, reader: &mut Cursor<&[u8]>) -> NetworkResult<()> {
        let sequence = reader.read_u16::<LittleEndian>()?;
        let code = reader.read_u8()?;
        if code != AckCode::Success as u8 {
            return Ok(());
        }
        if let Some(message) = self.send_queue.find_by_sequence_mut(sequence) {
            message.state = MessageState::Done;
        }

        while matches!(self.send_queue.front().map(|m| m.state), Some(MessageState::Done)) {
            self.send_queue.pop_front();
            self.next_send = seq::next(self.next_send);
            self.promote_pending_into_window()?;
        }
        Ok(())
    }

    fn promote_pending_into_window(&mut self) -> NetworkResult<()> {
        let window = self.window_size as usize;
        let remote = self.remote;
        let socket = self.socket.clone();
        for (depth, message) in self.send_queue.iter_mut().enumerate() {
            if depth >= window {
                break;
            }
            if message.state == MessageState::Pending {
                socket.send_one_datagram(&message.packet, remote)?;
                message.mark_sent();
            }
        }
        Ok(())
    }

    /// LinkState request, receive side (spec §4.6): asks the host for a matching State, verify-
    /// decodes into it, and replies LinkUp on success or LinkDown on any failure.
    fn process_link_state_request(&mut self, payload: &[u8], host: &mut dyn HostHandler) -> NetworkResult<()> {
        let mut reader = Cursor::new(payload);
        let link_id = reader.read_u16::<LittleEndian>()?;
        let flags = reader.read_u8()?;
        let read_only = flags & 1 != 0;
        let msg_len = reader.read_u16::<LittleEndian>()? as usize;
        let mut identify = vec![0u8; msg_len];
        reader.read_exact(&mut identify)?;

        if self.links.iter().any(|entry| {
            entry.link.borrow().id() == link_id && entry.link.borrow().link_state() != LinkState::Down
        }) {
            return self.reply_link_down(link_id);
        }

        let Some(state) = host.link_state(self.id, &identify) else {
            return self.reply_link_down(link_id);
        };

        let verify_result = state.borrow_mut().link_read_and_verify_all_values(&mut reader);
        if verify_result.is_err() {
            return self.reply_link_down(link_id);
        }

        let value_count = state.borrow().value_count();
        let link = Rc::new(RefCell::new(StateLink::new(link_id, value_count, read_only)));
        state.borrow_mut().register_link(&link);
        link.borrow_mut().begin_listening();
        link.borrow_mut().mark_up();

        let state_id = Rc::as_ptr(&state) as usize as StateId;
        self.links.push(LinkEntry { link, state, state_id });

        let mut datagram = Vec::with_capacity(3);
        frame_header(&mut datagram, Command::LinkUp);
        datagram.write_u16::<LittleEndian>(link_id)?;
        self.socket.send_one_datagram(&datagram, self.remote)
    }

    fn reply_link_down(&self, link_id: StateLinkId) -> NetworkResult<()> {
        let mut datagram = Vec::with_capacity(3);
        frame_header(&mut datagram, Command::LinkDown);
        datagram.write_u16::<LittleEndian>(link_id)?;
        self.socket.send_one_datagram(&datagram, self.remote)
    }

    fn on_link_up(&mut self, reader: &mut Cursor<&[u8]>) -> NetworkResult<()> {
        let link_id = reader.read_u16::<LittleEndian>()?;
        if let Some(entry) = self.links.iter().find(|entry| entry.link.borrow().id() == link_id) {
            entry.link.borrow_mut().mark_up();
        }
        Ok(())
    }

    fn on_link_down(&mut self, reader: &mut Cursor<&[u8]>) -> NetworkResult<()> {
        let link_id = reader.read_u16::<LittleEndian>()?;
        if let Some(entry) = self.links.iter().find(|entry| entry.link.borrow().id() == link_id) {
            entry.link.borrow_mut().mark_down();
        }
        Ok(())
    }

    fn on_link_update(&mut self, reader: &mut Cursor<&[u8]>, host: &mut dyn HostHandler) -> NetworkResult<()> {
        let link_count = reader.read_u8()?;
        for _ in 0..link_count {
            let link_id = reader.read_u16::<LittleEndian>()?;
            let entry = match self.links.iter().find(|entry| entry.link.borrow().id() == link_id && entry.link.borrow().link_state() == LinkState::Up) {
                Some(entry) => entry,
                None => {
                    slog::debug!(self.log, "LinkUpdate for unknown or non-Up link, dropped"; "link_id" => link_id);
                    // Values aren't self-delimiting without the link's own schema, so we cannot
                    // skip past this link's run to reach the next one. Any further links packed
                    // into this same datagram are sacrificed even if they're known and Up;
                    // convergence re-sends on the next dirty tick (spec §5), and decode errors are
                    // logged-and-dropped, not connection-fatal (spec §7).
                    return Ok(());
                }
            };
            entry.state.borrow_mut().link_read_values(reader, link_id, host, entry.state_id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHost;
    use crate::value::{IntWidth, Signedness, Value};
    use crate::wire::PROTOCOL_VERSION;
    use flux::logging::discard;

    fn test_config() -> Configuration {
        Configuration { reliable_timeout: 3.0, ..Configuration::default() }
    }

    fn connected_pair() -> (Connection, Connection) {
        let server_socket = Rc::new(Socket::bind(Address::V4 { octets: [127, 0, 0, 1], port: 0 }).unwrap());
        let client_socket = Rc::new(Socket::bind(Address::V4 { octets: [127, 0, 0, 1], port: 0 }).unwrap());

        let client = Connection::accept(1, client_socket.clone(), server_socket.local_address(), PROTOCOL_VERSION, test_config(), discard());
        let server = Connection::accept(2, server_socket.clone(), client_socket.local_address(), PROTOCOL_VERSION, test_config(), discard());
        (client, server)
    }

    #[test]
    fn reliable_send_then_ack_advances_window() {
        let (mut client, mut server) = connected_pair();
        let mut host = NullHost;

        let seq0 = client.send_reliable_message(b"hello").unwrap();
        assert_eq!(seq0, 0);
        assert_eq!(client.send_queue.front().unwrap().state, MessageState::Sent);

        let mut buf = Vec::new();
        server.socket.receive_one_datagram(&mut buf).unwrap();
        server.dispatch(&buf, &mut host).unwrap();

        // server replied with an ack; pump it back into the client
        let mut ack_buf = Vec::new();
        for _ in 0..50 {
            if client.socket.receive_one_datagram(&mut ack_buf).unwrap().is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        client.dispatch(&ack_buf, &mut host).unwrap();

        assert!(client.send_queue.is_empty());
        assert_eq!(client.next_send, 1);
    }

    #[test]
    fn window_allows_at_most_window_size_in_flight() {
        let (mut client, _server) = connected_pair();
        for i in 0..20 {
            client.send_reliable_message(format!("msg{}", i).as_bytes()).unwrap();
        }
        let sent_count = client.send_queue.iter_mut().filter(|m| m.state == MessageState::Sent).count();
        assert_eq!(sent_count, client.window_size as usize);
    }

    #[test]
    fn link_state_allocates_sequential_ids() {
        let (mut client, _server) = connected_pair();
        let state = crate::state::State::new_handle(false);
        state.borrow_mut().add_value(Value::new_integer(IntWidth::W32, Signedness::Signed, 0));
        let id0 = client.link_state(state.clone(), 1, b"demo", false).unwrap();
        let id1 = client.link_state(state, 2, b"demo2", false).unwrap();
        assert_ne!(id0, id1);
    }
}
