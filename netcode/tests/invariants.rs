//! Property-style checks for the invariants of spec.md §8 not already covered by a module's own
//! `#[cfg(test)]` suite (Address round trip: address.rs; Value round trip: value.rs; StateLink
//! dirty-bit propagation: state.rs; modulo-65535 window: seq.rs).

use netcode::host::{ConnectionId, HostHandler};
use netcode::state::StateHandle;
use netcode::{Address, Configuration, ConnectionState, Dispatcher, PROTOCOL_VERSION};
use rand::seq::SliceRandom;
use rand::RngExt;
use std::time::Duration;

#[derive(Default)]
struct OrderRecordingHost {
    delivered: Vec<Vec<u8>>,
}

impl HostHandler for OrderRecordingHost {
    fn message_received(&mut self, _connection: ConnectionId, payload: &[u8]) {
        self.delivered.push(payload.to_vec());
    }

    fn link_state(&mut self, _connection: ConnectionId, _identify: &[u8]) -> Option<StateHandle> {
        None
    }
}

fn connected_pair() -> (Dispatcher, Dispatcher, ConnectionId) {
    let log = flux::logging::discard();
    let mut server = Dispatcher::new(vec![PROTOCOL_VERSION], Configuration::default(), log.clone());
    server.listen(Some(Address::V4 { octets: [127, 0, 0, 1], port: 0 })).unwrap();
    let server_addr = server.server(0).unwrap().local_address();

    let mut client = Dispatcher::new(vec![PROTOCOL_VERSION], Configuration::default(), log);
    let connection_id = client.connect(server_addr).unwrap();

    let mut host = OrderRecordingHost::default();
    for _ in 0..100 {
        client.process(Duration::from_millis(10), &mut host).unwrap();
        server.process(Duration::from_millis(10), &mut host).unwrap();
        if client.connection(connection_id).unwrap().connection_state() == ConnectionState::Connected {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(client.connection(connection_id).unwrap().connection_state(), ConnectionState::Connected);
    (client, server, connection_id)
}

/// Invariant 4: reliable in-order delivery survives any permutation of send-side ordering, since
/// the send window itself enforces contiguous sequence assignment — what actually varies here is
/// how many ticks elapse before each datagram's ack is processed, which reorders when each message
/// becomes eligible to be re-sent into a freed window slot.
#[test]
fn reliable_messages_deliver_in_order_despite_jittered_ack_timing() {
    let (mut client, mut server, connection_id) = connected_pair();
    let mut rng = rand::rng();

    let total = 30usize;
    let payloads: Vec<Vec<u8>> = (0..total).map(|i| format!("msg-{}", i).into_bytes()).collect();
    for payload in &payloads {
        client.connection_mut(connection_id).unwrap().send_reliable_message(payload).unwrap();
    }

    let mut host = OrderRecordingHost::default();
    for _ in 0..2000 {
        if host.delivered.len() >= total {
            break;
        }
        let jitter = rng.random_range(1..8);
        client.process(Duration::from_millis(jitter), &mut host).unwrap();
        server.process(Duration::from_millis(jitter), &mut host).unwrap();
    }

    assert_eq!(host.delivered, payloads, "messages must be delivered in order exactly once");
}

/// Invariant 7 (window half): a receiver at an arbitrary `nextRecv` accepts any permutation of a
/// contiguous in-window run and still delivers it to the host in order.
#[test]
fn out_of_order_window_arrivals_still_deliver_in_order() {
    let (mut client, mut server, connection_id) = connected_pair();
    let mut rng = rand::rng();

    // Drive next_send/next_recv away from zero first, to also exercise wraparound indirectly.
    for i in 0..3 {
        client.connection_mut(connection_id).unwrap().send_reliable_message(format!("warmup-{}", i).as_bytes()).unwrap();
    }
    let mut warmup_host = OrderRecordingHost::default();
    for _ in 0..200 {
        client.process(Duration::from_millis(5), &mut warmup_host).unwrap();
        server.process(Duration::from_millis(5), &mut warmup_host).unwrap();
        if warmup_host.delivered.len() >= 3 {
            break;
        }
    }

    let count = 6usize;
    let payloads: Vec<Vec<u8>> = (0..count).map(|i| format!("seq-{}", i).into_bytes()).collect();
    for payload in &payloads {
        client.connection_mut(connection_id).unwrap().send_reliable_message(payload).unwrap();
    }

    let mut host = OrderRecordingHost::default();
    let mut order: Vec<usize> = (0..20).collect();
    order.shuffle(&mut rng);
    for _ in order {
        client.process(Duration::from_millis(2), &mut host).unwrap();
        server.process(Duration::from_millis(2), &mut host).unwrap();
        if host.delivered.len() >= count {
            break;
        }
    }

    assert_eq!(host.delivered, payloads);
}

/// Invariant 5: at most `windowSize` reliable messages are Sent (awaiting ack) at once, even with
/// a large backlog and no acks arriving.
#[test]
fn send_window_never_exceeds_configured_size() {
    let (mut client, _server, connection_id) = connected_pair();
    let window_size = Configuration::default().window_size as usize;
    for i in 0..50 {
        client.connection_mut(connection_id).unwrap().send_reliable_message(format!("m{}", i).as_bytes()).unwrap();
        // no server processing at all, so no acks ever arrive
        assert!(client.connection(connection_id).unwrap().in_flight_count() <= window_size);
    }
    assert_eq!(client.connection(connection_id).unwrap().in_flight_count(), window_size);
}

/// Invariant 6: repeatedly creating StateLinks of the same State on one Connection never returns
/// an identifier that's still in use (the pool's linear probe must skip every live id).
#[test]
fn link_identifier_allocation_never_reuses_a_live_id() {
    let (mut client, _server, connection_id) = connected_pair();
    let mut live_ids = std::collections::HashSet::new();

    for _ in 0..200 {
        let state = netcode::State::new_handle(false);
        state.borrow_mut().add_value(netcode::Value::new_integer(
            netcode::value::IntWidth::W32,
            netcode::value::Signedness::Signed,
            0,
        ));
        let link_id = client
            .connection_mut(connection_id)
            .unwrap()
            .link_state(state, 1, b"x", false)
            .unwrap();

        assert!(!live_ids.contains(&link_id), "id {} handed out while still live", link_id);
        live_ids.insert(link_id);
    }
}
