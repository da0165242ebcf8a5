//! The host application is an external collaborator (spec §6.3): it creates servers, connections
//! and states and receives these callbacks. Modeled as a trait object threaded explicitly through
//! `Dispatcher::process`/`Connection::dispatch` rather than stored inside the networking objects
//! themselves, so a `Connection`/`State` never needs a back-reference to something that can
//! outlive or destroy it mid-callback.

use crate::state::StateHandle;

pub type ConnectionId = usize;
pub type StateId = u64;

/// One implementation per embedding application. Every method has a default no-op (or, where a
/// return value decides core behavior, a conservative default) so a host only overrides the
/// callbacks it cares about.
pub trait HostHandler {
    /// A Server accepted a new client connection.
    fn client_connected(&mut self, _connection: ConnectionId) {}

    /// An unreliable or reliable application message was delivered, in order, to this connection.
    fn message_received(&mut self, _connection: ConnectionId, _payload: &[u8]) {}

    /// A peer requested a link to a State identified by `identify`. Returning `Some(state)`
    /// accepts the link (provided verify-decoding also succeeds); `None` rejects it with LinkDown.
    fn link_state(&mut self, _connection: ConnectionId, _identify: &[u8]) -> Option<StateHandle> {
        None
    }

    /// The connection was torn down, locally or by the peer. The core has already released its
    /// own resources for this connection before the callback fires — the host may destroy
    /// whatever it associated with `connection` without the core touching it afterwards.
    fn connection_closed(&mut self, _connection: ConnectionId) {}

    /// A remotely-driven change to a replicated State's value has been applied.
    fn state_value_changed(&mut self, _state: StateId, _value_index: usize) {}
}

/// A `HostHandler` that ignores every callback — useful for tests and for ticking a Dispatcher
/// with no embedding application attached.
pub struct NullHost;

impl HostHandler for NullHost {}
