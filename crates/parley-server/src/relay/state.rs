//! [`RelayCore`]: the state every relay operation reads and mutates.
//!
//! The core is plain data with synchronous methods. It is owned by exactly one
//! task (see [`super::hub`]) so no operation observes a half-applied update.

use metrics::counter;
use serde::Serialize;
use tracing::{debug, warn};

use super::ConnectionId;
use super::arena::ConnectionArena;
use super::registry::ConnectionRegistry;
use super::snapshot::SharedSnapshot;
use crate::metrics::RELAY_MALFORMED_MESSAGES_TOTAL;
use crate::protocol::ClientMessage;

/// Point-in-time counts for health reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    /// Open transport connections.
    pub connections: usize,
    /// Registered participants.
    pub participants: usize,
    /// Whether a data blob has been received.
    pub has_snapshot: bool,
}

/// Live connections, participant bindings and the cached data blob.
#[derive(Default)]
pub struct RelayCore {
    pub(super) connections: ConnectionArena,
    pub(super) registry: ConnectionRegistry,
    pub(super) snapshot: SharedSnapshot,
}

impl RelayCore {
    /// Empty relay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Live connection set.
    pub fn connections(&self) -> &ConnectionArena {
        &self.connections
    }

    /// Participant bindings.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Cached data blob.
    pub fn snapshot(&self) -> &SharedSnapshot {
        &self.snapshot
    }

    /// Current counts.
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            connections: self.connections.len(),
            participants: self.registry.len(),
            has_snapshot: self.snapshot.is_present(),
        }
    }

    /// Classify one inbound text frame from `conn` and apply it.
    ///
    /// Malformed frames are logged and dropped; the connection stays open.
    pub fn dispatch(&mut self, conn: ConnectionId, text: &str) {
        if !self.connections.contains(conn) {
            debug!(conn_id = %conn, "frame from connection not in live set, ignoring");
            return;
        }

        let message = match ClientMessage::parse(text) {
            Ok(m) => m,
            Err(e) => {
                counter!(RELAY_MALFORMED_MESSAGES_TOTAL).increment(1);
                warn!(conn_id = %conn, error = %e, "dropping malformed message");
                return;
            }
        };

        match message {
            ClientMessage::Join { handle } => self.on_join(conn, handle),
            ClientMessage::Leave => self.on_leave(conn),
            ClientMessage::Signal(signal) => self.forward(conn, &signal),
            ClientMessage::Heartbeat => {}
            ClientMessage::RequestParticipants => self.on_participants_request(conn),
            ClientMessage::Unknown(kind) => {
                debug!(conn_id = %conn, kind = %kind, "ignoring unknown message type");
            }
        }
    }

    /// The transport for `conn` closed, whatever the cause.
    pub fn on_transport_close(&mut self, conn: ConnectionId) {
        self.on_disconnect(conn);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::relay::test_support::FakePeer;

    fn connected(core: &mut RelayCore, id: u64) -> FakePeer {
        let peer = FakePeer::new(id);
        core.on_new_connection(peer.conn.clone());
        peer
    }

    #[test]
    fn stats_reflect_state() {
        let mut core = RelayCore::new();
        assert_eq!(core.stats(), RelayStats::default());

        let a = connected(&mut core, 1);
        let _b = connected(&mut core, 2);
        core.dispatch(a.id(), r#"{"type":"join","gamertag":"alice"}"#);
        let _ = core.update(json!({}));

        assert_eq!(
            core.stats(),
            RelayStats {
                connections: 2,
                participants: 1,
                has_snapshot: true
            }
        );
    }

    #[test]
    fn malformed_frames_change_nothing() {
        let mut core = RelayCore::new();
        let mut a = connected(&mut core, 1);
        let mut b = connected(&mut core, 2);
        core.dispatch(b.id(), r#"{"type":"join","gamertag":"bob"}"#);
        let _ = a.drain();
        let _ = b.drain();

        for frame in [
            "not json",
            "42",
            r#"{"no":"type"}"#,
            r#"{"type":"join"}"#,
            r#"{"type":"join","gamertag":null}"#,
        ] {
            core.dispatch(a.id(), frame);
        }

        assert!(a.drain().is_empty());
        assert!(b.drain().is_empty());
        assert_eq!(core.registry().snapshot(), vec!["bob"]);
        assert!(core.connections().contains(a.id()));
    }

    #[test]
    fn heartbeat_and_unknown_are_silent() {
        let mut core = RelayCore::new();
        let mut a = connected(&mut core, 1);
        let mut b = connected(&mut core, 2);
        core.dispatch(a.id(), r#"{"type":"heartbeat"}"#);
        core.dispatch(a.id(), r#"{"type":"emote","name":"wave"}"#);
        assert!(a.drain().is_empty());
        assert!(b.drain().is_empty());
    }

    #[test]
    fn frames_from_unknown_connection_are_ignored() {
        let mut core = RelayCore::new();
        let mut a = connected(&mut core, 1);
        core.dispatch(ConnectionId(99), r#"{"type":"join","gamertag":"ghost"}"#);
        assert!(core.registry().is_empty());
        assert!(a.drain().is_empty());
    }

    #[test]
    fn frames_after_close_are_ignored() {
        let mut core = RelayCore::new();
        let a = connected(&mut core, 1);
        let mut b = connected(&mut core, 2);
        core.on_transport_close(a.id());
        core.dispatch(a.id(), r#"{"type":"join","gamertag":"late"}"#);
        assert!(core.registry().is_empty());
        assert!(b.drain().is_empty());
    }
}
