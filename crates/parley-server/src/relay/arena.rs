//! Live connection set and fan-out to connected WebSocket clients.

use std::collections::BTreeMap;
use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use super::ConnectionId;
use crate::metrics::WS_BROADCAST_DROPS_TOTAL;
use crate::protocol::ServerMessage;
use crate::websocket::connection::ClientConnection;

/// Every open transport connection, registered or not, keyed by ID.
#[derive(Default)]
pub struct ConnectionArena {
    connections: BTreeMap<ConnectionId, Arc<ClientConnection>>,
}

impl ConnectionArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. Returns the record it replaced, if any.
    pub fn insert(&mut self, connection: Arc<ClientConnection>) -> Option<Arc<ClientConnection>> {
        self.connections.insert(connection.id, connection)
    }

    /// Remove a connection by ID.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.remove(&id)
    }

    /// Look up a connection.
    pub fn get(&self, id: ConnectionId) -> Option<&Arc<ClientConnection>> {
        self.connections.get(&id)
    }

    /// Whether `id` is in the live set.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connections are live.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Copy of the current recipients, optionally leaving one out.
    pub fn targets(&self, exclude: Option<ConnectionId>) -> Vec<Arc<ClientConnection>> {
        self.connections
            .values()
            .filter(|c| Some(c.id) != exclude)
            .cloned()
            .collect()
    }
}

/// Serialize `message` once and queue it on every open target.
///
/// Closed targets are skipped, full queues drop the message. Returns the
/// number of connections the message was queued for.
pub fn fan_out(targets: &[Arc<ClientConnection>], message: &ServerMessage) -> usize {
    let json = match message.encode() {
        Ok(j) => j,
        Err(e) => {
            warn!(kind = message.kind(), error = %e, "failed to serialize message");
            return 0;
        }
    };
    let mut delivered = 0;
    for conn in targets {
        if !conn.is_open() {
            continue;
        }
        if conn.send(Arc::clone(&json)) {
            delivered += 1;
        } else {
            counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
            warn!(conn_id = %conn.id, kind = message.kind(), total_drops = conn.drop_count(), "failed to queue message (channel full)");
        }
    }
    debug!(
        kind = message.kind(),
        targets = targets.len(),
        delivered,
        "fan-out"
    );
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::test_support::FakePeer;
    use tokio::sync::mpsc;

    fn join(handle: &str) -> ServerMessage {
        ServerMessage::Join {
            gamertag: handle.into(),
        }
    }

    #[test]
    fn insert_and_remove() {
        let mut arena = ConnectionArena::new();
        let peer = FakePeer::new(1);
        assert!(arena.insert(peer.conn.clone()).is_none());
        assert_eq!(arena.len(), 1);
        assert!(arena.contains(peer.id()));
        assert!(arena.remove(peer.id()).is_some());
        assert!(arena.is_empty());
    }

    #[test]
    fn remove_nonexistent_connection() {
        let mut arena = ConnectionArena::new();
        assert!(arena.remove(ConnectionId(9)).is_none());
        assert!(arena.remove(ConnectionId(9)).is_none());
        assert_eq!(arena.len(), 0);
    }

    #[test]
    fn insert_same_id_replaces() {
        let mut arena = ConnectionArena::new();
        let first = FakePeer::new(1);
        let second = FakePeer::new(1);
        let _ = arena.insert(first.conn.clone());
        let replaced = arena.insert(second.conn.clone());
        assert!(replaced.is_some_and(|c| Arc::ptr_eq(&c, &first.conn)));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn targets_exclude() {
        let mut arena = ConnectionArena::new();
        let a = FakePeer::new(1);
        let b = FakePeer::new(2);
        let c = FakePeer::new(3);
        for p in [&a, &b, &c] {
            let _ = arena.insert(p.conn.clone());
        }
        let ids: Vec<_> = arena.targets(Some(b.id())).iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![ConnectionId(1), ConnectionId(3)]);
        assert_eq!(arena.targets(None).len(), 3);
    }

    #[test]
    fn fan_out_reaches_every_target() {
        let mut a = FakePeer::new(1);
        let mut b = FakePeer::new(2);
        let delivered = fan_out(&[a.conn.clone(), b.conn.clone()], &join("alice"));
        assert_eq!(delivered, 2);
        assert_eq!(a.drain()[0]["gamertag"], "alice");
        assert_eq!(b.drain()[0]["type"], "join");
    }

    #[test]
    fn fan_out_skips_closed() {
        let mut open = FakePeer::new(1);
        let (tx, rx) = mpsc::channel(4);
        let closed = Arc::new(ClientConnection::new(ConnectionId(2), tx));
        drop(rx);

        let delivered = fan_out(&[closed.clone(), open.conn.clone()], &join("alice"));
        assert_eq!(delivered, 1);
        assert_eq!(open.drain().len(), 1);
        // Closed peers are skipped, not counted as drops
        assert_eq!(closed.drop_count(), 0);
    }

    #[test]
    fn full_queue_does_not_block_others() {
        let (tx, _rx) = mpsc::channel(1);
        let slow = Arc::new(ClientConnection::new(ConnectionId(1), tx));
        assert!(slow.send(Arc::new("backlog".into())));
        let mut fast = FakePeer::new(2);

        let delivered = fan_out(&[slow.clone(), fast.conn.clone()], &join("alice"));
        assert_eq!(delivered, 1);
        assert_eq!(slow.drop_count(), 1);
        assert_eq!(fast.drain().len(), 1);
    }

    #[test]
    fn fan_out_to_nobody() {
        assert_eq!(fan_out(&[], &join("alice")), 0);
    }
}
