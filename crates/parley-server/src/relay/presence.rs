//! Presence: join / leave notifications and participant lists.
//!
//! Notifications go to the live connection set, registered or not, so a
//! client that has not joined yet still sees who is around.

use tracing::{debug, info};

use super::ConnectionId;
use super::arena::fan_out;
use super::state::RelayCore;
use crate::protocol::ServerMessage;

impl RelayCore {
    /// Register `conn` as `handle`, tell everyone else, then send the joiner
    /// the roster (which already includes it).
    pub fn on_join(&mut self, conn: ConnectionId, handle: String) {
        if let Some(previous) = self.registry.put(conn, handle.clone()) {
            debug!(conn_id = %conn, previous = %previous, handle = %handle, "re-join overwrote handle");
        }

        let notified = fan_out(
            &self.connections.targets(Some(conn)),
            &ServerMessage::Join {
                gamertag: handle.clone(),
            },
        );
        info!(conn_id = %conn, handle = %handle, notified, "participant joined");

        self.send_participants(conn);
    }

    /// Explicit `leave` from `conn`. Everyone but the sender is notified; the
    /// connection itself stays open and may join again.
    pub fn on_leave(&mut self, conn: ConnectionId) {
        let Some(participant) = self.registry.remove(conn) else {
            debug!(conn_id = %conn, "leave from unregistered connection");
            return;
        };
        let notified = fan_out(
            &self.connections.targets(Some(conn)),
            &ServerMessage::Leave {
                gamertag: participant.handle.clone(),
            },
        );
        info!(conn_id = %conn, handle = %participant.handle, notified, "participant left");
    }

    /// Transport close for `conn`. The connection leaves the live set first,
    /// so the leave notice reaches every remaining connection exactly once.
    pub fn on_disconnect(&mut self, conn: ConnectionId) {
        let _ = self.connections.remove(conn);
        let Some(participant) = self.registry.remove(conn) else {
            debug!(conn_id = %conn, "unregistered connection closed");
            return;
        };
        let notified = fan_out(
            &self.connections.targets(None),
            &ServerMessage::Leave {
                gamertag: participant.handle.clone(),
            },
        );
        info!(conn_id = %conn, handle = %participant.handle, notified, "participant disconnected");
    }

    /// Reply to `request-participants` with the current roster.
    pub fn on_participants_request(&mut self, conn: ConnectionId) {
        self.send_participants(conn);
    }

    fn send_participants(&self, conn: ConnectionId) {
        let Some(target) = self.connections.get(conn) else {
            return;
        };
        let list = self.registry.snapshot();
        let count = list.len();
        let _ = fan_out(
            std::slice::from_ref(target),
            &ServerMessage::ParticipantsList { list },
        );
        debug!(conn_id = %conn, count, "sent participants list");
    }
}
