//! Latest externally pushed data blob: replay on connect, broadcast on update.

use std::sync::Arc;

use metrics::counter;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::arena::fan_out;
use super::state::RelayCore;
use crate::metrics::RELAY_SNAPSHOT_UPDATES_TOTAL;
use crate::protocol::ServerMessage;
use crate::websocket::connection::ClientConnection;

/// Process-wide cell holding the most recent blob. Absent until the first
/// update, never cleared afterwards.
#[derive(Debug, Default)]
pub struct SharedSnapshot {
    current: Option<Value>,
}

impl SharedSnapshot {
    /// Empty cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored blob.
    pub fn set(&mut self, blob: Value) {
        self.current = Some(blob);
    }

    /// The stored blob, if any.
    pub fn get(&self) -> Option<&Value> {
        self.current.as_ref()
    }

    /// Whether a blob has been stored.
    pub fn is_present(&self) -> bool {
        self.current.is_some()
    }

    fn message(&self) -> Option<ServerMessage> {
        self.get()
            .cloned()
            .map(|data| ServerMessage::MinecraftUpdate { data })
    }
}

impl RelayCore {
    /// Store `blob` and broadcast it to every live connection.
    ///
    /// Returns the number of connections the update was queued for.
    pub fn update(&mut self, blob: Value) -> usize {
        self.snapshot.set(blob);
        counter!(RELAY_SNAPSHOT_UPDATES_TOTAL).increment(1);
        let Some(message) = self.snapshot.message() else {
            return 0;
        };
        let recipients = fan_out(&self.connections.targets(None), &message);
        info!(recipients, "snapshot updated");
        recipients
    }

    /// Admit a new connection to the live set.
    ///
    /// The cached blob, if any, is queued before the connection becomes
    /// visible to any fan-out, so it is the first frame the client sees.
    pub fn on_new_connection(&mut self, connection: Arc<ClientConnection>) {
        if let Some(message) = self.snapshot.message() {
            if connection.send_message(&message) {
                debug!(conn_id = %connection.id, "replayed snapshot");
            } else {
                warn!(conn_id = %connection.id, "failed to replay snapshot");
            }
        }
        if let Some(previous) = self.connections.insert(connection) {
            warn!(conn_id = %previous.id, "connection id reused, replaced stale record");
        }
    }
}
