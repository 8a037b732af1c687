//! Relay core: connection registry, presence, signaling and snapshot fan-out.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `arena` | Live connection set keyed by [`ConnectionId`], fan-out helper |
//! | `registry` | Connection → participant handle bindings |
//! | `state` | [`RelayCore`]: owns all relay state, classifies inbound frames |
//! | `presence` | `join` / `leave` / disconnect notifications, participant lists |
//! | `signaling` | Targeted forwarding of offer / answer / ICE frames |
//! | `snapshot` | Latest external data blob, replay and broadcast |
//! | `hub` | Single task that owns the [`RelayCore`] and serializes every command |
//!
//! ## Data Flow
//!
//! WebSocket sessions and the HTTP ingestion route talk to the hub through a
//! [`RelayHandle`]. The hub applies each [`RelayCommand`] to the core in arrival
//! order; the core queues outbound frames on per-connection channels without
//! waiting, so one slow peer never delays delivery to the others.

pub mod arena;
pub mod state;
pub mod error;
pub mod hub;
pub mod presence;
pub mod registry;
pub mod signaling;
pub mod snapshot;

use std::fmt;

pub use arena::ConnectionArena;
pub use state::{RelayCore, RelayStats};
pub use error::{RelayClosed, RouteError};
pub use hub::{RelayCommand, RelayHandle};
pub use registry::{ConnectionRegistry, Participant};
pub use snapshot::SharedSnapshot;

/// Stable identity of a live transport connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use serde_json::Value;
    use tokio::sync::mpsc;

    use super::ConnectionId;
    use crate::websocket::connection::ClientConnection;

    /// A connection whose outbound queue the test can read.
    pub struct FakePeer {
        pub conn: Arc<ClientConnection>,
        pub rx: mpsc::Receiver<Arc<String>>,
    }

    impl FakePeer {
        pub fn new(id: u64) -> Self {
            let (tx, rx) = mpsc::channel(64);
            Self {
                conn: Arc::new(ClientConnection::new(ConnectionId(id), tx)),
                rx,
            }
        }

        pub fn id(&self) -> ConnectionId {
            self.conn.id
        }

        /// Everything queued so far, parsed as JSON.
        pub fn drain(&mut self) -> Vec<Value> {
            let mut out = Vec::new();
            while let Ok(text) = self.rx.try_recv() {
                out.push(serde_json::from_str(&text).expect("relay frames are JSON"));
            }
            out
        }

        /// Everything queued so far, as raw text.
        pub fn drain_raw(&mut self) -> Vec<String> {
            let mut out = Vec::new();
            while let Ok(text) = self.rx.try_recv() {
                out.push(text.as_str().to_owned());
            }
            out
        }
    }

    #[test]
    fn connection_id_display() {
        assert_eq!(ConnectionId(42).to_string(), "conn_42");
    }
}
