//! The hub task: sole owner of the [`RelayCore`].
//!
//! Sessions and HTTP handlers never touch relay state directly. They send a
//! [`RelayCommand`] through a [`RelayHandle`] and the hub applies commands one
//! at a time, in arrival order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::ConnectionId;
use super::error::RelayClosed;
use super::state::{RelayCore, RelayStats};
use crate::websocket::connection::ClientConnection;

/// A unit of work for the hub.
pub enum RelayCommand {
    /// A transport connection opened.
    Open(Arc<ClientConnection>),
    /// A text frame arrived on a connection.
    Inbound {
        /// Sending connection.
        conn: ConnectionId,
        /// Frame payload.
        text: String,
    },
    /// A transport connection closed.
    Close(ConnectionId),
    /// A new data blob was pushed.
    Update(Value),
    /// Report current counts.
    Stats(oneshot::Sender<RelayStats>),
}

/// Cloneable front door to the hub.
#[derive(Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<RelayCommand>,
    next_id: Arc<AtomicU64>,
}

impl RelayHandle {
    /// Issue a fresh connection ID.
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Admit a connection; any cached blob is replayed to it first.
    pub async fn open(&self, connection: Arc<ClientConnection>) -> Result<(), RelayClosed> {
        self.send(RelayCommand::Open(connection)).await
    }

    /// Hand an inbound text frame to the hub.
    pub async fn inbound(&self, conn: ConnectionId, text: String) -> Result<(), RelayClosed> {
        self.send(RelayCommand::Inbound { conn, text }).await
    }

    /// Report a closed transport.
    pub async fn close(&self, conn: ConnectionId) -> Result<(), RelayClosed> {
        self.send(RelayCommand::Close(conn)).await
    }

    /// Publish a new data blob to every connection.
    pub async fn update(&self, blob: Value) -> Result<(), RelayClosed> {
        self.send(RelayCommand::Update(blob)).await
    }

    /// Fetch current counts.
    pub async fn stats(&self) -> Result<RelayStats, RelayClosed> {
        let (tx, rx) = oneshot::channel();
        self.send(RelayCommand::Stats(tx)).await?;
        rx.await.map_err(|_| RelayClosed)
    }

    async fn send(&self, command: RelayCommand) -> Result<(), RelayClosed> {
        self.tx.send(command).await.map_err(|_| RelayClosed)
    }
}

/// Spawn the hub with a command queue of `capacity`.
///
/// The hub stops when `cancel` fires or every handle is dropped.
pub fn spawn(
    core: RelayCore,
    capacity: usize,
    cancel: CancellationToken,
) -> (RelayHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = RelayHandle {
        tx,
        next_id: Arc::new(AtomicU64::new(1)),
    };
    let task = tokio::spawn(run(core, rx, cancel));
    (handle, task)
}

/// Apply commands until cancelled or the queue closes.
pub async fn run(
    mut core: RelayCore,
    mut rx: mpsc::Receiver<RelayCommand>,
    cancel: CancellationToken,
) {
    info!("relay hub started");
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("relay hub cancelled");
                break;
            }
            command = rx.recv() => {
                let Some(command) = command else { break };
                apply(&mut core, command);
            }
        }
    }
    info!(connections = core.connections().len(), "relay hub stopped");
}

fn apply(core: &mut RelayCore, command: RelayCommand) {
    match command {
        RelayCommand::Open(connection) => core.on_new_connection(connection),
        RelayCommand::Inbound { conn, text } => core.dispatch(conn, &text),
        RelayCommand::Close(conn) => core.on_transport_close(conn),
        RelayCommand::Update(blob) => {
            let _ = core.update(blob);
        }
        RelayCommand::Stats(reply) => {
            let _ = reply.send(core.stats());
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::relay::test_support::FakePeer;

    fn start() -> (RelayHandle, JoinHandle<()>, CancellationToken) {
        let cancel = CancellationToken::new();
        let (handle, task) = spawn(RelayCore::new(), 16, cancel.clone());
        (handle, task, cancel)
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let (handle, _task, _cancel) = start();
        let a = handle.next_connection_id();
        let b = handle.clone().next_connection_id();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn commands_apply_in_order() {
        let (handle, _task, _cancel) = start();
        let mut c1 = FakePeer::new(1);
        let mut c2 = FakePeer::new(2);
        handle.open(c1.conn.clone()).await.unwrap();
        handle.open(c2.conn.clone()).await.unwrap();
        handle
            .inbound(c1.id(), r#"{"type":"join","gamertag":"alice"}"#.into())
            .await
            .unwrap();
        handle.update(json!({"tick": 1})).await.unwrap();
        handle.close(c1.id()).await.unwrap();

        let stats = handle.stats().await.unwrap();
        assert_eq!(
            stats,
            RelayStats {
                connections: 1,
                participants: 0,
                has_snapshot: true
            }
        );

        let kinds: Vec<_> = c2.drain().iter().map(|f| f["type"].clone()).collect();
        assert_eq!(kinds, vec![json!("join"), json!("minecraft-update"), json!("leave")]);
        let kinds: Vec<_> = c1.drain().iter().map(|f| f["type"].clone()).collect();
        assert_eq!(kinds, vec![json!("participants-list"), json!("minecraft-update")]);
    }

    #[tokio::test]
    async fn stops_on_cancel() {
        let (handle, task, cancel) = start();
        cancel.cancel();
        task.await.unwrap();
        assert_eq!(handle.stats().await, Err(RelayClosed));
        assert_eq!(handle.update(json!(null)).await, Err(RelayClosed));
    }

    #[tokio::test]
    async fn stops_when_handles_dropped() {
        let (handle, task, _cancel) = start();
        drop(handle);
        task.await.unwrap();
    }
}
