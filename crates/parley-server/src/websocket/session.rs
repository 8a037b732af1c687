//! WebSocket session lifecycle: handles a single connected client from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::relay::{ConnectionId, RelayHandle};

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the connection with the relay hub (cached snapshot is replayed)
/// 2. Forwards text frames, and UTF-8 binary frames, to the hub
/// 3. Writes queued outbound frames to the socket
/// 4. Sends periodic Ping frames and disconnects silent clients
/// 5. Reports the close to the hub exactly once
#[instrument(skip_all, fields(conn_id = %conn_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    conn_id: ConnectionId,
    relay: RelayHandle,
    config: Arc<ServerConfig>,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(config.send_queue_capacity.max(1));
    let connection = Arc::new(ClientConnection::new(conn_id, send_tx));

    if relay.open(Arc::clone(&connection)).await.is_err() {
        warn!("relay hub stopped, refusing connection");
        let _ = ws_tx.send(Message::Close(None)).await;
        return;
    }

    let connection_start = Instant::now();
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    // Outbound writer with periodic Ping frames.
    let outbound_conn = Arc::clone(&connection);
    let outbound_cancel = cancel.clone();
    let ping_every = config.heartbeat_interval();
    let timeout = config.heartbeat_timeout();
    let mut outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(ping_every);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if peer_timed_out(&outbound_conn, timeout) {
                        warn!(idle = ?outbound_conn.idle_for(), "client unresponsive, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                () = outbound_cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let msg = match frame {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        debug!(error = %e, "websocket read error");
                        break;
                    }
                    None => break,
                };
                connection.mark_alive();
                if let Message::Close(_) = msg {
                    info!("client sent close frame");
                    break;
                }
                let Some(text) = inbound_text(&msg) else { continue };
                if relay.inbound(conn_id, text).await.is_err() {
                    warn!("relay hub stopped, closing session");
                    break;
                }
            }
            _ = &mut outbound => {
                debug!("outbound writer finished");
                break;
            }
        }
    }

    // Clean up
    outbound.abort();
    if relay.close(conn_id).await.is_err() {
        debug!("relay hub already stopped");
    }
    info!(dropped = connection.drop_count(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
}

/// Extract the payload of a data frame. Binary frames are accepted when they
/// hold UTF-8 text; control frames yield nothing.
fn inbound_text(msg: &Message) -> Option<String> {
    match msg {
        Message::Text(t) => Some(t.to_string()),
        Message::Binary(data) => {
            if let Ok(s) = std::str::from_utf8(data) {
                Some(s.to_owned())
            } else {
                debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                None
            }
        }
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
    }
}

/// Whether a peer has missed a whole ping cycle and been silent past `timeout`.
fn peer_timed_out(connection: &ClientConnection, timeout: Duration) -> bool {
    !connection.check_alive() && connection.idle_for() > timeout
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(4);
        (ClientConnection::new(ConnectionId(1), tx), rx)
    }

    #[test]
    fn text_frames_pass_through() {
        let msg = Message::Text(r#"{"type":"heartbeat"}"#.into());
        assert_eq!(inbound_text(&msg).as_deref(), Some(r#"{"type":"heartbeat"}"#));
    }

    #[test]
    fn utf8_binary_frames_are_text() {
        let msg = Message::Binary(br#"{"type":"leave"}"#.to_vec().into());
        assert_eq!(inbound_text(&msg).as_deref(), Some(r#"{"type":"leave"}"#));
    }

    #[test]
    fn invalid_binary_and_control_frames_are_skipped() {
        assert!(inbound_text(&Message::Binary(vec![0xff, 0xfe].into())).is_none());
        assert!(inbound_text(&Message::Ping(Vec::new().into())).is_none());
        assert!(inbound_text(&Message::Pong(Vec::new().into())).is_none());
        assert!(inbound_text(&Message::Close(None)).is_none());
    }

    #[test]
    fn fresh_peer_is_not_timed_out() {
        let (conn, _rx) = connection();
        assert!(!peer_timed_out(&conn, Duration::ZERO));
    }

    #[test]
    fn silent_peer_times_out_after_missed_cycle() {
        let (conn, _rx) = connection();
        // First cycle consumes the initial alive flag
        assert!(!peer_timed_out(&conn, Duration::ZERO));
        std::thread::sleep(Duration::from_millis(5));
        assert!(peer_timed_out(&conn, Duration::ZERO));
    }

    #[test]
    fn activity_within_timeout_keeps_peer() {
        let (conn, _rx) = connection();
        let _ = conn.check_alive();
        // Missed a cycle, but idle time is below the timeout
        assert!(!peer_timed_out(&conn, Duration::from_secs(60)));
        conn.mark_alive();
        assert!(!peer_timed_out(&conn, Duration::ZERO));
    }
}
