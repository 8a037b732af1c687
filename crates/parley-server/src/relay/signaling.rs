//! Targeted forwarding of WebRTC signaling frames.
//!
//! The relay reads only `from` and `to`. The frame is delivered to the
//! recipient exactly as the sender wrote it.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use super::ConnectionId;
use super::error::RouteError;
use super::state::RelayCore;
use crate::metrics::{RELAY_SIGNALS_DROPPED_TOTAL, RELAY_SIGNALS_FORWARDED_TOTAL};
use crate::protocol::SignalMessage;

impl RelayCore {
    /// Deliver `msg` to the connection registered under `msg.to`.
    ///
    /// Returns the recipient on success. When several connections share the
    /// handle, the earliest joiner wins.
    pub fn route(&self, msg: &SignalMessage) -> Result<ConnectionId, RouteError> {
        let Some(to) = msg.to.as_deref() else {
            return Err(RouteError::MissingField {
                kind: msg.kind,
                field: "to",
            });
        };
        if msg.from.is_none() {
            return Err(RouteError::MissingField {
                kind: msg.kind,
                field: "from",
            });
        }

        let target = self
            .registry
            .find_by_handle(to)
            .ok_or_else(|| RouteError::UnknownRecipient { to: to.to_owned() })?;

        let unavailable = || RouteError::RecipientUnavailable { to: to.to_owned() };
        let conn = self.connections.get(target).ok_or_else(unavailable)?;
        if !conn.is_open() || !conn.send(Arc::clone(&msg.raw)) {
            return Err(unavailable());
        }
        Ok(target)
    }

    /// Route a signaling frame from `sender`, recording the outcome.
    pub(super) fn forward(&self, sender: ConnectionId, msg: &SignalMessage) {
        match self.route(msg) {
            Ok(target) => {
                counter!(RELAY_SIGNALS_FORWARDED_TOTAL).increment(1);
                debug!(
                    conn_id = %sender,
                    kind = %msg.kind,
                    from = msg.from.as_deref().unwrap_or_default(),
                    to = msg.to.as_deref().unwrap_or_default(),
                    target = %target,
                    "forwarded signal"
                );
            }
            Err(e) => {
                counter!(RELAY_SIGNALS_DROPPED_TOTAL, "reason" => e.reason()).increment(1);
                warn!(conn_id = %sender, kind = %msg.kind, error = %e, "dropping signal");
            }
        }
    }
}
