//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

use crate::relay::RelayStats;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while the relay hub is running, `"degraded"` once it has stopped.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open WebSocket connections.
    pub connections: usize,
    /// Registered participants.
    pub participants: usize,
    /// Whether a data snapshot has been received.
    pub has_snapshot: bool,
}

/// Build a health response from relay counts; `None` means the hub is gone.
pub fn health_check(start_time: Instant, stats: Option<RelayStats>) -> HealthResponse {
    let status = if stats.is_some() { "ok" } else { "degraded" };
    let stats = stats.unwrap_or_default();
    HealthResponse {
        status: status.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: stats.connections,
        participants: stats.participants,
        has_snapshot: stats.has_snapshot,
    }
}
