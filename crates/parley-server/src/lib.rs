//! # parley-server
//!
//! Real-time relay for peer-to-peer voice sessions.
//!
//! - Connection registry binding live WebSocket connections to participant handles
//! - Presence fan-out (`join` / `leave`) and participant-list snapshots
//! - Targeted forwarding of WebRTC signaling (`offer`, `answer`, `ice-candidate`)
//! - Replay + broadcast of the latest externally pushed data snapshot
//! - Axum HTTP surface: `/ws`, `POST /minecraft-data`, `/health`, `/metrics`, static files
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod websocket;
