//! WebSocket connection state and the per-socket session task.

pub mod connection;
pub mod session;
