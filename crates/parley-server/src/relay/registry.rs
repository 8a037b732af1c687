//! Connection → participant handle bindings.
//!
//! Entries are kept in join order: the first `put` for a connection fixes its
//! position, later `put`s for the same connection overwrite the handle in
//! place. Handles are not unique; two connections may register the same
//! handle and [`ConnectionRegistry::find_by_handle`] then returns the earlier
//! one.

use super::ConnectionId;

/// A registered participant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Participant {
    /// The connection the handle is bound to.
    pub connection: ConnectionId,
    /// Human-readable handle (the `gamertag`).
    pub handle: String,
}

/// Registered participants, at most one entry per connection.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: Vec<Participant>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `connection` to `handle`, overwriting any existing binding for
    /// that connection. Returns the previous handle.
    pub fn put(&mut self, connection: ConnectionId, handle: String) -> Option<String> {
        if let Some(entry) = self.entries.iter_mut().find(|p| p.connection == connection) {
            return Some(std::mem::replace(&mut entry.handle, handle));
        }
        self.entries.push(Participant { connection, handle });
        None
    }

    /// Remove the binding for `connection`. No-op when absent.
    pub fn remove(&mut self, connection: ConnectionId) -> Option<Participant> {
        let idx = self.entries.iter().position(|p| p.connection == connection)?;
        Some(self.entries.remove(idx))
    }

    /// First connection registered under `handle`.
    pub fn find_by_handle(&self, handle: &str) -> Option<ConnectionId> {
        self.entries
            .iter()
            .find(|p| p.handle == handle)
            .map(|p| p.connection)
    }

    /// All current handles in join order.
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.iter().map(|p| p.handle.clone()).collect()
    }

    /// Number of registered participants.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nobody is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
