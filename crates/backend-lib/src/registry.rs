// ============================
// crates/backend-lib/src/registry.rs
// ============================
//! Connection registry: transport connection id <-> participant id, plus liveness.
//!
//! The registry never touches room membership. Disconnect handling calls it
//! after the room table has been cleaned up.
use liveclass_common::ServerEvent;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

/// Opaque id assigned when a transport connection opens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        ConnectionId(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outbound half of a connection, drained by the socket writer task
pub type Outbound = mpsc::UnboundedSender<ServerEvent>;

/// A live transport session
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    /// Set by the first join on this connection
    pub participant_id: Option<String>,
    pub last_seen: Instant,
    outbound: Outbound,
}

impl Connection {
    /// Queue an event for this connection. Returns false if the writer is gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.outbound.send(event).is_ok()
    }
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    /// participant id -> the connection most recently bound to it
    bound: HashMap<String, ConnectionId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a liveness record for a freshly opened transport
    pub fn register_connection(&mut self, outbound: Outbound) -> ConnectionId {
        self.register_connection_at(outbound, Instant::now())
    }

    pub fn register_connection_at(&mut self, outbound: Outbound, now: Instant) -> ConnectionId {
        let id = ConnectionId::new();
        self.connections.insert(
            id,
            Connection {
                id,
                participant_id: None,
                last_seen: now,
                outbound,
            },
        );
        id
    }

    /// Attach (or overwrite) the participant bound to a connection.
    /// No-op for unknown connections.
    ///
    /// A connection carries one identity at a time. Joining another room under a
    /// different participant id releases the earlier id: room membership made
    /// under it is kept, but signals addressed to it are no longer deliverable
    /// until some connection binds it again.
    pub fn bind_participant(&mut self, connection_id: ConnectionId, participant_id: &str) {
        let Some(connection) = self.connections.get_mut(&connection_id) else {
            return;
        };

        if let Some(previous) = connection.participant_id.replace(participant_id.to_string()) {
            if previous != participant_id && self.bound.get(&previous) == Some(&connection_id) {
                self.bound.remove(&previous);
            }
        }
        self.bound.insert(participant_id.to_string(), connection_id);
    }

    pub fn resolve_participant(&self, connection_id: ConnectionId) -> Option<&str> {
        self.connections
            .get(&connection_id)
            .and_then(|c| c.participant_id.as_deref())
    }

    /// The connection currently bound to a participant, if any
    pub fn resolve_connection(&self, participant_id: &str) -> Option<ConnectionId> {
        self.bound.get(participant_id).copied()
    }

    /// Drop the liveness record. Room membership is not touched.
    pub fn unregister_connection(&mut self, connection_id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(&connection_id)?;
        if let Some(participant_id) = &connection.participant_id {
            if self.bound.get(participant_id) == Some(&connection_id) {
                self.bound.remove(participant_id);
            }
        }
        Some(connection)
    }

    pub fn touch(&mut self, connection_id: ConnectionId) {
        self.touch_at(connection_id, Instant::now());
    }

    pub fn touch_at(&mut self, connection_id: ConnectionId, now: Instant) {
        if let Some(connection) = self.connections.get_mut(&connection_id) {
            connection.last_seen = now;
        }
    }

    /// Connections silent for longer than `timeout` as of `now`
    pub fn stale_connections(&self, now: Instant, timeout: Duration) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|c| now.saturating_duration_since(c.last_seen) > timeout)
            .map(|c| c.id)
            .collect()
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&connection_id)
    }

    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains_key(&connection_id)
    }

    /// Queue an event for one connection; unknown ids are ignored
    pub fn send(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        self.connections
            .get(&connection_id)
            .is_some_and(|c| c.send(event))
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
