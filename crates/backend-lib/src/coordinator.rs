// ============================
// crates/backend-lib/src/coordinator.rs
// ============================
//! The room coordinator and the actor that owns it.
//!
//! All room and connection state lives in one [`Coordinator`] value owned by a
//! single tokio task. Transport code talks to it through a cloneable
//! [`CoordinatorHandle`]; commands are processed strictly one at a time, which
//! is what keeps member counts consistent with the mutation that produced them.
use crate::error::AppError;
use crate::metrics as keys;
use crate::registry::{ConnectionId, ConnectionRegistry, Outbound};
use crate::rooms::RoomTable;
use crate::router::RoutedEvent;
use chrono::Utc;
use liveclass_common::{ClientEvent, RoomSnapshot, ServerEvent};
use metrics::{counter, gauge};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Owned coordinator state: connection registry plus room table
#[derive(Debug)]
pub struct Coordinator {
    pub(crate) registry: ConnectionRegistry,
    pub(crate) rooms: RoomTable,
    heartbeat_timeout: Duration,
}

impl Coordinator {
    pub fn new(heartbeat_timeout: Duration) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            rooms: RoomTable::new(),
            heartbeat_timeout,
        }
    }

    /// Transport opened: allocate a connection id
    pub fn connect(&mut self, outbound: Outbound) -> ConnectionId {
        self.connect_at(outbound, Instant::now())
    }

    pub fn connect_at(&mut self, outbound: Outbound, now: Instant) -> ConnectionId {
        let connection_id = self.registry.register_connection_at(outbound, now);

        counter!(keys::WS_CONNECTION).increment(1);
        gauge!(keys::WS_ACTIVE).set(self.registry.len() as f64);
        tracing::debug!(%connection_id, "Connection registered");

        connection_id
    }

    /// Transport closed or timed out: leave every room, then forget the connection.
    /// Returns false if the connection was already gone.
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> bool {
        if !self.registry.contains(connection_id) {
            return false;
        }

        let departures = self.rooms.disconnect_all(connection_id);
        let routed: Vec<RoutedEvent> = departures
            .into_iter()
            .flat_map(|departure| self.departure_events(departure))
            .collect();
        self.deliver(routed);

        let participant_id = self
            .registry
            .unregister_connection(connection_id)
            .and_then(|c| c.participant_id);

        counter!(keys::WS_DISCONNECTION).increment(1);
        gauge!(keys::WS_ACTIVE).set(self.registry.len() as f64);
        tracing::info!(%connection_id, participant_id = ?participant_id, "Connection closed");

        true
    }

    /// Refresh liveness without routing anything
    pub fn touch(&mut self, connection_id: ConnectionId) {
        self.registry.touch(connection_id);
    }

    /// Force-disconnect connections silent for longer than the heartbeat
    /// timeout, then ping the survivors. Returns the reaped connections.
    pub fn sweep(&mut self, now: Instant) -> Vec<ConnectionId> {
        let stale = self.registry.stale_connections(now, self.heartbeat_timeout);
        for connection_id in &stale {
            tracing::warn!(%connection_id, "Heartbeat timeout, forcing disconnect");
            counter!(keys::HEARTBEAT_REAPED).increment(1);
            self.disconnect(*connection_id);
        }

        let ping = ServerEvent::Ping {
            timestamp: Utc::now(),
        };
        for connection in self.registry.connections() {
            connection.send(ping.clone());
        }

        stale
    }

    pub fn snapshot(&self, room_id: &str) -> Option<RoomSnapshot> {
        self.rooms.snapshot(room_id)
    }

    pub fn snapshots(&self) -> Vec<RoomSnapshot> {
        self.rooms.snapshots()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomTable {
        &self.rooms
    }

    /// Actor loop: process commands until every handle is dropped
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Connect { outbound, resp_tx } => {
                    let connection_id = self.connect(outbound);
                    if resp_tx.send(connection_id).is_err() {
                        // The socket task went away before we answered
                        self.disconnect(connection_id);
                    }
                },
                Command::Dispatch {
                    connection_id,
                    event,
                } => self.dispatch(connection_id, event),
                Command::Touch { connection_id } => self.touch(connection_id),
                Command::Disconnect { connection_id } => {
                    self.disconnect(connection_id);
                },
                Command::Sweep => {
                    self.sweep(Instant::now());
                },
                Command::Snapshot { room_id, resp_tx } => {
                    let _ = resp_tx.send(self.snapshot(&room_id));
                },
                Command::ListRooms { resp_tx } => {
                    let _ = resp_tx.send(self.snapshots());
                },
            }
        }
        tracing::info!("Room coordinator stopped");
    }
}

/// Message sent *into* the coordinator actor
#[derive(Debug)]
pub enum Command {
    Connect {
        outbound: Outbound,
        resp_tx: oneshot::Sender<ConnectionId>,
    },
    Dispatch {
        connection_id: ConnectionId,
        event: ClientEvent,
    },
    Touch {
        connection_id: ConnectionId,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
    Sweep,
    Snapshot {
        room_id: String,
        resp_tx: oneshot::Sender<Option<RoomSnapshot>>,
    },
    ListRooms {
        resp_tx: oneshot::Sender<Vec<RoomSnapshot>>,
    },
}

/// Handle that other components keep
#[derive(Clone, Debug)]
pub struct CoordinatorHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl CoordinatorHandle {
    pub async fn connect(&self, outbound: Outbound) -> Result<ConnectionId, AppError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.cmd_tx.send(Command::Connect { outbound, resp_tx })?;
        Ok(resp_rx.await?)
    }

    pub fn dispatch(&self, connection_id: ConnectionId, event: ClientEvent) -> Result<(), AppError> {
        self.cmd_tx.send(Command::Dispatch {
            connection_id,
            event,
        })?;
        Ok(())
    }

    pub fn touch(&self, connection_id: ConnectionId) -> Result<(), AppError> {
        self.cmd_tx.send(Command::Touch { connection_id })?;
        Ok(())
    }

    pub fn disconnect(&self, connection_id: ConnectionId) -> Result<(), AppError> {
        self.cmd_tx.send(Command::Disconnect { connection_id })?;
        Ok(())
    }

    pub fn sweep(&self) -> Result<(), AppError> {
        self.cmd_tx.send(Command::Sweep)?;
        Ok(())
    }

    pub async fn snapshot(&self, room_id: &str) -> Result<Option<RoomSnapshot>, AppError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.cmd_tx.send(Command::Snapshot {
            room_id: room_id.to_string(),
            resp_tx,
        })?;
        Ok(resp_rx.await?)
    }

    pub async fn rooms(&self) -> Result<Vec<RoomSnapshot>, AppError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.cmd_tx.send(Command::ListRooms { resp_tx })?;
        Ok(resp_rx.await?)
    }
}

/// Spawn the coordinator actor and return its handle.
/// The actor stops once every handle has been dropped.
pub fn spawn_coordinator(heartbeat_timeout: Duration) -> CoordinatorHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let coordinator = Coordinator::new(heartbeat_timeout);

    tokio::spawn(async move {
        coordinator.run(cmd_rx).await;
    });

    CoordinatorHandle { cmd_tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liveclass_common::ServerEvent;

    #[tokio::test]
    async fn test_handle_round_trip() {
        let handle = spawn_coordinator(Duration::from_secs(30));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let conn = handle.connect(tx).await.unwrap();
        handle
            .dispatch(
                conn,
                ClientEvent::JoinRoom {
                    room_id: "r1".to_string(),
                    participant_id: "a".to_string(),
                    display_name: "A".to_string(),
                    is_owner: true,
                    room_name: Some("Algebra".to_string()),
                },
            )
            .unwrap();

        // Commands are processed in order, so the snapshot sees the join
        let snapshot = handle.snapshot("r1").await.unwrap().unwrap();
        assert_eq!(snapshot.room_name, "Algebra");
        assert_eq!(snapshot.owner.as_deref(), Some("a"));

        assert!(matches!(rx.recv().await, Some(ServerEvent::ExistingUsers { users }) if users.is_empty()));

        handle.disconnect(conn).unwrap();
        assert!(handle.snapshot("r1").await.unwrap().is_none());
        assert!(handle.rooms().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_after_dropped_receiver_is_cleaned_up() {
        let handle = spawn_coordinator(Duration::from_secs(30));
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        // The writer side is gone but the connection id is still issued
        let conn = handle.connect(tx).await.unwrap();
        handle.disconnect(conn).unwrap();
        handle.disconnect(conn).unwrap();
        assert!(handle.rooms().await.unwrap().is_empty());
    }

    #[test]
    fn test_sweep_pings_live_connections() {
        let mut coordinator = Coordinator::new(Duration::from_secs(30));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let start = Instant::now();
        let conn = coordinator.connect_at(tx, start);

        let reaped = coordinator.sweep(start + Duration::from_secs(10));
        assert!(reaped.is_empty());
        assert!(matches!(rx.try_recv(), Ok(ServerEvent::Ping { .. })));

        let reaped = coordinator.sweep(start + Duration::from_secs(31));
        assert_eq!(reaped, vec![conn]);
        assert!(coordinator.registry().is_empty());
        // Writer half dropped with the registry entry
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
