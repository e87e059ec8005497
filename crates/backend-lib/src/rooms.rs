// ============================
// crates/backend-lib/src/rooms.rs
// ============================
//! Room table and membership transitions.
//!
//! A room exists in the table if and only if it has at least one member. It is
//! created by the first join and removed by the leave that empties it, inside
//! the same call.
use crate::error::AppError;
use crate::metrics as keys;
use crate::registry::ConnectionId;
use chrono::{DateTime, Utc};
use liveclass_common::{MediaKind, MemberView, RoomSnapshot};
use metrics::{counter, gauge};
use std::collections::HashMap;

pub type RoomId = String;

const ANONYMOUS: &str = "Anonymous";

/// A logical room member bound to one connection
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub participant_id: String,
    pub display_name: String,
    /// Role flag supplied at join; only the room's recorded owner may issue controls
    pub is_owner: bool,
    pub joined_at: DateTime<Utc>,
    pub video_enabled: bool,
    pub audio_enabled: bool,
    pub screen_sharing: bool,
}

impl Participant {
    pub fn view(&self) -> MemberView {
        MemberView {
            participant_id: self.participant_id.clone(),
            display_name: self.display_name.clone(),
            is_owner: self.is_owner,
            joined_at: self.joined_at,
            video_enabled: self.video_enabled,
            audio_enabled: self.audio_enabled,
            screen_sharing: self.screen_sharing,
        }
    }
}

#[derive(Debug)]
struct Member {
    connection_id: ConnectionId,
    participant: Participant,
}

/// A named realtime session. Members are kept in join order.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    name: String,
    created_at: DateTime<Utc>,
    owner: Option<ConnectionId>,
    members: Vec<Member>,
}

impl Room {
    fn new(id: &str, name: Option<String>, now: DateTime<Utc>) -> Self {
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| id.to_string());
        Self {
            id: id.to_string(),
            name,
            created_at: now,
            owner: None,
            members: Vec::new(),
        }
    }

    fn member(&self, connection_id: ConnectionId) -> Option<&Participant> {
        self.members
            .iter()
            .find(|m| m.connection_id == connection_id)
            .map(|m| &m.participant)
    }

    fn member_mut(&mut self, connection_id: ConnectionId) -> Option<&mut Participant> {
        self.members
            .iter_mut()
            .find(|m| m.connection_id == connection_id)
            .map(|m| &mut m.participant)
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id.clone(),
            room_name: self.name.clone(),
            created_at: self.created_at,
            owner: self
                .owner
                .and_then(|owner| self.member(owner))
                .map(|p| p.participant_id.clone()),
            members: self.members.iter().map(|m| m.participant.view()).collect(),
        }
    }
}

/// Caller identity and room metadata for a join
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub room_id: RoomId,
    pub participant_id: String,
    pub display_name: String,
    pub is_owner: bool,
    pub room_name: Option<String>,
}

#[derive(Debug)]
pub struct JoinOutcome {
    pub room_created: bool,
    pub participant: Participant,
    /// Connections whose entry this join replaced. They stay registered until
    /// they disconnect or the heartbeat sweep reaps them.
    pub orphaned: Vec<ConnectionId>,
    pub snapshot: RoomSnapshot,
}

/// Result of one member leaving one room
#[derive(Debug)]
pub struct Departure {
    pub room_id: RoomId,
    pub participant: Participant,
    /// Remaining membership; empty when the room was closed
    pub snapshot: RoomSnapshot,
    pub room_closed: bool,
}

/// Single source of truth for who is in which room
#[derive(Debug, Default)]
pub struct RoomTable {
    rooms: HashMap<RoomId, Room>,
}

impl RoomTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room if it is absent.
    ///
    /// A second join under the same participant id replaces the earlier entry
    /// at its position instead of merging with it.
    pub fn join(
        &mut self,
        connection_id: ConnectionId,
        request: JoinRequest,
        now: DateTime<Utc>,
    ) -> Result<JoinOutcome, AppError> {
        if request.room_id.trim().is_empty() {
            return Err(AppError::InvalidInput("room id must not be empty".to_string()));
        }
        if request.participant_id.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "participant id must not be empty".to_string(),
            ));
        }

        let room_created = !self.rooms.contains_key(&request.room_id);
        let room = self
            .rooms
            .entry(request.room_id.clone())
            .or_insert_with(|| Room::new(&request.room_id, request.room_name.clone(), now));

        let display_name = if request.display_name.trim().is_empty() {
            ANONYMOUS.to_string()
        } else {
            request.display_name.trim().to_string()
        };
        let participant = Participant {
            participant_id: request.participant_id.clone(),
            display_name,
            is_owner: request.is_owner,
            joined_at: now,
            video_enabled: true,
            audio_enabled: true,
            screen_sharing: false,
        };

        let supersedes = |m: &Member| {
            m.participant.participant_id == request.participant_id || m.connection_id == connection_id
        };
        let position = room.members.iter().position(supersedes);
        let mut replaced = Vec::new();
        room.members.retain(|m| {
            if supersedes(m) {
                replaced.push(m.connection_id);
                false
            } else {
                true
            }
        });
        room.members.insert(
            position.unwrap_or(room.members.len()),
            Member {
                connection_id,
                participant: participant.clone(),
            },
        );

        if room.owner.is_some_and(|owner| replaced.contains(&owner)) {
            room.owner = Some(connection_id);
        }
        if room.owner.is_none() && request.is_owner {
            room.owner = Some(connection_id);
        }

        let snapshot = room.snapshot();
        let orphaned: Vec<ConnectionId> = replaced
            .into_iter()
            .filter(|c| *c != connection_id)
            .collect();

        if room_created {
            counter!(keys::ROOM_CREATED).increment(1);
            gauge!(keys::ROOM_ACTIVE).set(self.rooms.len() as f64);
            tracing::info!(room_id = %request.room_id, room_name = %snapshot.room_name, "Room created");
        }
        counter!(keys::ROOM_JOINED).increment(1);

        Ok(JoinOutcome {
            room_created,
            participant,
            orphaned,
            snapshot,
        })
    }

    /// Remove a connection from one room. `None` if it was not a member.
    pub fn leave(&mut self, room_id: &str, connection_id: ConnectionId) -> Option<Departure> {
        let room = self.rooms.get_mut(room_id)?;
        let index = room
            .members
            .iter()
            .position(|m| m.connection_id == connection_id)?;
        let member = room.members.remove(index);
        if room.owner == Some(connection_id) {
            room.owner = None;
        }

        let snapshot = room.snapshot();
        let room_closed = room.members.is_empty();
        if room_closed {
            self.rooms.remove(room_id);
            counter!(keys::ROOM_CLOSED).increment(1);
            gauge!(keys::ROOM_ACTIVE).set(self.rooms.len() as f64);
            tracing::info!(room_id = %room_id, "Room closed");
        }

        Some(Departure {
            room_id: room_id.to_string(),
            participant: member.participant,
            snapshot,
            room_closed,
        })
    }

    /// Apply `leave` to every room the connection is a member of
    pub fn disconnect_all(&mut self, connection_id: ConnectionId) -> Vec<Departure> {
        let mut room_ids: Vec<RoomId> = self
            .rooms
            .values()
            .filter(|room| room.member(connection_id).is_some())
            .map(|room| room.id.clone())
            .collect();
        room_ids.sort();

        room_ids
            .iter()
            .filter_map(|room_id| self.leave(room_id, connection_id))
            .collect()
    }

    /// Flip one media flag; returns the participant id for fan-out
    pub fn set_media_flag(
        &mut self,
        room_id: &str,
        connection_id: ConnectionId,
        kind: MediaKind,
        enabled: bool,
    ) -> Option<String> {
        let participant = self.rooms.get_mut(room_id)?.member_mut(connection_id)?;
        match kind {
            MediaKind::Video => participant.video_enabled = enabled,
            MediaKind::Audio => participant.audio_enabled = enabled,
        }
        Some(participant.participant_id.clone())
    }

    pub fn set_screen_sharing(
        &mut self,
        room_id: &str,
        connection_id: ConnectionId,
        sharing: bool,
    ) -> Option<Participant> {
        let participant = self.rooms.get_mut(room_id)?.member_mut(connection_id)?;
        participant.screen_sharing = sharing;
        Some(participant.clone())
    }

    pub fn member(&self, room_id: &str, connection_id: ConnectionId) -> Option<&Participant> {
        self.rooms.get(room_id)?.member(connection_id)
    }

    /// Whether the connection is the room's recorded owner
    pub fn is_owner(&self, room_id: &str, connection_id: ConnectionId) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|room| room.owner == Some(connection_id))
    }

    /// Connection of the member with this participant id, within one room
    pub fn find_member(&self, room_id: &str, participant_id: &str) -> Option<ConnectionId> {
        self.rooms
            .get(room_id)?
            .members
            .iter()
            .find(|m| m.participant.participant_id == participant_id)
            .map(|m| m.connection_id)
    }

    pub fn member_connections(&self, room_id: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room_id)
            .map(|room| room.members.iter().map(|m| m.connection_id).collect())
            .unwrap_or_default()
    }

    pub fn snapshot(&self, room_id: &str) -> Option<RoomSnapshot> {
        self.rooms.get(room_id).map(Room::snapshot)
    }

    /// Snapshots of every active room, ordered by room id
    pub fn snapshots(&self) -> Vec<RoomSnapshot> {
        let mut snapshots: Vec<RoomSnapshot> = self.rooms.values().map(Room::snapshot).collect();
        snapshots.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        snapshots
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
