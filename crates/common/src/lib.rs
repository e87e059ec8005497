// ================
// crates/common/src/lib.rs
// ================
//! Wire types shared between the live-class clients and the room coordinator.
//!
//! Every frame on the WebSocket is one JSON object of the form
//! `{"event": "<kebab-case-name>", "data": { ...camelCase fields... }}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which local media track a participant toggled
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

/// Owner-only actions relayed to a single participant
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Mute,
    Remove,
}

/// Events sent from a client to the coordinator
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    /// Enter a room, creating it when this is the first member
    JoinRoom {
        room_id: String,
        #[serde(alias = "userId")]
        participant_id: String,
        #[serde(default, alias = "userName")]
        display_name: String,
        #[serde(default, alias = "isEducator")]
        is_owner: bool,
        #[serde(default)]
        room_name: Option<String>,
    },
    LeaveRoom {
        room_id: String,
    },
    /// Opaque WebRTC offer/answer/ICE payload for one peer
    Signal {
        to: String,
        #[serde(default)]
        from: String,
        signal: serde_json::Value,
    },
    ToggleMedia {
        room_id: String,
        #[serde(rename = "type")]
        kind: MediaKind,
        enabled: bool,
    },
    SendMessage {
        room_id: String,
        message: String,
        #[serde(default)]
        user_name: String,
        #[serde(default)]
        is_educator: bool,
    },
    RaiseHand {
        room_id: String,
        #[serde(default)]
        user_name: String,
    },
    EducatorControl {
        room_id: String,
        action: ControlAction,
        target_user_id: String,
        #[serde(default)]
        value: serde_json::Value,
    },
    StartScreenShare {
        room_id: String,
    },
    StopScreenShare {
        room_id: String,
    },
    GetRoomInfo {
        room_id: String,
    },
    /// Heartbeat reply to [`ServerEvent::Ping`]
    ///
    /// `data` may be absent, `null` or `{}`; its content is ignored.
    Pong(Option<serde_json::Value>),
}

impl ClientEvent {
    /// Event name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom { .. } => "join-room",
            ClientEvent::LeaveRoom { .. } => "leave-room",
            ClientEvent::Signal { .. } => "signal",
            ClientEvent::ToggleMedia { .. } => "toggle-media",
            ClientEvent::SendMessage { .. } => "send-message",
            ClientEvent::RaiseHand { .. } => "raise-hand",
            ClientEvent::EducatorControl { .. } => "educator-control",
            ClientEvent::StartScreenShare { .. } => "start-screen-share",
            ClientEvent::StopScreenShare { .. } => "stop-screen-share",
            ClientEvent::GetRoomInfo { .. } => "get-room-info",
            ClientEvent::Pong(_) => "pong",
        }
    }
}

/// Public view of one room member
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub participant_id: String,
    pub display_name: String,
    pub is_owner: bool,
    pub joined_at: DateTime<Utc>,
    pub video_enabled: bool,
    pub audio_enabled: bool,
    pub screen_sharing: bool,
}

/// Read-only picture of a room at one instant
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: String,
    pub room_name: String,
    pub created_at: DateTime<Utc>,
    /// Participant id of the recorded owner, if one is connected
    pub owner: Option<String>,
    pub members: Vec<MemberView>,
}

impl RoomSnapshot {
    pub fn total_users(&self) -> usize {
        self.members.len()
    }
}

/// Events sent from the coordinator to a client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Sent only to a new joiner: everyone already in the room
    ExistingUsers {
        users: Vec<MemberView>,
    },
    RoomUpdate {
        total_users: usize,
        users: Vec<MemberView>,
        room_name: String,
    },
    UserConnected {
        participant_id: String,
        display_name: String,
        is_owner: bool,
    },
    UserDisconnected {
        participant_id: String,
        display_name: String,
    },
    Signal {
        signal: serde_json::Value,
        from: String,
    },
    UserMediaUpdated {
        participant_id: String,
        #[serde(rename = "type")]
        kind: MediaKind,
        enabled: bool,
    },
    NewMessage {
        id: String,
        user_name: String,
        message: String,
        timestamp: DateTime<Utc>,
        is_educator: bool,
    },
    HandRaised {
        participant_id: String,
        user_name: String,
        timestamp: DateTime<Utc>,
    },
    EducatorAction {
        action: ControlAction,
        value: serde_json::Value,
    },
    ScreenShareStarted {
        participant_id: String,
        display_name: String,
    },
    ScreenShareStopped {
        participant_id: String,
        display_name: String,
    },
    RoomInfo(RoomSnapshot),
    RoomNotFound {
        room_id: String,
    },
    Ping {
        timestamp: DateTime<Utc>,
    },
}

impl ServerEvent {
    /// Build the `room-update` broadcast for a snapshot
    pub fn room_update(snapshot: &RoomSnapshot) -> Self {
        ServerEvent::RoomUpdate {
            total_users: snapshot.total_users(),
            users: snapshot.members.clone(),
            room_name: snapshot.room_name.clone(),
        }
    }
}
