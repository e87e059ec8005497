// ============================
// crates/backend-lib/src/router.rs
// ============================
//! Event router.
//!
//! Turns one validated client event into zero or more routed server events and
//! delivers them. Membership changes go through [`RoomTable`](crate::rooms::RoomTable)
//! calls only; everything else here is read-only fan-out.
//!
//! Nothing in this module reports failure back to the transport. Unknown
//! rooms, non-members, missing targets and unauthorized controls are all
//! silent no-ops (logged at `debug`).
use crate::coordinator::Coordinator;
use crate::metrics as keys;
use crate::registry::ConnectionId;
use crate::rooms::{Departure, JoinRequest, RoomId};
use chrono::{DateTime, Utc};
use liveclass_common::{ClientEvent, ServerEvent};
use metrics::counter;
use uuid::Uuid;

/// Who receives a routed event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every current member of the room
    Room(RoomId),
    /// Every current member except the sender
    RoomExcept(RoomId, ConnectionId),
    /// One connection
    Connection(ConnectionId),
}

/// A server event paired with its recipients; never stored
#[derive(Debug, Clone)]
pub struct RoutedEvent {
    pub target: Target,
    pub event: ServerEvent,
}

impl RoutedEvent {
    fn new(target: Target, event: ServerEvent) -> Self {
        Self { target, event }
    }
}

impl Coordinator {
    /// Handle one event from a connection. Events from unknown connections
    /// (already reaped or closed) are ignored.
    pub fn dispatch(&mut self, connection_id: ConnectionId, event: ClientEvent) {
        if !self.registry.contains(connection_id) {
            tracing::debug!(%connection_id, event = event.name(), "Event from unknown connection ignored");
            return;
        }
        self.registry.touch(connection_id);

        let routed = self.route(connection_id, event, Utc::now());
        self.deliver(routed);
    }

    pub(crate) fn route(
        &mut self,
        sender: ConnectionId,
        event: ClientEvent,
        now: DateTime<Utc>,
    ) -> Vec<RoutedEvent> {
        match event {
            ClientEvent::JoinRoom {
                room_id,
                participant_id,
                display_name,
                is_owner,
                room_name,
            } => self.on_join(
                sender,
                JoinRequest {
                    room_id,
                    participant_id,
                    display_name,
                    is_owner,
                    room_name,
                },
                now,
            ),

            ClientEvent::LeaveRoom { room_id } => match self.rooms.leave(&room_id, sender) {
                Some(departure) => {
                    tracing::info!(
                        room_id = %departure.room_id,
                        participant_id = %departure.participant.participant_id,
                        remaining = departure.snapshot.total_users(),
                        "Participant left"
                    );
                    self.departure_events(departure)
                },
                None => {
                    tracing::debug!(%sender, %room_id, "Leave for a room the connection is not in");
                    Vec::new()
                },
            },

            ClientEvent::Signal { to, from, signal } => {
                let from = self
                    .registry
                    .resolve_participant(sender)
                    .map(str::to_string)
                    .unwrap_or(from);
                match self.registry.resolve_connection(&to) {
                    Some(target) => vec![RoutedEvent::new(
                        Target::Connection(target),
                        ServerEvent::Signal { signal, from },
                    )],
                    None => {
                        tracing::debug!(%sender, %to, "Signal target not connected, dropped");
                        Vec::new()
                    },
                }
            },

            ClientEvent::ToggleMedia {
                room_id,
                kind,
                enabled,
            } => match self.rooms.set_media_flag(&room_id, sender, kind, enabled) {
                Some(participant_id) => vec![RoutedEvent::new(
                    Target::RoomExcept(room_id, sender),
                    ServerEvent::UserMediaUpdated {
                        participant_id,
                        kind,
                        enabled,
                    },
                )],
                None => self.not_a_member(sender, &room_id, "toggle-media"),
            },

            ClientEvent::SendMessage {
                room_id,
                message,
                user_name,
                ..
            } => {
                let Some(participant) = self.rooms.member(&room_id, sender) else {
                    return self.not_a_member(sender, &room_id, "send-message");
                };
                if message.trim().is_empty() {
                    return Vec::new();
                }
                let event = ServerEvent::NewMessage {
                    id: Uuid::new_v4().to_string(),
                    user_name: name_or(&participant.display_name, user_name),
                    message,
                    timestamp: now,
                    is_educator: participant.is_owner,
                };
                vec![RoutedEvent::new(Target::Room(room_id), event)]
            },

            ClientEvent::RaiseHand { room_id, user_name } => {
                let Some(participant) = self.rooms.member(&room_id, sender) else {
                    return self.not_a_member(sender, &room_id, "raise-hand");
                };
                let event = ServerEvent::HandRaised {
                    participant_id: participant.participant_id.clone(),
                    user_name: name_or(&participant.display_name, user_name),
                    timestamp: now,
                };
                vec![RoutedEvent::new(Target::RoomExcept(room_id, sender), event)]
            },

            ClientEvent::EducatorControl {
                room_id,
                action,
                target_user_id,
                value,
            } => {
                if !self.rooms.is_owner(&room_id, sender) {
                    tracing::debug!(%sender, %room_id, ?action, "Control from non-owner ignored");
                    return Vec::new();
                }
                match self.rooms.find_member(&room_id, &target_user_id) {
                    Some(target) => {
                        tracing::info!(%room_id, target = %target_user_id, ?action, "Owner control relayed");
                        vec![RoutedEvent::new(
                            Target::Connection(target),
                            ServerEvent::EducatorAction { action, value },
                        )]
                    },
                    None => {
                        tracing::debug!(%room_id, target = %target_user_id, "Control target not in room");
                        Vec::new()
                    },
                }
            },

            ClientEvent::StartScreenShare { room_id } => {
                self.on_screen_share(sender, room_id, true)
            },
            ClientEvent::StopScreenShare { room_id } => {
                self.on_screen_share(sender, room_id, false)
            },

            ClientEvent::GetRoomInfo { room_id } => {
                let event = match self.rooms.snapshot(&room_id) {
                    Some(snapshot) => ServerEvent::RoomInfo(snapshot),
                    None => ServerEvent::RoomNotFound { room_id },
                };
                vec![RoutedEvent::new(Target::Connection(sender), event)]
            },

            // Liveness was refreshed by `dispatch`
            ClientEvent::Pong(_) => Vec::new(),
        }
    }

    fn on_join(
        &mut self,
        sender: ConnectionId,
        request: JoinRequest,
        now: DateTime<Utc>,
    ) -> Vec<RoutedEvent> {
        let outcome = match self.rooms.join(sender, request, now) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(%sender, error = %e, "Join rejected");
                return Vec::new();
            },
        };
        let participant = outcome.participant;
        self.registry
            .bind_participant(sender, &participant.participant_id);

        for orphan in &outcome.orphaned {
            tracing::debug!(
                orphan = %orphan,
                participant_id = %participant.participant_id,
                "Duplicate join superseded an older connection"
            );
        }
        tracing::info!(
            room_id = %outcome.snapshot.room_id,
            participant_id = %participant.participant_id,
            connection_id = %sender,
            total_users = outcome.snapshot.total_users(),
            "Participant joined"
        );

        let room_id = outcome.snapshot.room_id.clone();
        let existing = outcome
            .snapshot
            .members
            .iter()
            .filter(|m| m.participant_id != participant.participant_id)
            .cloned()
            .collect();

        vec![
            RoutedEvent::new(
                Target::Connection(sender),
                ServerEvent::ExistingUsers { users: existing },
            ),
            RoutedEvent::new(
                Target::RoomExcept(room_id.clone(), sender),
                ServerEvent::UserConnected {
                    participant_id: participant.participant_id,
                    display_name: participant.display_name,
                    is_owner: participant.is_owner,
                },
            ),
            RoutedEvent::new(
                Target::Room(room_id),
                ServerEvent::room_update(&outcome.snapshot),
            ),
        ]
    }

    fn on_screen_share(
        &mut self,
        sender: ConnectionId,
        room_id: RoomId,
        sharing: bool,
    ) -> Vec<RoutedEvent> {
        let Some(participant) = self.rooms.set_screen_sharing(&room_id, sender, sharing) else {
            return self.not_a_member(sender, &room_id, "screen-share");
        };
        let event = if sharing {
            ServerEvent::ScreenShareStarted {
                participant_id: participant.participant_id,
                display_name: participant.display_name,
            }
        } else {
            ServerEvent::ScreenShareStopped {
                participant_id: participant.participant_id,
                display_name: participant.display_name,
            }
        };
        vec![RoutedEvent::new(Target::RoomExcept(room_id, sender), event)]
    }

    /// `user-disconnected` + `room-update` for the members left behind
    pub(crate) fn departure_events(&self, departure: Departure) -> Vec<RoutedEvent> {
        if departure.room_closed {
            return Vec::new();
        }
        vec![
            RoutedEvent::new(
                Target::Room(departure.room_id.clone()),
                ServerEvent::UserDisconnected {
                    participant_id: departure.participant.participant_id,
                    display_name: departure.participant.display_name,
                },
            ),
            RoutedEvent::new(
                Target::Room(departure.room_id),
                ServerEvent::room_update(&departure.snapshot),
            ),
        ]
    }

    fn not_a_member(&self, sender: ConnectionId, room_id: &str, event: &str) -> Vec<RoutedEvent> {
        tracing::debug!(%sender, %room_id, event, "Sender is not a member of the room, dropped");
        Vec::new()
    }

    /// Fan routed events out to their recipients' outbound channels
    pub(crate) fn deliver(&self, routed: Vec<RoutedEvent>) {
        for RoutedEvent { target, event } in routed {
            let recipients = match target {
                Target::Room(room_id) => self.rooms.member_connections(&room_id),
                Target::RoomExcept(room_id, except) => {
                    let mut members = self.rooms.member_connections(&room_id);
                    members.retain(|c| *c != except);
                    members
                },
                Target::Connection(connection_id) => vec![connection_id],
            };

            for connection_id in recipients {
                if self.registry.send(connection_id, event.clone()) {
                    counter!(keys::EVENT_ROUTED).increment(1);
                } else {
                    tracing::debug!(%connection_id, "Recipient writer closed, event dropped");
                }
            }
        }
    }
}

/// The member record's name; the client-supplied copy only when the record has none
fn name_or(recorded: &str, fallback: String) -> String {
    if recorded.trim().is_empty() {
        fallback
    } else {
        recorded.to_string()
    }
}
