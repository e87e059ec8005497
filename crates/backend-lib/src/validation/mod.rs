// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Boundary validation for client events.
//!
//! Anything that fails here is dropped by the socket loop with a log line;
//! the client never sees an error frame.

use liveclass_common::ClientEvent;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

const MAX_ID_LENGTH: usize = 128;
const MAX_DISPLAY_NAME_LENGTH: usize = 100;
const MAX_MESSAGE_LENGTH: usize = 4000;

static CONTROL_CHARS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x1f\x7f]").expect("static regex"));

/// Possible validation errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid room ID: {0}")]
    InvalidRoomId(String),

    #[error("Invalid participant ID: {0}")]
    InvalidParticipantId(String),

    #[error("Invalid display name: {0}")]
    InvalidDisplayName(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

fn check_identifier(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err("must not be empty".to_string());
    }
    if value.chars().count() > MAX_ID_LENGTH {
        return Err(format!("must be at most {MAX_ID_LENGTH} characters"));
    }
    if CONTROL_CHARS_REGEX.is_match(value) {
        return Err("must not contain control characters".to_string());
    }
    Ok(())
}

/// Validate a room ID
pub fn validate_room_id(room_id: &str) -> ValidationResult<&str> {
    check_identifier(room_id).map_err(ValidationError::InvalidRoomId)?;
    Ok(room_id)
}

/// Validate a participant ID (also used for signaling and control targets)
pub fn validate_participant_id(participant_id: &str) -> ValidationResult<&str> {
    check_identifier(participant_id).map_err(ValidationError::InvalidParticipantId)?;
    Ok(participant_id)
}

/// Validate a display name. Empty is allowed and replaced later.
pub fn validate_display_name(name: &str) -> ValidationResult<&str> {
    if name.chars().count() > MAX_DISPLAY_NAME_LENGTH {
        return Err(ValidationError::InvalidDisplayName(format!(
            "must be at most {MAX_DISPLAY_NAME_LENGTH} characters"
        )));
    }
    if CONTROL_CHARS_REGEX.is_match(name) {
        return Err(ValidationError::InvalidDisplayName(
            "must not contain control characters".to_string(),
        ));
    }
    Ok(name)
}

/// Validate a chat message body
pub fn validate_chat_message(message: &str) -> ValidationResult<&str> {
    if message.trim().is_empty() {
        return Err(ValidationError::InvalidMessage(
            "message must not be blank".to_string(),
        ));
    }
    if message.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(ValidationError::InvalidMessage(format!(
            "message must be at most {MAX_MESSAGE_LENGTH} characters"
        )));
    }
    Ok(message)
}

/// Validates a client event
pub fn validate_client_event(event: &ClientEvent) -> ValidationResult<()> {
    match event {
        ClientEvent::JoinRoom {
            room_id,
            participant_id,
            display_name,
            room_name,
            ..
        } => {
            validate_room_id(room_id)?;
            validate_participant_id(participant_id)?;
            validate_display_name(display_name)?;
            if let Some(name) = room_name {
                validate_display_name(name)?;
            }
        },
        ClientEvent::LeaveRoom { room_id }
        | ClientEvent::ToggleMedia { room_id, .. }
        | ClientEvent::StartScreenShare { room_id }
        | ClientEvent::StopScreenShare { room_id }
        | ClientEvent::GetRoomInfo { room_id } => {
            validate_room_id(room_id)?;
        },
        ClientEvent::Signal { to, .. } => {
            validate_participant_id(to)?;
        },
        ClientEvent::SendMessage {
            room_id,
            message,
            user_name,
            ..
        } => {
            validate_room_id(room_id)?;
            validate_chat_message(message)?;
            validate_display_name(user_name)?;
        },
        ClientEvent::RaiseHand { room_id, user_name } => {
            validate_room_id(room_id)?;
            validate_display_name(user_name)?;
        },
        ClientEvent::EducatorControl {
            room_id,
            target_user_id,
            ..
        } => {
            validate_room_id(room_id)?;
            validate_participant_id(target_user_id)?;
        },
        ClientEvent::Pong(_) => {},
    }

    Ok(())
}
