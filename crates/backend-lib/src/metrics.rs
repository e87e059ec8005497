// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_DISCONNECTION: &str = "ws.disconnection";
pub const WS_ACTIVE: &str = "ws.active";
pub const ROOM_CREATED: &str = "room.created";
pub const ROOM_CLOSED: &str = "room.closed";
pub const ROOM_ACTIVE: &str = "room.active";
pub const ROOM_JOINED: &str = "room.joined";
pub const EVENT_ROUTED: &str = "event.routed";
pub const EVENT_DROPPED: &str = "event.dropped";
pub const HEARTBEAT_REAPED: &str = "heartbeat.reaped";
pub const ATTENDANCE_WRITTEN: &str = "attendance.written";
