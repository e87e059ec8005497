// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Room/session coordinator for the live-class WebSocket server.

pub mod attendance;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod registry;
pub mod rooms;
pub mod router;
pub mod validation;
pub mod ws_router;

use crate::attendance::{AttendanceSink, FlatFileAttendance, NullAttendance};
use crate::config::Settings;
use crate::coordinator::{spawn_coordinator, CoordinatorHandle};
use crate::error::AppError;
use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Handle to the room coordinator actor
    pub coordinator: CoordinatorHandle,
    /// Settings the process was started with
    pub settings: Arc<Settings>,
    /// Attendance backend
    pub attendance: Arc<dyn AttendanceSink>,
}

impl AppState {
    /// Spawn the coordinator and open the attendance store.
    /// Must be called inside a tokio runtime.
    pub fn new(settings: Settings) -> Result<Self, AppError> {
        let attendance: Arc<dyn AttendanceSink> = if settings.attendance.enabled {
            Arc::new(FlatFileAttendance::new(&settings.attendance.path)?)
        } else {
            Arc::new(NullAttendance)
        };
        Ok(Self::with_attendance(settings, attendance))
    }

    /// Same as [`AppState::new`] with an explicit attendance backend
    pub fn with_attendance(settings: Settings, attendance: Arc<dyn AttendanceSink>) -> Self {
        let coordinator = spawn_coordinator(settings.heartbeat.timeout());
        Self {
            coordinator,
            settings: Arc::new(settings),
            attendance,
        }
    }
}
