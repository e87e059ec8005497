// ============================
// crates/backend-lib/src/lifecycle.rs
// ============================
//! Background timers: heartbeat sweep and attendance snapshots.
use crate::attendance::{AttendanceRecord, AttendanceSink};
use crate::config::Settings;
use crate::coordinator::CoordinatorHandle;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Owns the periodic tasks that drive the coordinator between client events
pub struct SessionLifecycle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionLifecycle {
    /// Spawn the heartbeat task, plus the attendance task when enabled
    pub fn start(
        coordinator: CoordinatorHandle,
        settings: &Settings,
        attendance: Arc<dyn AttendanceSink>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(heartbeat_task(
            coordinator.clone(),
            settings.heartbeat.interval(),
            shutdown_rx.clone(),
        )));

        if settings.attendance.enabled {
            tasks.push(tokio::spawn(attendance_task(
                coordinator,
                attendance,
                Duration::from_secs(settings.attendance.interval_secs),
                shutdown_rx,
            )));
        }

        tracing::info!(
            heartbeat_secs = settings.heartbeat.interval_secs,
            attendance = settings.attendance.enabled,
            "Session lifecycle started"
        );

        Self { shutdown_tx, tasks }
    }

    /// Stop every timer and wait for the tasks to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Lifecycle task failed");
            }
        }
        tracing::info!("Session lifecycle stopped");
    }
}

async fn heartbeat_task(
    coordinator: CoordinatorHandle,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if coordinator.sweep().is_err() {
                    tracing::warn!("Coordinator gone, stopping heartbeat");
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }
}

async fn attendance_task(
    coordinator: CoordinatorHandle,
    sink: Arc<dyn AttendanceSink>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshots = match coordinator.rooms().await {
                    Ok(snapshots) => snapshots,
                    Err(e) => {
                        tracing::warn!(error = %e, "Coordinator gone, stopping attendance");
                        break;
                    },
                };

                let recorded_at = Utc::now();
                for snapshot in snapshots.iter().filter(|s| !s.members.is_empty()) {
                    let record = AttendanceRecord::from_snapshot(snapshot, recorded_at);
                    if let Err(e) = sink.record(&record).await {
                        tracing::warn!(room_id = %snapshot.room_id, error = %e, "Failed to record attendance");
                    }
                }
            },
            _ = shutdown.changed() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::FlatFileAttendance;
    use crate::coordinator::spawn_coordinator;
    use liveclass_common::{ClientEvent, ServerEvent};
    use tokio::sync::mpsc;

    fn settings(attendance: bool) -> Settings {
        let mut settings = Settings::default();
        settings.heartbeat.interval_secs = 5;
        settings.heartbeat.max_missed = 2;
        settings.attendance.enabled = attendance;
        settings.attendance.interval_secs = 60;
        settings
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_pings_then_reaps_silent_connection() {
        let settings = settings(false);
        let handle = spawn_coordinator(settings.heartbeat.timeout());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = handle.connect(tx).await.unwrap();
        handle
            .dispatch(
                conn,
                ClientEvent::JoinRoom {
                    room_id: "r1".to_string(),
                    participant_id: "quiet".to_string(),
                    display_name: "Quiet".to_string(),
                    is_owner: false,
                    room_name: None,
                },
            )
            .unwrap();
        assert!(matches!(rx.recv().await, Some(ServerEvent::ExistingUsers { .. })));
        assert!(matches!(rx.recv().await, Some(ServerEvent::RoomUpdate { .. })));

        let lifecycle = SessionLifecycle::start(handle.clone(), &settings, Arc::new(crate::attendance::NullAttendance));

        // First sweep at 5s only pings
        assert!(matches!(rx.recv().await, Some(ServerEvent::Ping { .. })));
        assert!(handle.snapshot("r1").await.unwrap().is_some());

        // Never answered: gone once silence exceeds 10s, and the room closes with it
        assert!(matches!(rx.recv().await, Some(ServerEvent::Ping { .. })));
        assert_eq!(rx.recv().await, None);
        assert!(handle.snapshot("r1").await.unwrap().is_none());

        lifecycle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_attendance_snapshots_are_recorded() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let sink = Arc::new(FlatFileAttendance::new(temp_dir.path()).unwrap());
        let mut settings = settings(true);
        // Keep the heartbeat out of the way
        settings.heartbeat.interval_secs = 3600;

        let handle = spawn_coordinator(settings.heartbeat.timeout());
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = handle.connect(tx).await.unwrap();
        handle
            .dispatch(
                conn,
                ClientEvent::JoinRoom {
                    room_id: "bio".to_string(),
                    participant_id: "teacher".to_string(),
                    display_name: "Teacher".to_string(),
                    is_owner: true,
                    room_name: Some("Biology".to_string()),
                },
            )
            .unwrap();

        let lifecycle = SessionLifecycle::start(handle.clone(), &settings, sink.clone());
        tokio::time::sleep(Duration::from_secs(61)).await;
        lifecycle.shutdown().await;

        let records = sink.records("bio").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].room_name, "Biology");
        assert_eq!(records[0].participants[0].participant_id, "teacher");
    }

    #[tokio::test]
    async fn test_shutdown_stops_tasks() {
        let settings = settings(true);
        let handle = spawn_coordinator(settings.heartbeat.timeout());
        let lifecycle = SessionLifecycle::start(handle, &settings, Arc::new(crate::attendance::NullAttendance));
        tokio::time::timeout(Duration::from_secs(1), lifecycle.shutdown())
            .await
            .unwrap();
    }
}
