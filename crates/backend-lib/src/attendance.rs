// ============================
// crates/backend-lib/src/attendance.rs
// ============================
//! Attendance snapshots with a flat-file implementation.
use crate::error::AppError;
use crate::metrics as keys;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use liveclass_common::RoomSnapshot;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{fs as tokio_fs, io::AsyncWriteExt};

/// One participant as recorded at snapshot time
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    pub participant_id: String,
    pub display_name: String,
    pub is_owner: bool,
    pub joined_at: DateTime<Utc>,
}

/// Who was in a room at `recorded_at`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub room_id: String,
    pub room_name: String,
    pub recorded_at: DateTime<Utc>,
    pub participants: Vec<AttendanceEntry>,
}

impl AttendanceRecord {
    pub fn from_snapshot(snapshot: &RoomSnapshot, recorded_at: DateTime<Utc>) -> Self {
        Self {
            room_id: snapshot.room_id.clone(),
            room_name: snapshot.room_name.clone(),
            recorded_at,
            participants: snapshot
                .members
                .iter()
                .map(|m| AttendanceEntry {
                    participant_id: m.participant_id.clone(),
                    display_name: m.display_name.clone(),
                    is_owner: m.is_owner,
                    joined_at: m.joined_at,
                })
                .collect(),
        }
    }
}

/// Trait for attendance backends
#[async_trait]
pub trait AttendanceSink: Send + Sync {
    /// Persist one snapshot
    async fn record(&self, record: &AttendanceRecord) -> Result<(), AppError>;

    /// Every snapshot persisted for a room, oldest first
    async fn records(&self, room_id: &str) -> Result<Vec<AttendanceRecord>, AppError>;
}

/// Sink used when attendance recording is disabled
#[derive(Clone, Copy, Debug, Default)]
pub struct NullAttendance;

#[async_trait]
impl AttendanceSink for NullAttendance {
    async fn record(&self, _record: &AttendanceRecord) -> Result<(), AppError> {
        Ok(())
    }

    async fn records(&self, _room_id: &str) -> Result<Vec<AttendanceRecord>, AppError> {
        Ok(Vec::new())
    }
}

/// Appends one JSON line per snapshot to `<root>/<room>.jsonl`
#[derive(Clone, Debug)]
pub struct FlatFileAttendance {
    root: PathBuf,
}

impl FlatFileAttendance {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, AppError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Room ids are client supplied, so only `[A-Za-z0-9_-]` reaches the file name
    fn log_path(&self, room_id: &str) -> PathBuf {
        let stem: String = room_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{stem}.jsonl"))
    }
}

#[async_trait]
impl AttendanceSink for FlatFileAttendance {
    async fn record(&self, record: &AttendanceRecord) -> Result<(), AppError> {
        let path = self.log_path(&record.room_id);
        let line = serde_json::to_string(record)?;

        let mut file = tokio_fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;

        counter!(keys::ATTENDANCE_WRITTEN).increment(1);
        Ok(())
    }

    async fn records(&self, room_id: &str) -> Result<Vec<AttendanceRecord>, AppError> {
        let path = self.log_path(room_id);
        let content = match tokio_fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let records = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<AttendanceRecord>(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping malformed attendance line");
                    None
                },
            })
            // Sanitised names can collide, so keep only this room's lines
            .filter(|record| record.room_id == room_id)
            .collect();

        Ok(records)
    }
}
