// ============================
// crates/backend-lib/src/config/mod.rs
// ============================
//! Configuration management.
//!
//! Sources are layered: built-in defaults, then a TOML file, then environment
//! variables prefixed `LIVECLASS_` (nested keys separated by `__`, e.g.
//! `LIVECLASS_HEARTBEAT__INTERVAL_SECS=10`).
use crate::error::AppError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
/// Upper bound for any timer period (one day)
const MAX_INTERVAL_SECS: u64 = 86_400;

/// Application settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub heartbeat: HeartbeatSettings,
    #[serde(default)]
    pub attendance: AttendanceSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS; empty means any origin
    pub allowed_origins: Vec<String>,
}

/// Liveness sweep settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatSettings {
    /// Period of the ping + sweep task
    pub interval_secs: u64,
    /// Silent periods tolerated before a connection is force-disconnected
    pub max_missed: u32,
}

/// Periodic attendance snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendanceSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    /// Emit JSON lines instead of the human-readable format
    pub json: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            allowed_origins: Vec::new(),
        }
    }
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval_secs: 15,
            max_missed: 2,
        }
    }
}

impl Default for AttendanceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 60,
            path: PathBuf::from("data/attendance"),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl HeartbeatSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Silence after which a connection counts as dead
    pub fn timeout(&self) -> Duration {
        self.interval()
            .checked_mul(self.max_missed)
            .unwrap_or(Duration::MAX)
    }
}

impl Settings {
    /// Load settings from `config.toml` in the working directory plus the environment
    pub fn load() -> Result<Self, AppError> {
        Self::load_from("config.toml")
    }

    /// Load settings from a specific TOML file plus the environment.
    /// A missing file is not an error; defaults fill every gap.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("LIVECLASS_").split("__"))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the coordinator cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        if self.heartbeat.interval_secs == 0 {
            return Err(AppError::Config(
                "heartbeat.interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.heartbeat.max_missed == 0 {
            return Err(AppError::Config(
                "heartbeat.max_missed must be greater than zero".to_string(),
            ));
        }
        if self.heartbeat.interval_secs > MAX_INTERVAL_SECS {
            return Err(AppError::Config(format!(
                "heartbeat.interval_secs must be at most {MAX_INTERVAL_SECS}"
            )));
        }
        if self.heartbeat.interval().checked_mul(self.heartbeat.max_missed).is_none() {
            return Err(AppError::Config(
                "heartbeat.interval_secs * max_missed overflows".to_string(),
            ));
        }
        if self.attendance.interval_secs == 0 {
            return Err(AppError::Config(
                "attendance.interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.attendance.interval_secs > MAX_INTERVAL_SECS {
            return Err(AppError::Config(format!(
                "attendance.interval_secs must be at most {MAX_INTERVAL_SECS}"
            )));
        }
        let level = self.logging.level.to_ascii_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(AppError::Config(format!(
                "logging.level must be one of {VALID_LOG_LEVELS:?}, got {}",
                self.logging.level
            )));
        }
        Ok(())
    }

    /// Resolve the listen address
    pub fn bind_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid bind address: {e}")))
    }
}

#[cfg(test)]
mod config_tests;
