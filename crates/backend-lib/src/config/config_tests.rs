use super::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_settings_default() {
    let settings = Settings::default();

    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 3000);
    assert!(settings.server.allowed_origins.is_empty());
    assert_eq!(settings.heartbeat.interval_secs, 15);
    assert_eq!(settings.heartbeat.max_missed, 2);
    assert!(!settings.attendance.enabled);
    assert_eq!(settings.logging.level, "info");
    assert!(settings.validate().is_ok());
}

#[test]
fn test_heartbeat_timeout() {
    let heartbeat = HeartbeatSettings {
        interval_secs: 10,
        max_missed: 3,
    };
    assert_eq!(heartbeat.interval(), Duration::from_secs(10));
    assert_eq!(heartbeat.timeout(), Duration::from_secs(30));

    // Saturates instead of panicking
    let huge = HeartbeatSettings {
        interval_secs: u64::MAX,
        max_missed: 2,
    };
    assert_eq!(huge.timeout(), Duration::MAX);
}

#[test]
fn test_load_rejects_overflowing_interval() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("huge.toml");
    fs::write(&config_path, format!("[heartbeat]\ninterval_secs = {}\n", i64::MAX)).unwrap();

    assert!(matches!(
        Settings::load_from(&config_path),
        Err(AppError::Config(_))
    ));
}

#[test]
fn test_settings_validation() {
    let settings = Settings::default();

    let mut invalid = settings.clone();
    invalid.heartbeat.interval_secs = 0;
    assert!(matches!(invalid.validate(), Err(AppError::Config(_))));

    let mut invalid = settings.clone();
    invalid.heartbeat.max_missed = 0;
    assert!(invalid.validate().is_err());

    let mut invalid = settings.clone();
    invalid.attendance.interval_secs = 0;
    assert!(invalid.validate().is_err());

    let mut invalid = settings.clone();
    invalid.logging.level = "invalid".to_string();
    assert!(invalid.validate().is_err());

    let mut invalid = settings.clone();
    invalid.heartbeat.interval_secs = u64::MAX;
    assert!(matches!(invalid.validate(), Err(AppError::Config(_))));

    let mut invalid = settings.clone();
    invalid.attendance.interval_secs = u64::MAX;
    assert!(matches!(invalid.validate(), Err(AppError::Config(_))));

    let mut upper = settings;
    upper.logging.level = "DEBUG".to_string();
    assert!(upper.validate().is_ok());
}

#[test]
fn test_bind_addr() {
    let mut settings = Settings::default();
    assert_eq!(settings.bind_addr().unwrap().to_string(), "127.0.0.1:3000");

    settings.server.host = "not a host".to_string();
    assert!(settings.bind_addr().is_err());
}

#[test]
fn test_load_config_from_file() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("liveclass.toml");

    fs::write(
        &config_path,
        r#"
        [server]
        port = 8088
        allowed_origins = ["http://localhost:5173"]

        [heartbeat]
        interval_secs = 5

        [attendance]
        enabled = true
        path = "attendance-out"
        "#,
    )
    .unwrap();

    let settings = Settings::load_from(&config_path).unwrap();
    assert_eq!(settings.server.host, "127.0.0.1"); // default kept
    assert_eq!(settings.server.port, 8088);
    assert_eq!(settings.server.allowed_origins, vec!["http://localhost:5173"]);
    assert_eq!(settings.heartbeat.interval_secs, 5);
    assert_eq!(settings.heartbeat.max_missed, 2);
    assert!(settings.attendance.enabled);
    assert_eq!(settings.attendance.path, PathBuf::from("attendance-out"));
}

#[test]
fn test_load_rejects_invalid_file() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("bad.toml");
    fs::write(&config_path, "[heartbeat]\nmax_missed = 0\n").unwrap();

    assert!(matches!(
        Settings::load_from(&config_path),
        Err(AppError::Config(_))
    ));
}

#[test]
fn test_missing_file_uses_defaults() {
    let temp_dir = tempdir().unwrap();
    let settings = Settings::load_from(temp_dir.path().join("absent.toml")).unwrap();
    assert_eq!(settings.server.port, Settings::default().server.port);
}
