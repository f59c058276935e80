use std::time::Duration;

use tempfile::TempDir;
use vplotter_settings::{Config, ConfigError, SettingsError};

fn custom_config() -> Config {
    let mut config = Config::default();
    config.connection.port = "/dev/ttyUSB1".to_string();
    config.connection.wakeup_drain_ms = 1500;
    config.streaming.progress_interval = 25;
    config.machine.motor_lock = false;
    config.machine.jog_step_mm = 0.5;
    config
}

#[test]
fn test_toml_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let config = custom_config();
    config.save_to_file(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("[connection]"));
    assert!(text.contains("port = \"/dev/ttyUSB1\""));

    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_json_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");

    let config = custom_config();
    config.save_to_file(&path).unwrap();
    assert_eq!(Config::load_from_file(&path).unwrap(), config);
}

#[test]
fn test_loaded_config_drives_session() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    custom_config().save_to_file(&path).unwrap();

    let session = Config::load_from_file(&path).unwrap().session_config();
    assert_eq!(session.connection.port, "/dev/ttyUSB1");
    assert_eq!(session.wakeup_drain, Duration::from_millis(1500));
    assert_eq!(session.stream.progress_interval, 25);
    assert!(!session.motor_lock);
    assert_eq!(session.jog_step_mm, 0.5);
}

#[test]
fn test_invalid_file_is_rejected_on_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[machine]\npoll_interval_ms = 0\n").unwrap();

    let err = Config::load_from_file(&path).unwrap_err();
    assert!(matches!(
        err,
        SettingsError::Config(ConfigError::ValueOutOfRange { ref key, .. })
            if key == "machine.poll_interval_ms"
    ));

    std::fs::write(&path, "[machine\n").unwrap();
    assert!(matches!(
        Config::load_from_file(&path).unwrap_err(),
        SettingsError::TomlError(_)
    ));
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");

    assert!(matches!(
        Config::load_from_file(&path).unwrap_err(),
        SettingsError::LoadError(_)
    ));
    assert_eq!(Config::load_or_default(&path).unwrap(), Config::default());
}
