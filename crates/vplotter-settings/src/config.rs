//! Configuration for vplotter
//!
//! Provides configuration file handling and validation.
//! Supports JSON and TOML file formats stored in platform-specific directories.
//!
//! Configuration is organized into logical sections:
//! - Connection settings (port, baud rate, timeouts)
//! - Streaming settings (receive buffer, progress, stall detection)
//! - Machine preferences (jog, feed rates, spindle, polling)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use vplotter_communication::{ConnectionParams, SessionConfig, StreamConfig};

use crate::error::{ConfigError, SettingsError, SettingsResult};

/// Directory under the platform config dir holding vplotter files
pub const APP_DIR_NAME: &str = "vplotter";

/// Default config file name
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Serial connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port name (e.g. `/dev/ttyUSB0` or `COM3`)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout in milliseconds
    pub timeout_ms: u64,
    /// How long startup output is discarded after the wake-up sequence
    pub wakeup_drain_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            port: defaults.connection.port,
            baud_rate: defaults.connection.baud_rate,
            timeout_ms: defaults.connection.timeout_ms,
            wakeup_drain_ms: defaults.wakeup_drain.as_millis() as u64,
        }
    }
}

/// Program streaming settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// Firmware serial receive buffer in bytes
    pub rx_buffer_size: usize,
    /// Lines between progress reports
    pub progress_interval: usize,
    /// Abort when the firmware stays silent this long (ms)
    pub stall_timeout_ms: u64,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        let defaults = StreamConfig::default();
        Self {
            rx_buffer_size: defaults.rx_buffer_size,
            progress_interval: defaults.progress_interval,
            stall_timeout_ms: defaults.stall_timeout.as_millis() as u64,
        }
    }
}

/// Machine preference settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineSettings {
    /// Default jog increment in mm
    pub jog_step_mm: f64,
    /// Default jog feed rate in mm/min
    pub jog_feed_rate: f64,
    /// Feed rate for absolute moves in mm/min
    pub move_feed_rate: f64,
    /// Spindle (pen servo) speed
    pub spindle_speed: u32,
    /// Keep the steppers energized when idle
    pub motor_lock: bool,
    /// Background position poll interval (ms)
    pub poll_interval_ms: u64,
    /// Wait between a command and reading its answer (ms)
    pub command_settle_ms: u64,
}

impl Default for MachineSettings {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            jog_step_mm: defaults.jog_step_mm,
            jog_feed_rate: defaults.jog_feed_rate,
            move_feed_rate: defaults.move_feed_rate,
            spindle_speed: defaults.spindle_speed,
            motor_lock: defaults.motor_lock,
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
            command_settle_ms: defaults.command_settle.as_millis() as u64,
        }
    }
}

/// File format, chosen by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

impl Format {
    fn from_path(path: &Path) -> SettingsResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            other => Err(ConfigError::UnsupportedFormat(other.unwrap_or("").to_string()).into()),
        }
    }
}

fn out_of_range(key: &str, value: impl ToString) -> SettingsError {
    ConfigError::ValueOutOfRange {
        key: key.to_string(),
        value: value.to_string(),
    }
    .into()
}

fn require_positive(key: &str, value: f64) -> SettingsResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(out_of_range(key, value))
    }
}

/// Complete application configuration
///
/// Aggregates all settings sections and provides file I/O operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Streaming settings
    pub streaming: StreamingSettings,
    /// Machine preferences
    pub machine: MachineSettings,
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform config directory for vplotter
    pub fn config_dir() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .or_else(dirs::home_dir)
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no config or home directory found".to_string())
            })
    }

    /// Default config file location
    pub fn default_path() -> SettingsResult<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = Format::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            SettingsError::LoadError(format!("{}: {}", path.display(), e))
        })?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load the config at `path`, or the defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML), creating parent directories
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;
        let format = Format::from_path(path)?;

        let content = match format {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => self.to_toml_string()?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> SettingsResult<String> {
        toml::to_string_pretty(self).map_err(|e| SettingsError::SaveError(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        // Connection; the port may stay empty until given on the command line
        if self.connection.baud_rate == 0 {
            return Err(out_of_range("connection.baud_rate", 0));
        }
        if self.connection.timeout_ms == 0 {
            return Err(out_of_range("connection.timeout_ms", 0));
        }

        // Streaming
        if self.streaming.rx_buffer_size < 3 {
            return Err(SettingsError::InvalidSetting {
                key: "streaming.rx_buffer_size".to_string(),
                reason: "must hold at least one character and its newline".to_string(),
            });
        }
        if self.streaming.progress_interval == 0 {
            return Err(out_of_range("streaming.progress_interval", 0));
        }
        if self.streaming.stall_timeout_ms == 0 {
            return Err(out_of_range("streaming.stall_timeout_ms", 0));
        }

        // Machine
        require_positive("machine.jog_step_mm", self.machine.jog_step_mm)?;
        require_positive("machine.jog_feed_rate", self.machine.jog_feed_rate)?;
        require_positive("machine.move_feed_rate", self.machine.move_feed_rate)?;
        if self.machine.poll_interval_ms == 0 {
            return Err(out_of_range("machine.poll_interval_ms", 0));
        }

        Ok(())
    }

    /// Session settings for the communication layer
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            connection: ConnectionParams {
                port: self.connection.port.clone(),
                baud_rate: self.connection.baud_rate,
                timeout_ms: self.connection.timeout_ms,
            },
            wakeup_drain: Duration::from_millis(self.connection.wakeup_drain_ms),
            command_settle: Duration::from_millis(self.machine.command_settle_ms),
            spindle_speed: self.machine.spindle_speed,
            motor_lock: self.machine.motor_lock,
            jog_step_mm: self.machine.jog_step_mm,
            jog_feed_rate: self.machine.jog_feed_rate,
            move_feed_rate: self.machine.move_feed_rate,
            poll_interval: Duration::from_millis(self.machine.poll_interval_ms),
            stream: StreamConfig {
                rx_buffer_size: self.streaming.rx_buffer_size,
                progress_interval: self.streaming.progress_interval,
                stall_timeout: Duration::from_millis(self.streaming.stall_timeout_ms),
            },
        }
    }
}
