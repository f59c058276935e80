//! vplotter Settings Crate
//!
//! Handles persisted configuration and its conversion into session settings.

pub mod config;
pub mod error;

pub use config::{Config, ConnectionSettings, MachineSettings, StreamingSettings};
pub use error::{ConfigError, SettingsError, SettingsResult};
