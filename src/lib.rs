//! # vplotter
//!
//! Command-line controller for GRBL pen plotters:
//! - Serial connection with wake-up handshake
//! - Jogging, absolute moves and origin returns
//! - Machine/work position readout from status and offset reports
//! - Character-counting G-code streaming with progress and cancellation
//! - Toolpath preview of a program
//!
//! ## Architecture
//!
//! vplotter is organized as a workspace with multiple crates:
//!
//! 1. **vplotter-core** - Errors, position snapshot, session state, events
//! 2. **vplotter-visualizer** - G-code loading and toolpath plotting
//! 3. **vplotter-communication** - Serial link, GRBL protocol, machine session
//! 4. **vplotter-settings** - Persisted configuration
//! 5. **vplotter** - Main binary that integrates all crates

pub use vplotter_communication::{
    available_ports, CancelHandle, JogDirection, MachineSession, PollOutcome, PollTask,
    SessionConfig,
};

pub use vplotter_core::{
    Error, EventDispatcher, PositionSnapshot, Result, SessionEvent, SessionListener,
    SessionState, StreamProgress, StreamReport, StreamState,
};

pub use vplotter_settings::{Config, SettingsError};

pub use vplotter_visualizer::{GcodeProgram, MotionType, PointKind, Toolpath};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting on stderr
/// - RUST_LOG environment variable support, `info` when unset
/// - `verbose` raises the default to `debug`
pub fn init_logging(verbose: bool) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    // Operator output goes to stdout; keep logs on stderr.
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
