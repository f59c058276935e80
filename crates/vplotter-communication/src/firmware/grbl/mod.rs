//! GRBL protocol support
//!
//! Command formatting, status parsing and character-counting streaming for
//! GRBL-based plotters.

pub mod command_creator;
pub mod status_parser;
pub mod streamer;
pub mod utils;

pub use command_creator::{CommandBuilder, JogDirection, RealTimeCommand};
pub use status_parser::{parse_offset_report, parse_status_report, StatusPoller};
pub use streamer::{CancelHandle, StreamAckState, StreamConfig, StreamingController};
