//! # vplotter Communication
//!
//! Serial link, GRBL protocol and session management for vplotter.
//! Provides the line transport, command formatting, status polling,
//! character-counting streaming and the `MachineSession` that serializes
//! access to the plotter.

pub mod communication;
pub mod firmware;
pub mod poll_task;
pub mod session;

pub use communication::{
    serial::available_ports, ByteStream, ConnectionParams, EchoTransport, LineTerminator,
    LineTransport, SerialTransport, Transport,
};

pub use firmware::grbl::{
    parse_offset_report, parse_status_report, CancelHandle, CommandBuilder, JogDirection,
    RealTimeCommand, StatusPoller, StreamAckState, StreamConfig, StreamingController,
};

pub use poll_task::PollTask;
pub use session::{MachineSession, PollOutcome, SessionConfig};
