//! # vplotter Core
//!
//! Core types, errors, and events shared by the vplotter crates.
//! Provides the position snapshot, the session state machine,
//! stream results, and the listener surface used by callers.

pub mod core;
pub mod data;
pub mod error;
pub mod types;
pub mod units;

pub use core::{
    EventDispatcher, ListenerHandle, ListenerRegistry, SessionEvent, SessionListener,
};

pub use data::{
    PositionSnapshot, SessionState, SharedPosition, StreamProgress, StreamReport, StreamState,
};

pub use error::{
    CommandError, ConnectionError, Error, GcodeError, PollError, Result, StreamError,
};

pub use types::{thread_safe, thread_safe_rw, ThreadSafe, ThreadSafeRw};
