//! Data models for positions, session state, and stream results
//!
//! This module provides:
//! - Position snapshot (machine position plus active work offset)
//! - Shared, atomically published snapshot for concurrent readers
//! - Session state machine guarding transport access
//! - Stream state, progress, and final report

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::types::{thread_safe_rw, ThreadSafeRw};

/// One consistent reading of the machine position and the active work offset.
///
/// The work position is always derived as `machine - offset` and never
/// stored, so the two can not drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// X position in machine coordinates (mm)
    pub machine_x: f64,
    /// Y position in machine coordinates (mm)
    pub machine_y: f64,
    /// X offset of the active work coordinate system (mm)
    pub work_offset_x: f64,
    /// Y offset of the active work coordinate system (mm)
    pub work_offset_y: f64,
}

impl PositionSnapshot {
    /// Create a snapshot from a machine position and an active offset
    pub fn new(machine: (f64, f64), offset: (f64, f64)) -> Self {
        Self {
            machine_x: machine.0,
            machine_y: machine.1,
            work_offset_x: offset.0,
            work_offset_y: offset.1,
        }
    }

    /// X position in work coordinates
    pub fn work_x(&self) -> f64 {
        self.machine_x - self.work_offset_x
    }

    /// Y position in work coordinates
    pub fn work_y(&self) -> f64 {
        self.machine_y - self.work_offset_y
    }

    /// Machine position as (x, y)
    pub fn machine_position(&self) -> (f64, f64) {
        (self.machine_x, self.machine_y)
    }

    /// Work position as (x, y)
    pub fn work_position(&self) -> (f64, f64) {
        (self.work_x(), self.work_y())
    }

    /// Active work offset as (x, y)
    pub fn work_offset(&self) -> (f64, f64) {
        (self.work_offset_x, self.work_offset_y)
    }
}

impl fmt::Display for PositionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MCS x = {:.1} mm, y = {:.1} mm | WCS x = {:.1} mm, y = {:.1} mm",
            self.machine_x,
            self.machine_y,
            self.work_x(),
            self.work_y()
        )
    }
}

/// Position snapshot shared between the poller and external readers.
///
/// Updates replace the whole snapshot under one write lock, so a reader
/// never sees a new machine position paired with an old offset.
#[derive(Debug, Clone)]
pub struct SharedPosition {
    inner: ThreadSafeRw<Option<PositionSnapshot>>,
}

impl Default for SharedPosition {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedPosition {
    /// Create an empty shared position
    pub fn new() -> Self {
        Self {
            inner: thread_safe_rw(None),
        }
    }

    /// Latest committed snapshot, if any poll has succeeded yet
    pub fn snapshot(&self) -> Option<PositionSnapshot> {
        *self.inner.read()
    }

    /// Publish a new snapshot
    pub fn publish(&self, snapshot: PositionSnapshot) {
        *self.inner.write() = Some(snapshot);
    }

    /// Forget the current snapshot (on disconnect)
    pub fn clear(&self) {
        *self.inner.write() = None;
    }
}

/// Which operation currently owns the transport.
///
/// At most one of an interactive command, a status poll, or a stream may
/// use the transport at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No transport is open
    Disconnected,
    /// Connected, transport free
    Idle,
    /// Interactive command in flight
    Command,
    /// Status poll in flight
    Polling,
    /// Program stream in flight
    Streaming,
}

impl SessionState {
    /// Check if the transport is open
    pub fn is_connected(&self) -> bool {
        !matches!(self, SessionState::Disconnected)
    }

    /// Check if an operation currently owns the transport
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SessionState::Command | SessionState::Polling | SessionState::Streaming
        )
    }

    /// Check if a transition from this state to `target` is valid.
    ///
    /// - Disconnected can only go to Idle (connect)
    /// - Idle can start any operation or disconnect
    /// - An operation can only return to Idle, or drop to Disconnected
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, target),
            (Disconnected, Idle)
                | (Idle, Command | Polling | Streaming | Disconnected)
                | (Command | Polling | Streaming, Idle | Disconnected)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Idle => write!(f, "Idle"),
            Self::Command => write!(f, "Command"),
            Self::Polling => write!(f, "Polling"),
            Self::Streaming => write!(f, "Streaming"),
        }
    }
}

/// Lifecycle of one program stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    /// Not started
    Idle,
    /// Lines are being sent
    Streaming,
    /// Every line was sent
    Completed,
    /// Stopped on request before the last line
    Cancelled,
    /// Stopped by a transport or protocol failure
    Failed,
}

impl StreamState {
    /// Check if this is a terminal state
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            StreamState::Completed | StreamState::Cancelled | StreamState::Failed
        )
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Streaming => write!(f, "Streaming"),
            Self::Completed => write!(f, "Completed"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Progress of a running stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamProgress {
    /// Lines written to the transport so far
    pub lines_sent: usize,
    /// Lines in the program
    pub total_lines: usize,
    /// Wall-clock time since the stream started
    pub elapsed: Duration,
    /// Estimated time remaining
    pub eta: Duration,
}

impl StreamProgress {
    /// Fraction of lines sent, in `0.0..=1.0`
    pub fn fraction(&self) -> f64 {
        if self.total_lines == 0 {
            return 1.0;
        }
        self.lines_sent as f64 / self.total_lines as f64
    }

    /// Progress as a whole percentage
    pub fn percent(&self) -> u32 {
        (self.fraction() * 100.0) as u32
    }
}

/// Final result of a stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamReport {
    /// Terminal state
    pub state: StreamState,
    /// Lines written to the transport
    pub lines_sent: usize,
    /// Acknowledgments (`ok` or `error`) received
    pub acks_received: usize,
    /// Lines in the program
    pub total_lines: usize,
    /// Wall-clock duration of the stream
    pub elapsed: Duration,
    /// Failure description when `state` is `Failed`
    pub reason: Option<String>,
}

impl fmt::Display for StreamReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} lines sent, {} acknowledged",
            self.state, self.lines_sent, self.total_lines, self.acks_received
        )?;
        if let Some(reason) = &self.reason {
            write!(f, " ({})", reason)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_position_is_machine_minus_offset() {
        let snap = PositionSnapshot::new((12.5, -3.0), (2.5, 4.0));
        assert_eq!(snap.work_position(), (10.0, -7.0));
        assert_eq!(snap.machine_position(), (12.5, -3.0));
    }

    #[test]
    fn test_shared_position_publish_replaces_whole_snapshot() {
        let shared = SharedPosition::new();
        assert_eq!(shared.snapshot(), None);

        shared.publish(PositionSnapshot::new((1.0, 2.0), (0.5, 0.5)));
        let reader = shared.clone();
        shared.publish(PositionSnapshot::new((3.0, 4.0), (1.0, 1.0)));

        let snap = reader.snapshot().unwrap();
        assert_eq!(snap.machine_position(), (3.0, 4.0));
        assert_eq!(snap.work_offset(), (1.0, 1.0));

        shared.clear();
        assert_eq!(reader.snapshot(), None);
    }

    #[test]
    fn test_session_state_transitions() {
        use SessionState::*;
        assert!(Disconnected.can_transition_to(Idle));
        assert!(!Disconnected.can_transition_to(Streaming));
        assert!(Idle.can_transition_to(Polling));
        assert!(Streaming.can_transition_to(Idle));
        assert!(!Streaming.can_transition_to(Polling));
        assert!(!Command.can_transition_to(Streaming));
        assert!(Polling.can_transition_to(Disconnected));
        assert!(Streaming.is_busy());
        assert!(!Idle.is_busy());
    }

    #[test]
    fn test_progress_fraction() {
        let progress = StreamProgress {
            lines_sent: 25,
            total_lines: 100,
            elapsed: Duration::from_secs(5),
            eta: Duration::from_secs(15),
        };
        assert_eq!(progress.fraction(), 0.25);
        assert_eq!(progress.percent(), 25);
    }
}
