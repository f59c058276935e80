//! Event system for session observers
//!
//! Provides:
//! - Event types for traffic, progress, position, and stream results
//! - Event dispatcher for publishing events to async subscribers

use crate::core::listener::SessionListener;
use crate::data::{PositionSnapshot, StreamProgress, StreamReport};
use crate::units::format_hms;
use tokio::sync::broadcast;

/// Events surfaced by a machine session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Transport opened on the named port
    Connected(String),
    /// Transport closed
    Disconnected,
    /// A line was written to the firmware
    LineSent(String),
    /// A line was read from the firmware
    LineReceived(String),
    /// A non-acknowledgment line received while streaming
    Diagnostic(String),
    /// Stream progress update
    Progress(StreamProgress),
    /// A new position snapshot was committed
    PositionChanged(PositionSnapshot),
    /// Recoverable problem (e.g. a malformed status report)
    Warning(String),
    /// Operation failed
    Error(String),
    /// A stream reached a terminal state
    StreamFinished(StreamReport),
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::Connected(port) => write!(f, "Connected to {}", port),
            SessionEvent::Disconnected => write!(f, "Disconnected"),
            SessionEvent::LineSent(line) => write!(f, "> {}", line),
            SessionEvent::LineReceived(line) => write!(f, "< {}", line),
            SessionEvent::Diagnostic(line) => write!(f, "Debug: {}", line),
            SessionEvent::Progress(p) => write!(
                f,
                "line {}/{}, eta: {}, runtime: {}",
                p.lines_sent,
                p.total_lines,
                format_hms(p.eta),
                format_hms(p.elapsed)
            ),
            SessionEvent::PositionChanged(snapshot) => write!(f, "{}", snapshot),
            SessionEvent::Warning(msg) => write!(f, "Warning: {}", msg),
            SessionEvent::Error(msg) => write!(f, "Error: {}", msg),
            SessionEvent::StreamFinished(report) => write!(f, "Stream {}", report),
        }
    }
}

/// Event dispatcher for publishing events to subscribers
#[derive(Clone)]
pub struct EventDispatcher {
    /// Broadcast sender channel for session events.
    tx: broadcast::Sender<SessionEvent>,
}

impl EventDispatcher {
    /// Create a new event dispatcher
    ///
    /// # Arguments
    /// * `buffer_size` - Size of the broadcast buffer (default 256)
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size);
        Self { tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers
    pub fn publish(
        &self,
        event: SessionEvent,
    ) -> Result<usize, broadcast::error::SendError<SessionEvent>> {
        self.tx.send(event)
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}

impl SessionListener for EventDispatcher {
    fn on_event(&self, event: &SessionEvent) {
        // No subscribers is not an error for a fire-and-forget observer.
        let _ = self.publish(event.clone());
    }
}
