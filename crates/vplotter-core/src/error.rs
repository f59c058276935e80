//! Error handling for vplotter
//!
//! Provides error types for all layers of the controller:
//! - Connection errors (transport, session ownership)
//! - Poll errors (unexpected firmware report shapes)
//! - Command errors (caller-supplied parameters)
//! - Stream errors (failures while streaming a program)
//! - G-Code errors (program loading)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Connection error type
///
/// Represents errors related to the byte-stream link to the firmware and
/// to ownership of that link by the session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// No transport is open
    #[error("Controller not connected")]
    NotConnected,

    /// A transport is already open
    #[error("Controller already connected")]
    AlreadyConnected,

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Read or write failure on an open transport
    #[error("I/O error: {reason}")]
    Io {
        /// The reason for the I/O error.
        reason: String,
    },

    /// The transport is in use by another operation
    #[error("Session busy: {activity} in progress")]
    Busy {
        /// The activity currently holding the session.
        activity: String,
    },
}

/// Poll error type
///
/// Raised when a status or coordinate-offset report cannot be interpreted.
/// These are recovered locally: the previous position snapshot is retained.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PollError {
    /// The firmware report did not have the expected shape
    #[error("Malformed {query} report '{report}': {reason}")]
    MalformedStatus {
        /// The query that produced the report (`?` or `$#`).
        query: String,
        /// The offending report line (empty when nothing was received).
        report: String,
        /// What was wrong with it.
        reason: String,
    },

    /// No position has been polled since connecting
    #[error("No position snapshot available")]
    NoSnapshot,
}

/// Command error type
///
/// Raised by the command builder before any I/O happens.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    /// Invalid parameter value
    #[error("Invalid parameter '{param}': {reason}")]
    InvalidParameter {
        /// The parameter name.
        param: String,
        /// The reason the parameter is invalid.
        reason: String,
    },
}

/// Stream error type
///
/// Terminates the current stream. There is no partial retry; the operator
/// has to restart the stream.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    /// Transport failure while streaming
    #[error("Stream failed at line {line_number}: {reason}")]
    Failure {
        /// 1-based program line being processed when the failure occurred.
        line_number: usize,
        /// The underlying failure.
        reason: String,
    },

    /// A single line is larger than the firmware receive buffer
    #[error("Line {line_number} needs {bytes} bytes but the receive buffer holds {capacity}")]
    BufferOverflow {
        /// 1-based program line that does not fit.
        line_number: usize,
        /// Bytes the line occupies including the terminator.
        bytes: usize,
        /// Configured receive buffer capacity.
        capacity: usize,
    },

    /// The firmware stopped responding while acknowledgments were outstanding
    #[error("No response from controller for {timeout_ms}ms")]
    Stalled {
        /// The stall timeout in milliseconds.
        timeout_ms: u64,
    },
}

/// G-Code error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GcodeError {
    /// Program file could not be read
    #[error("File error for {path}: {reason}")]
    FileError {
        /// Path of the program file.
        path: String,
        /// The reason the file could not be read.
        reason: String,
    },
}

/// Main error type for vplotter
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Poll error
    #[error(transparent)]
    Poll(#[from] PollError),

    /// Command error
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Stream error
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// G-Code error
    #[error(transparent)]
    Gcode(#[from] GcodeError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Shorthand for a transport-level I/O failure
    pub fn io(reason: impl Into<String>) -> Self {
        Error::Connection(ConnectionError::Io {
            reason: reason.into(),
        })
    }

    /// Shorthand for a rejected command parameter
    pub fn invalid_parameter(param: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Command(CommandError::InvalidParameter {
            param: param.into(),
            reason: reason.into(),
        })
    }

    /// Check if this is a transport-level I/O error
    pub fn is_io_error(&self) -> bool {
        matches!(self, Error::Connection(ConnectionError::Io { .. }))
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if the session was busy with another operation
    pub fn is_busy(&self) -> bool {
        matches!(self, Error::Connection(ConnectionError::Busy { .. }))
    }

    /// Check if this is a malformed firmware report
    pub fn is_malformed_status(&self) -> bool {
        matches!(self, Error::Poll(PollError::MalformedStatus { .. }))
    }

    /// Check if this is a rejected command parameter
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(self, Error::Command(CommandError::InvalidParameter { .. }))
    }

    /// Check if this is a stream error
    pub fn is_stream_error(&self) -> bool {
        matches!(self, Error::Stream(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::invalid_parameter("step_mm", "must be > 0");
        assert_eq!(err.to_string(), "Invalid parameter 'step_mm': must be > 0");

        let err: Error = PollError::MalformedStatus {
            query: "?".to_string(),
            report: "<Idle>".to_string(),
            reason: "expected at least 6 fields".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Malformed ? report '<Idle>': expected at least 6 fields"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::io("broken pipe").is_io_error());
        assert!(Error::io("broken pipe").is_connection_error());
        assert!(Error::invalid_parameter("feed_rate", "negative").is_invalid_parameter());

        let busy: Error = ConnectionError::Busy {
            activity: "Streaming".to_string(),
        }
        .into();
        assert!(busy.is_busy());
        assert!(!busy.is_io_error());

        let stalled: Error = StreamError::Stalled { timeout_ms: 10 }.into();
        assert!(stalled.is_stream_error());
    }
}
