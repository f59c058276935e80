//! Line-oriented transport to the controller
//!
//! Provides:
//! - The `Transport` trait the session, poller and streamer talk through
//! - Connection parameters for the serial link
//! - An echoing wrapper that surfaces traffic to session listeners

pub mod serial;

use std::time::Duration;

use vplotter_core::{ListenerRegistry, Result, SessionEvent};

pub use serial::{ByteStream, LineTransport, SerialTransport};

/// Default baud rate of the plotter firmware
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default read timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

/// Terminator appended to an outgoing line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTerminator {
    /// `\r\n`, used for interactive and status commands
    Interactive,
    /// `\n`, used for streamed program lines
    Streamed,
}

impl LineTerminator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineTerminator::Interactive => "\r\n",
            LineTerminator::Streamed => "\n",
        }
    }
}

/// Serial connection parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionParams {
    /// Port name (e.g. "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout in milliseconds
    pub timeout_ms: u64,
}

impl ConnectionParams {
    /// Parameters for a port with default baud rate and timeout
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Raw line-oriented link to the firmware.
///
/// Lines returned by the read methods are trimmed and never empty. Every
/// read blocks for at most the configured read timeout.
pub trait Transport: Send {
    /// Human-readable endpoint name (port path for serial links)
    fn name(&self) -> String;

    /// Write `text` followed by the terminator
    fn send_line(&mut self, text: &str, terminator: LineTerminator) -> Result<()>;

    /// Write bytes as-is
    fn write_raw(&mut self, bytes: &[u8]) -> Result<()>;

    /// Next complete line, or `None` if none arrived within the read timeout
    fn read_line(&mut self) -> Result<Option<String>>;

    /// All complete lines available right now; partial lines stay buffered
    fn read_available_lines(&mut self) -> Result<Vec<String>>;

    /// Check if a complete line is buffered or unread bytes are waiting
    fn has_pending_input(&mut self) -> Result<bool>;

    /// Read and discard every line arriving within `window`.
    ///
    /// The discarded lines are returned for logging.
    fn drain(&mut self, window: Duration) -> Result<Vec<String>>;

    /// Check if the link is still open
    fn is_open(&self) -> bool;

    /// Close the link; closing twice is a no-op
    fn close(&mut self) -> Result<()>;
}

/// Transport wrapper that reports every sent and received line to the
/// session listeners.
pub struct EchoTransport<'a> {
    inner: &'a mut dyn Transport,
    listeners: &'a ListenerRegistry,
}

impl<'a> EchoTransport<'a> {
    pub fn new(inner: &'a mut dyn Transport, listeners: &'a ListenerRegistry) -> Self {
        Self { inner, listeners }
    }

    fn echo_received(&self, lines: &[String]) {
        for line in lines {
            self.listeners.emit(SessionEvent::LineReceived(line.clone()));
        }
    }
}

impl Transport for EchoTransport<'_> {
    fn name(&self) -> String {
        self.inner.name()
    }

    fn send_line(&mut self, text: &str, terminator: LineTerminator) -> Result<()> {
        self.inner.send_line(text, terminator)?;
        self.listeners.emit(SessionEvent::LineSent(text.to_string()));
        Ok(())
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_raw(bytes)
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let line = self.inner.read_line()?;
        if let Some(line) = &line {
            self.listeners.emit(SessionEvent::LineReceived(line.clone()));
        }
        Ok(line)
    }

    fn read_available_lines(&mut self) -> Result<Vec<String>> {
        let lines = self.inner.read_available_lines()?;
        self.echo_received(&lines);
        Ok(lines)
    }

    fn has_pending_input(&mut self) -> Result<bool> {
        self.inner.has_pending_input()
    }

    fn drain(&mut self, window: Duration) -> Result<Vec<String>> {
        let lines = self.inner.drain(window)?;
        self.echo_received(&lines);
        Ok(lines)
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminators() {
        assert_eq!(LineTerminator::Interactive.as_str(), "\r\n");
        assert_eq!(LineTerminator::Streamed.as_str(), "\n");
    }

    #[test]
    fn test_connection_params_defaults() {
        let params = ConnectionParams::new("/dev/ttyUSB0");
        assert_eq!(params.port, "/dev/ttyUSB0");
        assert_eq!(params.baud_rate, 115_200);
        assert_eq!(params.timeout(), Duration::from_millis(500));
    }
}
