//! Serial port communication implementation
//!
//! Line framing over any byte stream that can report how many unread bytes
//! are waiting, plus the `serialport`-backed stream used for real hardware.

use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};
use vplotter_core::{ConnectionError, Error, Result};

use super::{ConnectionParams, LineTerminator, Transport};

/// Pause between polls of a stream that returned no data
const IDLE_BACKOFF: Duration = Duration::from_millis(5);

/// Bytes requested per read
const READ_CHUNK: usize = 256;

/// A bidirectional byte stream with a pending-byte count
pub trait ByteStream: Read + Write + Send {
    /// Number of received bytes not yet read
    fn bytes_to_read(&self) -> io::Result<u32>;
}

impl ByteStream for Box<dyn serialport::SerialPort> {
    fn bytes_to_read(&self) -> io::Result<u32> {
        serialport::SerialPort::bytes_to_read(&**self).map_err(io::Error::from)
    }
}

/// Newline-framed transport over a byte stream.
///
/// Incoming bytes are buffered until a `\n` completes a line. Lines are
/// trimmed (which also removes the `\r` of a `\r\n` pair) and blank lines
/// are dropped.
pub struct LineTransport<S> {
    name: String,
    stream: Option<S>,
    timeout: Duration,
    buffer: Vec<u8>,
}

/// Transport over a hardware serial port
pub type SerialTransport = LineTransport<Box<dyn serialport::SerialPort>>;

impl SerialTransport {
    /// Open a serial port at 8N1 without flow control
    pub fn open(params: &ConnectionParams) -> Result<Self> {
        let port = serialport::new(params.port.as_str(), params.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(params.timeout())
            .open()
            .map_err(|e| {
                warn!("Failed to open serial port {}: {}", params.port, e);
                ConnectionError::FailedToOpen {
                    port: params.port.clone(),
                    reason: e.to_string(),
                }
            })?;

        info!(
            "Opened serial port {} at {} baud",
            params.port, params.baud_rate
        );
        Ok(LineTransport::new(params.port.clone(), port, params.timeout()))
    }
}

/// List the names of the serial ports present on this machine
pub fn available_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        Error::other(format!("Failed to enumerate ports: {}", e))
    })?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

impl<S: ByteStream> LineTransport<S> {
    /// Wrap an open stream
    pub fn new(name: impl Into<String>, stream: S, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            stream: Some(stream),
            timeout,
            buffer: Vec::new(),
        }
    }

    /// The underlying stream, `None` once closed
    pub fn get_ref(&self) -> Option<&S> {
        self.stream.as_ref()
    }

    /// Read timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn stream_mut(&mut self) -> Result<&mut S> {
        let name = &self.name;
        self.stream
            .as_mut()
            .ok_or_else(|| Error::io(format!("{} is closed", name)))
    }

    /// Read once from the stream into the line buffer.
    ///
    /// Returns the number of bytes read; a timeout counts as zero.
    fn fill(&mut self) -> Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let result = self.stream_mut()?.read(&mut chunk);
        let read = match result {
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                0
            }
            Err(e) => return Err(Error::io(format!("read from {} failed: {}", self.name, e))),
        };
        self.buffer.extend_from_slice(&chunk[..read]);
        Ok(read)
    }

    fn waiting(&mut self) -> Result<u32> {
        let name = self.name.clone();
        self.stream_mut()?
            .bytes_to_read()
            .map_err(|e| Error::io(format!("status of {} unavailable: {}", name, e)))
    }

    fn has_complete_line(&self) -> bool {
        self.buffer.contains(&b'\n')
    }

    /// Pop the next non-blank complete line off the buffer
    fn take_line(&mut self) -> Option<String> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                return Some(line);
            }
        }
        None
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let name = self.name.clone();
        let stream = self.stream_mut()?;
        let result = match stream.write_all(bytes) {
            Ok(()) => stream.flush(),
            Err(e) => Err(e),
        };
        result.map_err(|e| Error::io(format!("write to {} failed: {}", name, e)))
    }
}

impl<S: ByteStream> Transport for LineTransport<S> {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn send_line(&mut self, text: &str, terminator: LineTerminator) -> Result<()> {
        let mut data = String::with_capacity(text.len() + 2);
        data.push_str(text);
        data.push_str(terminator.as_str());
        trace!("{} <- {:?}", self.name, data);
        self.write_all(data.as_bytes())
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        trace!("{} <- {} raw bytes", self.name, bytes.len());
        self.write_all(bytes)
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.take_line() {
            return Ok(Some(line));
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            let read = self.fill()?;
            if let Some(line) = self.take_line() {
                trace!("{} -> {}", self.name, line);
                return Ok(Some(line));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            if read == 0 {
                thread::sleep(IDLE_BACKOFF);
            }
        }
    }

    fn read_available_lines(&mut self) -> Result<Vec<String>> {
        while self.waiting()? > 0 {
            if self.fill()? == 0 {
                break;
            }
        }

        let mut lines = Vec::new();
        while let Some(line) = self.take_line() {
            lines.push(line);
        }
        Ok(lines)
    }

    fn has_pending_input(&mut self) -> Result<bool> {
        if self.has_complete_line() {
            return Ok(true);
        }
        Ok(self.waiting()? > 0)
    }

    fn drain(&mut self, window: Duration) -> Result<Vec<String>> {
        let deadline = Instant::now() + window;
        let mut discarded = Vec::new();
        while Instant::now() < deadline {
            if let Some(line) = self.read_line()? {
                discarded.push(line);
            }
        }
        debug!("Drained {} lines from {}", discarded.len(), self.name);
        Ok(discarded)
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn close(&mut self) -> Result<()> {
        if self.stream.take().is_some() {
            info!("Closed {}", self.name);
        }
        self.buffer.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct MemoryStream {
        incoming: VecDeque<u8>,
        written: Vec<u8>,
    }

    impl MemoryStream {
        fn with_input(input: &str) -> Self {
            Self {
                incoming: input.bytes().collect(),
                written: Vec::new(),
            }
        }
    }

    impl Read for MemoryStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.incoming.is_empty() {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.incoming.len());
            for (slot, byte) in buf.iter_mut().zip(self.incoming.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }
    }

    impl Write for MemoryStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl ByteStream for MemoryStream {
        fn bytes_to_read(&self) -> io::Result<u32> {
            Ok(self.incoming.len() as u32)
        }
    }

    fn transport(input: &str) -> LineTransport<MemoryStream> {
        LineTransport::new("mem", MemoryStream::with_input(input), Duration::from_millis(20))
    }

    #[test]
    fn test_send_line_appends_terminator() {
        let mut t = transport("");
        t.send_line("$X", LineTerminator::Interactive).unwrap();
        t.send_line("G1 X1", LineTerminator::Streamed).unwrap();
        assert_eq!(t.get_ref().unwrap().written, b"$X\r\nG1 X1\n");
    }

    #[test]
    fn test_read_available_keeps_partial_line() {
        let mut t = transport("ok\r\n\r\n[MSG:Caution]\r\nerr");
        assert_eq!(t.read_available_lines().unwrap(), vec!["ok", "[MSG:Caution]"]);
        assert!(!t.has_pending_input().unwrap());
        assert!(t.read_line().unwrap().is_none());
    }

    #[test]
    fn test_read_line_times_out_empty() {
        let mut t = transport("");
        assert_eq!(t.read_line().unwrap(), None);
        assert!(t.read_available_lines().unwrap().is_empty());
    }

    #[test]
    fn test_pending_input() {
        let mut t = transport("ok\n");
        assert!(t.has_pending_input().unwrap());
        assert_eq!(t.read_line().unwrap().as_deref(), Some("ok"));
        assert!(!t.has_pending_input().unwrap());
    }

    #[test]
    fn test_drain_discards_banner() {
        let mut t = transport("\r\nGrbl 0.9j ['$' for help]\r\n");
        let lines = t.drain(Duration::from_millis(30)).unwrap();
        assert_eq!(lines, vec!["Grbl 0.9j ['$' for help]"]);
        assert!(t.read_available_lines().unwrap().is_empty());
    }

    #[test]
    fn test_closed_transport_fails_io() {
        let mut t = transport("");
        t.close().unwrap();
        assert!(!t.is_open());
        let err = t.send_line("?", LineTerminator::Interactive).unwrap_err();
        assert!(err.is_io_error());
        t.close().unwrap();
    }
}
