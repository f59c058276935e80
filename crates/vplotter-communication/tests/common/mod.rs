//! Scripted in-memory GRBL double shared by the integration tests.
//!
//! Lines ending in `\r\n` are treated as interactive commands and answered
//! at once. Lines ending in a bare `\n` are streamed lines: they sit in the
//! simulated receive buffer until the host reads, and each read that finds
//! no output waiting releases the acknowledgment of the oldest one.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use vplotter_communication::{ByteStream, LineTransport, MachineSession, SessionConfig};
use vplotter_core::SessionEvent;

pub const STATUS_REPORT: &str = "<Idle,Buf:0,RX:0,Ln:0,MPos:12.500,-3.250,0.000>";
pub const OFFSET_REPORT: &str = "[G54:2.500,4.000,0.000]";

pub struct FirmwareState {
    /// Every complete line received, without terminator
    pub received: Vec<String>,
    /// Streamed lines only, in order
    pub streamed: Vec<String>,
    pub status_report: String,
    pub offset_report: String,
    /// Interactive commands answered with `error:20`
    pub rejected: HashSet<String>,
    /// Emit a diagnostic before every n-th streamed acknowledgment
    pub diagnostic_every: Option<usize>,
    /// Never acknowledge streamed lines
    pub silent: bool,
    /// Fail writes once this many streamed lines were received
    pub fail_after_streamed: Option<usize>,
    /// Largest number of unacknowledged streamed bytes seen
    pub max_outstanding: usize,
    rx: Vec<u8>,
    out: VecDeque<u8>,
    unacked: VecDeque<usize>,
    released: usize,
}

impl Default for FirmwareState {
    fn default() -> Self {
        Self {
            received: Vec::new(),
            streamed: Vec::new(),
            status_report: STATUS_REPORT.to_string(),
            offset_report: OFFSET_REPORT.to_string(),
            rejected: HashSet::new(),
            diagnostic_every: None,
            silent: false,
            fail_after_streamed: None,
            max_outstanding: 0,
            rx: Vec::new(),
            out: VecDeque::new(),
            unacked: VecDeque::new(),
            released: 0,
        }
    }
}

impl FirmwareState {
    fn reply(&mut self, line: &str) {
        self.out.extend(line.bytes());
        self.out.extend(b"\r\n");
    }

    fn handle_line(&mut self, raw: Vec<u8>) {
        let interactive = raw.ends_with(b"\r\n");
        let text = String::from_utf8_lossy(&raw).trim().to_string();

        if interactive {
            if text.is_empty() {
                return;
            }
            self.received.push(text.clone());
            match text.as_str() {
                "?" => {
                    let report = self.status_report.clone();
                    self.reply(&report);
                }
                "$#" => {
                    let report = self.offset_report.clone();
                    self.reply(&report);
                    self.reply("[G55:0.000,0.000,0.000]");
                    self.reply("ok");
                }
                cmd if self.rejected.contains(cmd) => self.reply("error:20"),
                _ => self.reply("ok"),
            }
            return;
        }

        self.received.push(text.clone());
        self.streamed.push(text);
        self.unacked.push_back(raw.len());
        let outstanding: usize = self.unacked.iter().sum();
        self.max_outstanding = self.max_outstanding.max(outstanding);
    }

    fn release_ack(&mut self) {
        if self.silent || self.unacked.pop_front().is_none() {
            return;
        }
        self.released += 1;
        if let Some(every) = self.diagnostic_every {
            if self.released % every == 0 {
                let msg = format!("[MSG:checkpoint {}]", self.released);
                self.reply(&msg);
            }
        }
        self.reply("ok");
    }

    /// Lines received other than the position queries
    pub fn commands(&self) -> Vec<String> {
        self.received
            .iter()
            .filter(|l| l.as_str() != "?" && l.as_str() != "$#")
            .cloned()
            .collect()
    }

    pub fn outstanding(&self) -> usize {
        self.unacked.iter().sum()
    }
}

#[derive(Clone, Default)]
pub struct FakeFirmware {
    pub state: Arc<Mutex<FirmwareState>>,
}

impl FakeFirmware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(&self) -> LineTransport<FakeFirmware> {
        LineTransport::new("fake-grbl", self.clone(), Duration::from_millis(20))
    }
}

impl Read for FakeFirmware {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.out.is_empty() {
            state.release_ack();
        }
        if state.out.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(state.out.len());
        for (slot, byte) in buf.iter_mut().zip(state.out.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for FakeFirmware {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if let Some(limit) = state.fail_after_streamed {
            if state.streamed.len() >= limit {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
        }
        state.rx.extend_from_slice(buf);
        while let Some(pos) = state.rx.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = state.rx.drain(..=pos).collect();
            state.handle_line(raw);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ByteStream for FakeFirmware {
    fn bytes_to_read(&self) -> io::Result<u32> {
        Ok(self.state.lock().out.len() as u32)
    }
}

/// Session settings with the waits shortened for tests
pub fn test_config() -> SessionConfig {
    let mut config = SessionConfig::default();
    config.wakeup_drain = Duration::from_millis(0);
    config.command_settle = Duration::from_millis(1);
    config.stream.stall_timeout = Duration::from_millis(100);
    config
}

/// A session connected to a fresh firmware double
pub fn connected_session() -> (MachineSession, FakeFirmware) {
    let firmware = FakeFirmware::new();
    let session = MachineSession::new(test_config());
    session
        .connect(Box::new(firmware.transport()))
        .expect("connect to fake firmware");
    (session, firmware)
}

/// Records every event a session emits
pub fn record_events(session: &MachineSession) -> Arc<Mutex<Vec<SessionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    session.register_listener(Arc::new(move |event: &SessionEvent| {
        sink.lock().push(event.clone());
    }));
    events
}
