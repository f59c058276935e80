//! GRBL character-counting streamer
//!
//! Streams program lines while keeping the firmware's serial receive buffer
//! from overflowing. Every sent line occupies its length plus one byte of
//! the buffer until the firmware acknowledges it with `ok` or `error`; a
//! line is only sent once the bytes still in flight leave room for it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};
use vplotter_core::{
    Error, ListenerRegistry, Result, SessionEvent, StreamError, StreamProgress, StreamReport,
    StreamState,
};
use vplotter_visualizer::GcodeProgram;

use super::utils::{describe_error, is_acknowledgment, is_command_error};
use crate::communication::{LineTerminator, Transport};

/// Serial receive buffer of a stock GRBL build
pub const DEFAULT_RX_BUFFER_SIZE: usize = 128;

/// Lines between progress events
pub const DEFAULT_PROGRESS_INTERVAL: usize = 10;

/// How long the firmware may stay silent while lines are outstanding
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Streaming parameters
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Firmware receive buffer capacity in bytes
    pub rx_buffer_size: usize,
    /// Emit progress on the first line and every this many lines after it
    pub progress_interval: usize,
    /// Fail the stream when no response arrives for this long
    pub stall_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            rx_buffer_size: DEFAULT_RX_BUFFER_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
        }
    }
}

/// Shared cancellation flag for a running stream
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the stream to stop after the line being sent
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear a previous request so the handle can be reused
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Byte accounting for lines the firmware has not acknowledged yet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamAckState {
    in_flight: VecDeque<usize>,
    in_flight_total: usize,
    lines_sent: usize,
    acks_received: usize,
}

impl StreamAckState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for a line about to be sent
    pub fn push(&mut self, bytes: usize) {
        self.in_flight.push_back(bytes);
        self.in_flight_total += bytes;
    }

    /// Release the oldest line on an acknowledgment.
    ///
    /// Returns the bytes freed, or `None` when nothing was in flight.
    pub fn acknowledge(&mut self) -> Option<usize> {
        let bytes = self.in_flight.pop_front()?;
        self.in_flight_total -= bytes;
        self.acks_received += 1;
        Some(bytes)
    }

    pub fn mark_sent(&mut self) {
        self.lines_sent += 1;
    }

    /// Bytes currently held in the firmware buffer
    pub fn in_flight_total(&self) -> usize {
        self.in_flight_total
    }

    /// Lines currently held in the firmware buffer
    pub fn queued_lines(&self) -> usize {
        self.in_flight.len()
    }

    pub fn lines_sent(&self) -> usize {
        self.lines_sent
    }

    pub fn acks_received(&self) -> usize {
        self.acks_received
    }

    /// Check that the running total matches the queued byte counts
    pub fn is_consistent(&self) -> bool {
        self.in_flight.iter().sum::<usize>() == self.in_flight_total
    }
}

/// Whether the line just sent gets a progress event
pub fn should_report_progress(lines_sent: usize, total_lines: usize, interval: usize) -> bool {
    lines_sent > 0
        && ((lines_sent - 1) % interval.max(1) == 0 || lines_sent == total_lines)
}

/// Remaining time, extrapolated from the average time per line so far
pub fn estimate_remaining(elapsed: Duration, lines_sent: usize, total_lines: usize) -> Duration {
    if lines_sent == 0 || lines_sent >= total_lines {
        return Duration::ZERO;
    }
    elapsed.mul_f64((total_lines - lines_sent) as f64 / lines_sent as f64)
}

fn stream_failure(line_number: usize, err: Error) -> Error {
    StreamError::Failure {
        line_number,
        reason: err.to_string(),
    }
    .into()
}

/// Drives one program through the character-counting protocol
#[derive(Debug)]
pub struct StreamingController {
    config: StreamConfig,
    state: StreamState,
    acks: StreamAckState,
    total_lines: usize,
    started: Option<Instant>,
    elapsed: Option<Duration>,
    failure: Option<String>,
}

impl StreamingController {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            state: StreamState::Idle,
            acks: StreamAckState::new(),
            total_lines: 0,
            started: None,
            elapsed: None,
            failure: None,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn ack_state(&self) -> &StreamAckState {
        &self.acks
    }

    /// Snapshot of the stream counters
    pub fn report(&self) -> StreamReport {
        let elapsed = self
            .elapsed
            .or_else(|| self.started.map(|s| s.elapsed()))
            .unwrap_or_default();
        StreamReport {
            state: self.state,
            lines_sent: self.acks.lines_sent(),
            acks_received: self.acks.acks_received(),
            total_lines: self.total_lines,
            elapsed,
            reason: self.failure.clone(),
        }
    }

    /// Stream every line of `program`.
    ///
    /// Returns the report of a completed or cancelled stream. A failed
    /// stream returns the error; its report still goes out with the
    /// `StreamFinished` event.
    pub fn run(
        &mut self,
        program: &GcodeProgram,
        transport: &mut dyn Transport,
        listeners: &ListenerRegistry,
        cancel: &CancelHandle,
    ) -> Result<StreamReport> {
        self.acks = StreamAckState::new();
        self.total_lines = program.len();
        self.started = Some(Instant::now());
        self.elapsed = None;
        self.failure = None;
        self.state = StreamState::Streaming;
        info!("Streaming {} lines", self.total_lines);

        let outcome = self.pump(program.lines(), transport, listeners, cancel);
        self.elapsed = self.started.map(|s| s.elapsed());

        let outcome = match outcome {
            Ok(state) => {
                self.state = state;
                Ok(())
            }
            Err(e) => {
                error!("Stream failed: {}", e);
                self.state = StreamState::Failed;
                self.failure = Some(e.to_string());
                listeners.emit(SessionEvent::Error(e.to_string()));
                Err(e)
            }
        };

        let report = self.report();
        info!("Stream {}", report);
        listeners.emit(SessionEvent::StreamFinished(report.clone()));
        outcome.map(|_| report)
    }

    fn pump(
        &mut self,
        lines: &[String],
        transport: &mut dyn Transport,
        listeners: &ListenerRegistry,
        cancel: &CancelHandle,
    ) -> Result<StreamState> {
        for (ix, line) in lines.iter().enumerate() {
            let line_number = ix + 1;
            self.acks.push(line.len() + 1);
            self.wait_for_room(line_number, transport, listeners)?;

            transport
                .send_line(line, LineTerminator::Streamed)
                .map_err(|e| stream_failure(line_number, e))?;
            self.acks.mark_sent();
            debug_assert!(self.acks.is_consistent());

            self.report_progress(listeners);

            if self.acks.lines_sent() < self.total_lines && cancel.is_cancelled() {
                info!(
                    "Stream cancelled after {}/{} lines",
                    self.acks.lines_sent(),
                    self.total_lines
                );
                return Ok(StreamState::Cancelled);
            }
        }
        Ok(StreamState::Completed)
    }

    /// Block until the line just queued fits in the firmware buffer and no
    /// response is waiting to be read.
    fn wait_for_room(
        &mut self,
        line_number: usize,
        transport: &mut dyn Transport,
        listeners: &ListenerRegistry,
    ) -> Result<()> {
        let limit = self.config.rx_buffer_size.saturating_sub(1);
        let mut last_response = Instant::now();

        loop {
            let full = self.acks.in_flight_total() >= limit;
            let pending = full
                || transport
                    .has_pending_input()
                    .map_err(|e| stream_failure(line_number, e))?;
            if !pending {
                return Ok(());
            }

            if full && self.acks.queued_lines() == 1 {
                return Err(StreamError::BufferOverflow {
                    line_number,
                    bytes: self.acks.in_flight_total(),
                    capacity: self.config.rx_buffer_size,
                }
                .into());
            }

            match transport
                .read_line()
                .map_err(|e| stream_failure(line_number, e))?
            {
                Some(response) => {
                    last_response = Instant::now();
                    self.handle_response(&response, listeners);
                }
                None if last_response.elapsed() >= self.config.stall_timeout => {
                    return Err(StreamError::Stalled {
                        timeout_ms: self.config.stall_timeout.as_millis() as u64,
                    }
                    .into());
                }
                None => {}
            }
        }
    }

    fn handle_response(&mut self, response: &str, listeners: &ListenerRegistry) {
        if !is_acknowledgment(response) {
            listeners.emit(SessionEvent::Diagnostic(response.to_string()));
            return;
        }

        if self.acks.acknowledge().is_none() {
            debug!("Acknowledgment '{}' with nothing in flight", response);
        }
        if is_command_error(response) {
            let detail = match describe_error(response) {
                Some(text) => format!("{} ({})", response, text),
                None => response.to_string(),
            };
            warn!("Controller rejected a line: {}", detail);
            listeners.emit(SessionEvent::Warning(format!(
                "Controller rejected a line: {}",
                detail
            )));
        }
    }

    fn report_progress(&self, listeners: &ListenerRegistry) {
        let sent = self.acks.lines_sent();
        if !should_report_progress(sent, self.total_lines, self.config.progress_interval) {
            return;
        }

        let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        listeners.emit(SessionEvent::Progress(StreamProgress {
            lines_sent: sent,
            total_lines: self.total_lines,
            elapsed,
            eta: estimate_remaining(elapsed, sent, self.total_lines),
        }));
    }
}
