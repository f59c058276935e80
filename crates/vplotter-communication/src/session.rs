//! Machine session
//!
//! `MachineSession` owns the transport and is the single entry point for
//! connecting, ad hoc commands, position polls and program streams. At most
//! one of those uses the transport at a time: each operation takes a lease
//! on the session state and the lease hands the state back to `Idle` when
//! it is dropped.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, trace, warn};
use vplotter_core::{
    thread_safe, ConnectionError, Error, ListenerHandle, ListenerRegistry, PositionSnapshot,
    Result, SessionEvent, SessionListener, SessionState, SharedPosition, StreamError,
    StreamReport, ThreadSafe,
};
use vplotter_visualizer::{GcodeProgram, MotionType};

use crate::communication::{
    ConnectionParams, EchoTransport, LineTerminator, SerialTransport, Transport,
};
use crate::firmware::grbl::command_creator::WAKE_UP;
use crate::firmware::grbl::utils::is_command_error;
use crate::firmware::grbl::{
    CancelHandle, CommandBuilder, JogDirection, StatusPoller, StreamConfig, StreamingController,
};

/// Session settings
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Serial link parameters
    pub connection: ConnectionParams,
    /// How long startup output is discarded after the wake-up sequence
    pub wakeup_drain: Duration,
    /// Pause after a command before reading, and again after reading
    pub command_settle: Duration,
    /// Spindle (pen servo) speed sent on connect and by `spindle_on`
    pub spindle_speed: u32,
    /// Keep the steppers energized when idle
    pub motor_lock: bool,
    /// Default jog step (mm)
    pub jog_step_mm: f64,
    /// Default jog feed rate (mm/min)
    pub jog_feed_rate: f64,
    /// Feed rate for absolute moves and origin returns (mm/min)
    pub move_feed_rate: f64,
    /// Interval of the background position poll
    pub poll_interval: Duration,
    /// Streaming parameters
    pub stream: StreamConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionParams::default(),
            wakeup_drain: Duration::from_secs(2),
            command_settle: Duration::from_millis(100),
            spindle_speed: 600,
            motor_lock: true,
            jog_step_mm: 1.0,
            jog_feed_rate: 5000.0,
            move_feed_rate: 5000.0,
            poll_interval: Duration::from_millis(500),
            stream: StreamConfig::default(),
        }
    }
}

/// Result of a position refresh
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PollOutcome {
    /// A new snapshot was committed
    Updated(PositionSnapshot),
    /// Another operation held the transport, or nothing is connected
    Skipped,
}

/// Exclusive claim on the transport; returns the session to `Idle` on drop
#[derive(Debug)]
struct SessionLease<'a> {
    state: &'a parking_lot::Mutex<SessionState>,
}

impl Drop for SessionLease<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        // A failure may already have dropped the session to Disconnected.
        if state.is_busy() {
            *state = SessionState::Idle;
        }
    }
}

fn is_fatal(err: &Error) -> bool {
    err.is_io_error() || matches!(err, Error::Stream(StreamError::Failure { .. }))
}

/// Connection to one plotter
#[derive(Clone)]
pub struct MachineSession {
    config: Arc<SessionConfig>,
    transport: ThreadSafe<Option<Box<dyn Transport>>>,
    state: ThreadSafe<SessionState>,
    position: SharedPosition,
    listeners: ListenerRegistry,
    poller: StatusPoller,
}

impl MachineSession {
    /// Create a disconnected session
    pub fn new(config: SessionConfig) -> Self {
        let poller = StatusPoller::new(config.command_settle);
        Self {
            config: Arc::new(config),
            transport: thread_safe(None),
            state: thread_safe(SessionState::Disconnected),
            position: SharedPosition::new(),
            listeners: ListenerRegistry::new(),
            poller,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Latest committed position, if any
    pub fn position(&self) -> Option<PositionSnapshot> {
        self.position.snapshot()
    }

    /// Handle to the shared position for concurrent readers
    pub fn shared_position(&self) -> SharedPosition {
        self.position.clone()
    }

    /// Register a listener for session events
    pub fn register_listener(&self, listener: Arc<dyn SessionListener>) -> ListenerHandle {
        self.listeners.register(listener)
    }

    /// Remove a listener
    pub fn unregister_listener(&self, handle: &ListenerHandle) {
        self.listeners.unregister(handle)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Open the configured serial port and connect through it
    pub fn connect_serial(&self) -> Result<()> {
        if self.is_connected() {
            return Err(ConnectionError::AlreadyConnected.into());
        }
        let transport = SerialTransport::open(&self.config.connection)?;
        self.connect(Box::new(transport))
    }

    /// Take ownership of an open transport.
    ///
    /// Wakes the firmware, discards its startup output and sends the
    /// configured spindle speed.
    pub fn connect(&self, mut transport: Box<dyn Transport>) -> Result<()> {
        if self.is_connected() {
            return Err(ConnectionError::AlreadyConnected.into());
        }

        let name = transport.name();
        info!("Initializing controller on {}", name);
        if let Err(e) = self.handshake(transport.as_mut()) {
            error!("Handshake with {} failed: {}", name, e);
            let _ = transport.close();
            return Err(e);
        }

        {
            let mut state = self.state.lock();
            if state.is_connected() {
                drop(state);
                let _ = transport.close();
                return Err(ConnectionError::AlreadyConnected.into());
            }
            *self.transport.lock() = Some(transport);
            *state = SessionState::Idle;
        }

        info!("Connected to {}", name);
        self.listeners.emit(SessionEvent::Connected(name));
        self.set_spindle_speed(self.config.spindle_speed)?;
        Ok(())
    }

    fn handshake(&self, transport: &mut dyn Transport) -> Result<()> {
        let mut link = EchoTransport::new(transport, &self.listeners);
        link.write_raw(WAKE_UP)?;
        for line in link.drain(self.config.wakeup_drain)? {
            debug!("Startup output: {}", line);
        }
        Ok(())
    }

    /// Close the transport
    pub fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            SessionState::Disconnected => return Err(ConnectionError::NotConnected.into()),
            SessionState::Idle => {}
            busy => {
                return Err(ConnectionError::Busy {
                    activity: busy.to_string(),
                }
                .into())
            }
        }

        if let Some(mut transport) = self.transport.lock().take() {
            if let Err(e) = transport.close() {
                warn!("Error while closing {}: {}", transport.name(), e);
            }
        }
        *state = SessionState::Disconnected;
        drop(state);

        self.position.clear();
        info!("Disconnected");
        self.listeners.emit(SessionEvent::Disconnected);
        Ok(())
    }

    fn acquire(&self, activity: SessionState) -> Result<SessionLease<'_>> {
        let mut state = self.state.lock();
        match *state {
            SessionState::Disconnected => Err(ConnectionError::NotConnected.into()),
            current if current.can_transition_to(activity) && !current.is_busy() => {
                *state = activity;
                Ok(SessionLease { state: &self.state })
            }
            current => Err(ConnectionError::Busy {
                activity: current.to_string(),
            }
            .into()),
        }
    }

    /// Run `op` on the transport; the caller must hold a lease.
    ///
    /// A fatal transport failure closes the connection.
    fn with_transport<T>(
        &self,
        echo: bool,
        op: impl FnOnce(&mut dyn Transport) -> Result<T>,
    ) -> Result<T> {
        let mut slot = self.transport.lock();
        let transport = match slot.as_mut() {
            Some(transport) => transport,
            None => return Err(ConnectionError::NotConnected.into()),
        };

        let result = if echo {
            op(&mut EchoTransport::new(transport.as_mut(), &self.listeners))
        } else {
            op(transport.as_mut())
        };

        let lost = match &result {
            Err(e) if is_fatal(e) => {
                error!("Closing connection after failure: {}", e);
                if let Some(mut transport) = slot.take() {
                    let _ = transport.close();
                }
                *self.state.lock() = SessionState::Disconnected;
                self.position.clear();
                true
            }
            _ => false,
        };
        // Listeners may reconnect from this event, so the slot must be free.
        drop(slot);
        if lost {
            self.listeners.emit(SessionEvent::Disconnected);
        }
        result
    }

    /// Send one interactive command and collect its responses.
    ///
    /// Waits the settle time before and after reading, then refreshes the
    /// position.
    pub fn send_command(&self, command: &str) -> Result<Vec<String>> {
        let settle = self.config.command_settle;
        let result = self.acquire(SessionState::Command).and_then(|_lease| {
            self.with_transport(true, |link| {
                link.send_line(command, LineTerminator::Interactive)?;
                thread::sleep(settle);
                let responses = link.read_available_lines()?;
                thread::sleep(settle);
                Ok(responses)
            })
        });

        match &result {
            Ok(responses) => {
                for response in responses.iter().filter(|r| is_command_error(r)) {
                    warn!("'{}' was rejected: {}", command, response);
                    self.listeners.emit(SessionEvent::Warning(format!(
                        "'{}' was rejected: {}",
                        command, response
                    )));
                }
            }
            Err(e) => {
                error!("Command '{}' failed: {}", command, e);
                self.listeners.emit(SessionEvent::Error(e.to_string()));
            }
        }

        if let Err(e) = self.refresh_position() {
            debug!("Position refresh after '{}' failed: {}", command, e);
        }
        result
    }

    /// Send commands one after another, stopping at the first failure
    pub fn send_commands<S: AsRef<str>>(&self, commands: &[S]) -> Result<Vec<String>> {
        let mut responses = Vec::new();
        for command in commands {
            responses.extend(self.send_command(command.as_ref())?);
        }
        Ok(responses)
    }

    /// Poll position and offset and commit a new snapshot.
    ///
    /// Skipped while another operation holds the transport or nothing is
    /// connected. A malformed report keeps the previous snapshot and is
    /// reported as a warning.
    pub fn refresh_position(&self) -> Result<PollOutcome> {
        let _lease = match self.acquire(SessionState::Polling) {
            Ok(lease) => lease,
            Err(e) => {
                trace!("Position poll skipped: {}", e);
                return Ok(PollOutcome::Skipped);
            }
        };

        let poller = &self.poller;
        let position = &self.position;
        match self.with_transport(false, |transport| poller.update(transport, position)) {
            Ok(snapshot) => {
                self.listeners.emit(SessionEvent::PositionChanged(snapshot));
                Ok(PollOutcome::Updated(snapshot))
            }
            Err(e) => {
                if e.is_malformed_status() {
                    warn!("Position poll failed: {}", e);
                    self.listeners.emit(SessionEvent::Warning(e.to_string()));
                } else {
                    self.listeners.emit(SessionEvent::Error(e.to_string()));
                }
                Err(e)
            }
        }
    }

    /// Stream a program under character-counting flow control.
    ///
    /// Fails with `Busy` while another operation holds the transport.
    pub fn stream(&self, program: &GcodeProgram, cancel: &CancelHandle) -> Result<StreamReport> {
        let _lease = self.acquire(SessionState::Streaming)?;
        let listeners = &self.listeners;
        let mut controller = StreamingController::new(self.config.stream.clone());
        self.with_transport(true, |link| controller.run(program, link, listeners, cancel))
    }

    /// Relative jog
    pub fn jog(
        &self,
        direction: JogDirection,
        step_mm: f64,
        feed_rate: f64,
    ) -> Result<Vec<String>> {
        let commands = CommandBuilder::jog(direction, step_mm, feed_rate)?;
        self.send_commands(&commands)
    }

    /// Relative jog with the configured step and feed rate
    pub fn jog_default(&self, direction: JogDirection) -> Result<Vec<String>> {
        self.jog(direction, self.config.jog_step_mm, self.config.jog_feed_rate)
    }

    /// Absolute move at the configured feed rate
    pub fn move_to(&self, motion: MotionType, x: f64, y: f64) -> Result<Vec<String>> {
        let command = CommandBuilder::absolute_move(motion, x, y, self.config.move_feed_rate)?;
        self.send_command(&command)
    }

    pub fn go_to_work_origin(&self) -> Result<Vec<String>> {
        let command = CommandBuilder::go_to_work_origin(self.config.move_feed_rate)?;
        self.send_command(&command)
    }

    /// Rapid to the machine origin using the last polled work offset
    pub fn go_to_machine_origin(&self) -> Result<Vec<String>> {
        let snapshot = self.position();
        let command =
            CommandBuilder::go_to_machine_origin(snapshot.as_ref(), self.config.move_feed_rate)?;
        self.send_command(&command)
    }

    /// Clear the alarm lock and re-apply the configured motor lock
    pub fn unlock(&self) -> Result<Vec<String>> {
        let mut responses = self.send_command(&CommandBuilder::unlock())?;
        responses.extend(self.set_motor_lock(self.config.motor_lock)?);
        Ok(responses)
    }

    pub fn set_motor_lock(&self, enabled: bool) -> Result<Vec<String>> {
        self.send_commands(&CommandBuilder::motor_lock(enabled))
    }

    pub fn feed_hold(&self) -> Result<Vec<String>> {
        self.send_command(&CommandBuilder::feed_hold())
    }

    pub fn feed_resume(&self) -> Result<Vec<String>> {
        self.send_command(&CommandBuilder::feed_resume())
    }

    /// Make the current position the work origin
    pub fn zero_work_offset(&self) -> Result<Vec<String>> {
        self.send_command(&CommandBuilder::zero_work_offset())
    }

    pub fn set_spindle_speed(&self, speed: u32) -> Result<Vec<String>> {
        self.send_command(&CommandBuilder::spindle_speed(speed))
    }

    pub fn spindle_on(&self, speed: u32) -> Result<Vec<String>> {
        self.send_command(&CommandBuilder::spindle_on(speed))
    }

    pub fn spindle_off(&self) -> Result<Vec<String>> {
        self.send_command(&CommandBuilder::spindle_off())
    }
}
