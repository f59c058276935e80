use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use vplotter::{
    available_ports, init_logging, CancelHandle, Config, EventDispatcher, GcodeProgram,
    JogDirection, MachineSession, MotionType, PointKind, PollTask, SessionEvent, SessionListener,
    StreamState, Toolpath, BUILD_DATE, VERSION,
};

/// GRBL pen plotter controller
#[derive(Parser, Debug)]
#[command(
    name = "vplotter",
    version,
    about = "Jog, inspect and stream G-code to a GRBL pen plotter."
)]
struct Cli {
    /// Path to a TOML or JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Serial port, overriding the config file
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Enable debug messages
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream a G-code file under character-counting flow control
    Stream {
        file: PathBuf,
        /// Print every line sent and received
        #[arg(long)]
        echo: bool,
    },
    /// Summarize the toolpath of a G-code file without connecting
    Plot {
        file: PathBuf,
        /// Print the plot points as JSON
        #[arg(long)]
        json: bool,
        /// Write an SVG drawing of the toolpath
        #[arg(long)]
        svg: Option<PathBuf>,
    },
    /// Show the machine and work position
    Status {
        /// Keep polling until interrupted
        #[arg(long)]
        watch: bool,
    },
    /// Send one command and print the responses
    Send { command: String },
    /// Relative jog, e.g. `+x`, `-y` or `"+x -y"`
    Jog {
        #[arg(allow_hyphen_values = true, value_parser = parse_direction)]
        direction: JogDirection,
        /// Step in mm (defaults to machine.jog_step_mm)
        #[arg(long)]
        step: Option<f64>,
        /// Feed rate in mm/min (defaults to machine.jog_feed_rate)
        #[arg(long)]
        feed: Option<f64>,
    },
    /// Absolute move in work coordinates
    Move {
        #[arg(allow_negative_numbers = true)]
        x: f64,
        #[arg(allow_negative_numbers = true)]
        y: f64,
        /// Feed move (G1) instead of a rapid (G0)
        #[arg(long)]
        linear: bool,
    },
    /// Rapid to the work or machine origin
    Origin {
        #[arg(value_enum)]
        target: OriginTarget,
    },
    /// Clear the alarm lock
    Unlock,
    /// Feed hold
    Hold,
    /// Resume after a feed hold
    Resume,
    /// Make the current position the work origin
    Zero,
    /// Spindle (pen servo) control
    Spindle {
        #[command(subcommand)]
        action: SpindleAction,
    },
    /// Keep the steppers energized when idle, or release them
    MotorLock {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// List serial ports
    Ports,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum OriginTarget {
    Work,
    Machine,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Toggle {
    On,
    Off,
}

#[derive(Subcommand, Debug, PartialEq)]
enum SpindleAction {
    /// Spindle on at the configured (or given) speed
    On { speed: Option<u32> },
    Off,
    /// Set the speed without switching the spindle on
    Speed { speed: u32 },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum ConfigAction {
    /// Write the default config
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective config
    Show,
}

fn parse_direction(s: &str) -> Result<JogDirection, String> {
    s.parse::<JogDirection>().map_err(|e| e.to_string())
}

/// Prints session events for the operator
struct ConsolePrinter {
    traffic: bool,
}

impl SessionListener for ConsolePrinter {
    fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::LineSent(_) | SessionEvent::LineReceived(_) if !self.traffic => {}
            // Printed by the commands that ask for it.
            SessionEvent::PositionChanged(_) => {}
            SessionEvent::Warning(_) | SessionEvent::Error(_) => eprintln!("{}", event),
            _ => println!("{}", event),
        }
    }
}

/// Run a blocking session operation off the async runtime
async fn blocking<T, F>(session: &MachineSession, op: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&MachineSession) -> vplotter::Result<T> + Send + 'static,
{
    let session = session.clone();
    let result = tokio::task::spawn_blocking(move || op(&session))
        .await
        .context("session task panicked")?;
    Ok(result?)
}

async fn connect(config: &Config, traffic: bool) -> anyhow::Result<MachineSession> {
    if config.connection.port.trim().is_empty() {
        bail!("No serial port configured; pass --port or set connection.port");
    }

    let session = MachineSession::new(config.session_config());
    session.register_listener(Arc::new(ConsolePrinter { traffic }));
    blocking(&session, |s| s.connect_serial())
        .await
        .with_context(|| format!("Failed to connect to {}", config.connection.port))?;
    Ok(session)
}

async fn disconnect(session: &MachineSession) {
    if !session.is_connected() {
        return;
    }
    if let Err(e) = blocking(session, |s| s.disconnect()).await {
        warn!("Disconnect failed: {}", e);
    }
}

fn print_position(session: &MachineSession) {
    match session.position() {
        Some(snapshot) => println!("{}", snapshot),
        None => println!("Position unknown"),
    }
}

fn run_plot(file: &Path, json: bool, svg: Option<&Path>) -> anyhow::Result<()> {
    let program = GcodeProgram::load_file(file)?;
    let toolpath = Toolpath::from_program(&program);

    if let Some(out) = svg {
        std::fs::write(out, toolpath.svg_document())
            .with_context(|| format!("Failed to write {}", out.display()))?;
        info!("Wrote SVG to {}", out.display());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&toolpath)?);
        return Ok(());
    }

    println!(
        "{}: {} lines, {} moves",
        file.display(),
        program.len(),
        program.instructions().len()
    );
    if let Some(b) = toolpath.bounds() {
        println!(
            "Bounds: x {:.1}..{:.1} mm, y {:.1}..{:.1} mm ({:.1} x {:.1} mm)",
            b.min_x,
            b.max_x,
            b.min_y,
            b.max_y,
            b.width(),
            b.height()
        );
    }
    println!(
        "Travel: {:.1} mm rapid, {:.1} mm linear",
        toolpath.travel(PointKind::Rapid),
        toolpath.travel(PointKind::Linear)
    );
    Ok(())
}

fn run_config(action: &ConfigAction, config: &Config, path: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!(
                    "{} already exists; use --force to overwrite",
                    path.display()
                );
            }
            Config::default().save_to_file(path)?;
            println!("Wrote default config to {}", path.display());
        }
        ConfigAction::Show => {
            println!("# {}", path.display());
            print!("{}", config.to_toml_string()?);
        }
    }
    Ok(())
}

async fn run_stream(config: &Config, file: &Path, echo: bool) -> anyhow::Result<()> {
    let program = GcodeProgram::load_file(file)?;
    if program.is_empty() {
        bail!("{} is empty", file.display());
    }

    let session = connect(config, echo).await?;
    let cancel = CancelHandle::new();
    let interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current line");
            interrupt.cancel();
        }
    });

    let result = blocking(&session, move |s| s.stream(&program, &cancel)).await;
    watcher.abort();
    disconnect(&session).await;

    let report = result?;
    if report.state == StreamState::Cancelled {
        bail!("Stream cancelled after {} lines", report.lines_sent);
    }
    Ok(())
}

async fn run_status(config: &Config, watch: bool) -> anyhow::Result<()> {
    let session = connect(config, false).await?;
    print_position(&session);

    if watch {
        let dispatcher = EventDispatcher::default();
        let mut events = dispatcher.subscribe();
        session.register_listener(Arc::new(dispatcher));
        let poller = PollTask::spawn(session.clone(), config.session_config().poll_interval);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                event = events.recv() => match event {
                    Ok(SessionEvent::PositionChanged(snapshot)) => println!("{}", snapshot),
                    Ok(SessionEvent::Disconnected) | Err(RecvError::Closed) => break,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => debug!("Skipped {} events", skipped),
                },
            }
        }
        poller.stop().await;
    }

    disconnect(&session).await;
    Ok(())
}

/// Commands that only need an ad hoc exchange with the plotter
async fn run_machine(config: &Config, command: Commands) -> anyhow::Result<()> {
    let session = connect(config, true).await?;
    let result = blocking(&session, move |s| match command {
        Commands::Send { command } => s.send_command(&command),
        Commands::Jog {
            direction,
            step,
            feed,
        } => {
            let defaults = s.config();
            s.jog(
                direction,
                step.unwrap_or(defaults.jog_step_mm),
                feed.unwrap_or(defaults.jog_feed_rate),
            )
        }
        Commands::Move { x, y, linear } => {
            let motion = if linear {
                MotionType::Linear
            } else {
                MotionType::Rapid
            };
            s.move_to(motion, x, y)
        }
        Commands::Origin {
            target: OriginTarget::Work,
        } => s.go_to_work_origin(),
        Commands::Origin {
            target: OriginTarget::Machine,
        } => s.go_to_machine_origin(),
        Commands::Unlock => s.unlock(),
        Commands::Hold => s.feed_hold(),
        Commands::Resume => s.feed_resume(),
        Commands::Zero => s.zero_work_offset(),
        Commands::Spindle { action } => match action {
            SpindleAction::On { speed } => s.spindle_on(speed.unwrap_or(s.config().spindle_speed)),
            SpindleAction::Off => s.spindle_off(),
            SpindleAction::Speed { speed } => s.set_spindle_speed(speed),
        },
        Commands::MotorLock { state } => s.set_motor_lock(state == Toggle::On),
        other => Err(vplotter::Error::other(format!(
            "{:?} does not talk to the plotter",
            other
        ))),
    })
    .await;

    print_position(&session);
    disconnect(&session).await;
    let responses = result?;
    debug!("{} responses", responses.len());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    debug!("vplotter {} (built {})", VERSION, BUILD_DATE);

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::default_path()?,
    };

    if let Commands::Config { action } = &cli.command {
        // `init` must work even when the existing file no longer validates.
        let config = match action {
            ConfigAction::Init { .. } => Config::default(),
            ConfigAction::Show => Config::load_or_default(&config_path)?,
        };
        return run_config(action, &config, &config_path);
    }

    let mut config = Config::load_or_default(&config_path)?;
    if let Some(port) = cli.port {
        config.connection.port = port;
    }

    match cli.command {
        Commands::Ports => {
            let ports = available_ports()?;
            if ports.is_empty() {
                println!("No serial ports found");
            }
            for port in ports {
                println!("{}", port);
            }
            Ok(())
        }
        Commands::Plot { file, json, svg } => run_plot(&file, json, svg.as_deref()),
        Commands::Stream { file, echo } => run_stream(&config, &file, echo).await,
        Commands::Status { watch } => run_status(&config, watch).await,
        command => run_machine(&config, command).await,
    }
}
