//! GRBL Command Creator
//!
//! Formats motion and utility commands for the plotter firmware from typed
//! parameters. Nothing here performs I/O; invalid parameters are rejected
//! before a command string exists.

use std::fmt;
use std::str::FromStr;

use vplotter_core::units::{format_feed_rate, format_position, format_signed_position};
use vplotter_core::{Error, PollError, PositionSnapshot, Result};
use vplotter_visualizer::MotionType;

/// Written raw right after the port opens to wake the firmware
pub const WAKE_UP: &[u8] = b"\r\n\r\n";

/// Status report query
pub const STATUS_QUERY: &str = "?";

/// Coordinate offset report query
pub const OFFSET_QUERY: &str = "$#";

/// Clear the alarm lock
pub const UNLOCK: &str = "$X";

/// Zero the G54 work offset at the current position
pub const ZERO_WORK_OFFSET: &str = "G10 L20 P1 X0 Y0 Z0";

/// Back to absolute distance mode
pub const ABSOLUTE_MODE: &str = "G90";

/// Spindle (pen servo) off
pub const SPINDLE_OFF: &str = "M05";

/// Steppers stay energized when idle
const MOTOR_LOCK_ON: &str = "$1=255";

/// Steppers release when idle
const MOTOR_LOCK_OFF: &str = "$1=0";

/// Small move applied after changing the idle delay so it takes effect
const NUDGE_MM: f64 = 0.1;
const NUDGE_FEED: f64 = 1000.0;

/// Single-character commands the firmware acts on immediately
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealTimeCommand {
    /// Request status report
    StatusQuery,
    /// Feed hold (pause)
    FeedHold,
    /// Cycle start/resume
    CycleStart,
}

impl RealTimeCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatusQuery => STATUS_QUERY,
            Self::FeedHold => "!",
            Self::CycleStart => "~",
        }
    }
}

/// One of the eight jog directions in the XY plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JogDirection {
    XMinus,
    XPlus,
    YMinus,
    YPlus,
    XMinusYMinus,
    XMinusYPlus,
    XPlusYMinus,
    XPlusYPlus,
}

impl JogDirection {
    /// Unit step signs as (x, y); 0 leaves the axis out
    pub fn components(&self) -> (i8, i8) {
        match self {
            Self::XMinus => (-1, 0),
            Self::XPlus => (1, 0),
            Self::YMinus => (0, -1),
            Self::YPlus => (0, 1),
            Self::XMinusYMinus => (-1, -1),
            Self::XMinusYPlus => (-1, 1),
            Self::XPlusYMinus => (1, -1),
            Self::XPlusYPlus => (1, 1),
        }
    }

    fn from_components(x: i8, y: i8) -> Option<Self> {
        match (x, y) {
            (-1, 0) => Some(Self::XMinus),
            (1, 0) => Some(Self::XPlus),
            (0, -1) => Some(Self::YMinus),
            (0, 1) => Some(Self::YPlus),
            (-1, -1) => Some(Self::XMinusYMinus),
            (-1, 1) => Some(Self::XMinusYPlus),
            (1, -1) => Some(Self::XPlusYMinus),
            (1, 1) => Some(Self::XPlusYPlus),
            _ => None,
        }
    }
}

impl FromStr for JogDirection {
    type Err = Error;

    /// Parse tags like `"+x"`, `"-x -y"` or `"+x+y"`
    fn from_str(s: &str) -> Result<Self> {
        let invalid =
            || Error::invalid_parameter("direction", format!("unknown jog direction '{}'", s));

        let compact: Vec<char> = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        if compact.is_empty() || compact.len() % 2 != 0 {
            return Err(invalid());
        }

        let (mut x, mut y) = (0i8, 0i8);
        for pair in compact.chunks(2) {
            let sign = match pair[0] {
                '+' => 1,
                '-' => -1,
                _ => return Err(invalid()),
            };
            let axis = match pair[1] {
                'x' => &mut x,
                'y' => &mut y,
                _ => return Err(invalid()),
            };
            if *axis != 0 {
                return Err(invalid());
            }
            *axis = sign;
        }

        Self::from_components(x, y).ok_or_else(invalid)
    }
}

impl fmt::Display for JogDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = |v: i8| if v < 0 { '-' } else { '+' };
        match self.components() {
            (x, 0) => write!(f, "{}x", sign(x)),
            (0, y) => write!(f, "{}y", sign(y)),
            (x, y) => write!(f, "{}x {}y", sign(x), sign(y)),
        }
    }
}

fn require_positive(param: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::invalid_parameter(
            param,
            format!("must be a positive number, got {}", value),
        ))
    }
}

fn require_finite(param: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::invalid_parameter(param, "must be a finite number"))
    }
}

/// Avoid printing `-0.0` for a zero coordinate
fn tidy(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        value
    }
}

/// Command string formatting for the plotter firmware
pub struct CommandBuilder;

impl CommandBuilder {
    /// Relative rapid jog followed by a return to absolute mode.
    ///
    /// Only the axes named by `direction` appear, as lower-case letters with
    /// an explicit sign.
    pub fn jog(direction: JogDirection, step_mm: f64, feed_rate: f64) -> Result<Vec<String>> {
        require_positive("step_mm", step_mm)?;
        require_positive("feed_rate", feed_rate)?;

        let (dx, dy) = direction.components();
        let mut jog = String::from("G91 G0");
        if dx != 0 {
            jog.push_str(" x");
            jog.push_str(&format_signed_position(f64::from(dx) * step_mm));
        }
        if dy != 0 {
            jog.push_str(" y");
            jog.push_str(&format_signed_position(f64::from(dy) * step_mm));
        }
        jog.push_str(" F");
        jog.push_str(&format_feed_rate(feed_rate));

        Ok(vec![jog, ABSOLUTE_MODE.to_string()])
    }

    /// Absolute move to (x, y) in work coordinates
    pub fn absolute_move(motion: MotionType, x: f64, y: f64, feed_rate: f64) -> Result<String> {
        require_finite("x", x)?;
        require_finite("y", y)?;
        require_positive("feed_rate", feed_rate)?;
        Ok(format!(
            "{} x{} y{} F{}",
            motion,
            format_position(tidy(x)),
            format_position(tidy(y)),
            format_feed_rate(feed_rate)
        ))
    }

    /// Rapid to the work coordinate origin
    pub fn go_to_work_origin(feed_rate: f64) -> Result<String> {
        Self::absolute_move(MotionType::Rapid, 0.0, 0.0, feed_rate)
    }

    /// Rapid to the machine origin, expressed in work coordinates
    pub fn go_to_machine_origin(
        snapshot: Option<&PositionSnapshot>,
        feed_rate: f64,
    ) -> Result<String> {
        let snapshot = snapshot.ok_or(PollError::NoSnapshot)?;
        Self::absolute_move(
            MotionType::Rapid,
            -snapshot.work_offset_x,
            -snapshot.work_offset_y,
            feed_rate,
        )
    }

    /// Set the idle delay so the steppers stay locked (or release), then
    /// nudge Y back and forth so the setting applies.
    pub fn motor_lock(enabled: bool) -> Vec<String> {
        let setting = if enabled {
            MOTOR_LOCK_ON
        } else {
            MOTOR_LOCK_OFF
        };
        let nudge = |dy: f64| {
            format!(
                "G91 G0 Y{} F{}",
                format_position(dy),
                format_feed_rate(NUDGE_FEED)
            )
        };
        vec![
            setting.to_string(),
            nudge(NUDGE_MM),
            nudge(-NUDGE_MM),
            ABSOLUTE_MODE.to_string(),
        ]
    }

    pub fn unlock() -> String {
        UNLOCK.to_string()
    }

    pub fn feed_hold() -> String {
        RealTimeCommand::FeedHold.as_str().to_string()
    }

    pub fn feed_resume() -> String {
        RealTimeCommand::CycleStart.as_str().to_string()
    }

    pub fn zero_work_offset() -> String {
        ZERO_WORK_OFFSET.to_string()
    }

    pub fn spindle_speed(speed: u32) -> String {
        format!("S{}", speed)
    }

    pub fn spindle_on(speed: u32) -> String {
        format!("M03 S{}", speed)
    }

    pub fn spindle_off() -> String {
        SPINDLE_OFF.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jog_diagonal() {
        let dir: JogDirection = "+x -y".parse().unwrap();
        assert_eq!(dir, JogDirection::XPlusYMinus);
        assert_eq!(
            CommandBuilder::jog(dir, 5.0, 1000.0).unwrap(),
            vec!["G91 G0 x+5.0 y-5.0 F1000", "G90"]
        );
    }

    #[test]
    fn test_jog_single_axis() {
        assert_eq!(
            CommandBuilder::jog(JogDirection::YPlus, 2.5, 600.0).unwrap(),
            vec!["G91 G0 y+2.5 F600", "G90"]
        );
        assert_eq!(
            CommandBuilder::jog(JogDirection::XMinus, 10.0, 1500.0).unwrap()[0],
            "G91 G0 x-10.0 F1500"
        );
    }

    #[test]
    fn test_jog_rejects_bad_parameters() {
        assert!(CommandBuilder::jog(JogDirection::XPlus, 0.0, 1000.0)
            .unwrap_err()
            .is_invalid_parameter());
        assert!(CommandBuilder::jog(JogDirection::XPlus, 5.0, -1.0)
            .unwrap_err()
            .is_invalid_parameter());
        assert!(CommandBuilder::jog(JogDirection::XPlus, f64::NAN, 1000.0).is_err());
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("-x".parse::<JogDirection>().unwrap(), JogDirection::XMinus);
        assert_eq!("-X+Y".parse::<JogDirection>().unwrap(), JogDirection::XMinusYPlus);
        assert_eq!("+y +x".parse::<JogDirection>().unwrap(), JogDirection::XPlusYPlus);
        assert!("x".parse::<JogDirection>().is_err());
        assert!("+x +x".parse::<JogDirection>().is_err());
        assert!("+z".parse::<JogDirection>().is_err());
        assert!("".parse::<JogDirection>().is_err());
        assert_eq!(JogDirection::XMinusYMinus.to_string(), "-x -y");
    }

    #[test]
    fn test_absolute_moves() {
        assert_eq!(
            CommandBuilder::absolute_move(MotionType::Linear, 12.34, -5.0, 800.0).unwrap(),
            "G1 x12.3 y-5.0 F800"
        );
        assert_eq!(
            CommandBuilder::go_to_work_origin(1000.0).unwrap(),
            "G0 x0.0 y0.0 F1000"
        );
        assert!(CommandBuilder::absolute_move(MotionType::Rapid, f64::INFINITY, 0.0, 1.0)
            .unwrap_err()
            .is_invalid_parameter());
    }

    #[test]
    fn test_machine_origin_uses_offset() {
        let snap = PositionSnapshot::new((30.0, 40.0), (10.0, -20.0));
        assert_eq!(
            CommandBuilder::go_to_machine_origin(Some(&snap), 1000.0).unwrap(),
            "G0 x-10.0 y20.0 F1000"
        );
        assert!(matches!(
            CommandBuilder::go_to_machine_origin(None, 1000.0),
            Err(Error::Poll(PollError::NoSnapshot))
        ));
    }

    #[test]
    fn test_utility_commands() {
        assert_eq!(
            CommandBuilder::motor_lock(true),
            vec!["$1=255", "G91 G0 Y0.1 F1000", "G91 G0 Y-0.1 F1000", "G90"]
        );
        assert_eq!(CommandBuilder::motor_lock(false)[0], "$1=0");
        assert_eq!(CommandBuilder::unlock(), "$X");
        assert_eq!(CommandBuilder::feed_hold(), "!");
        assert_eq!(CommandBuilder::feed_resume(), "~");
        assert_eq!(CommandBuilder::spindle_speed(600), "S600");
        assert_eq!(CommandBuilder::spindle_on(600), "M03 S600");
        assert_eq!(CommandBuilder::spindle_off(), "M05");
        assert_eq!(CommandBuilder::zero_work_offset(), "G10 L20 P1 X0 Y0 Z0");
    }
}
