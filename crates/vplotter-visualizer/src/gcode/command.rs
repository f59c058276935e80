//! Motion instruction types

use serde::{Deserialize, Serialize};

/// Motion opcode of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionType {
    /// G0/G00 non-cutting positioning move
    Rapid,
    /// G1/G01 controlled-feed move
    Linear,
}

impl MotionType {
    /// Map a G-code opcode token to a motion type
    pub fn from_opcode(token: &str) -> Option<Self> {
        match token {
            "G0" | "G00" => Some(Self::Rapid),
            "G1" | "G01" => Some(Self::Linear),
            _ => None,
        }
    }
}

impl std::fmt::Display for MotionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rapid => write!(f, "G0"),
            Self::Linear => write!(f, "G1"),
        }
    }
}

/// One axis word of a motion instruction.
///
/// An axis left out of a G-code line keeps its previous value. The parser
/// records that as `Unchanged`; resolving it is left to whoever consumes the
/// instruction.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum AxisWord {
    /// Axis given explicitly on the line
    Present(f64),
    /// Axis not given; inherits the previous value
    #[default]
    Unchanged,
}

impl AxisWord {
    /// Check if the axis was given on the line
    pub fn is_present(&self) -> bool {
        matches!(self, AxisWord::Present(_))
    }

    /// The explicit value, if any
    pub fn value(&self) -> Option<f64> {
        match self {
            AxisWord::Present(v) => Some(*v),
            AxisWord::Unchanged => None,
        }
    }

    /// Resolve against the previous value of this axis
    pub fn resolve(&self, previous: f64) -> f64 {
        self.value().unwrap_or(previous)
    }
}

/// One normalized motion step parsed from a program line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionInstruction {
    /// Rapid or linear move
    pub motion_type: MotionType,
    /// X target
    pub x: AxisWord,
    /// Y target
    pub y: AxisWord,
    /// 1-based line in the source program
    pub line_number: usize,
}
