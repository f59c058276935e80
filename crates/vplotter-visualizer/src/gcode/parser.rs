//! G-Code program loading and motion parsing
//!
//! A program is kept in two forms: the cleaned lines that are streamed to
//! the controller, one per source line, and the motion instructions derived
//! from them for plotting.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vplotter_core::{GcodeError, Result};

use super::{AxisWord, MotionInstruction, MotionType};

/// Strip the `;` comment from a line, upper-case and trim what remains
pub fn clean_line(line: &str) -> String {
    let code = match line.find(';') {
        Some(ix) => &line[..ix],
        None => line,
    };
    code.trim().to_uppercase()
}

/// Parse one cleaned line into a motion instruction.
///
/// Only `G0/G00/G1/G01` lines with at least one `X` or `Y` word produce an
/// instruction. A word whose value is not a number is ignored.
pub fn parse_motion_line(line: &str, line_number: usize) -> Option<MotionInstruction> {
    let mut tokens = line.split_whitespace();
    let motion_type = MotionType::from_opcode(tokens.next()?)?;

    let mut x = AxisWord::Unchanged;
    let mut y = AxisWord::Unchanged;
    for token in tokens {
        let slot = if let Some(value) = token.strip_prefix('X') {
            Some((&mut x, value))
        } else {
            token.strip_prefix('Y').map(|value| (&mut y, value))
        };

        if let Some((axis, value)) = slot {
            match value.parse::<f64>() {
                Ok(v) => *axis = AxisWord::Present(v),
                Err(_) => warn!(
                    "Ignoring malformed axis word '{}' on line {}",
                    token, line_number
                ),
            }
        }
    }

    if !x.is_present() && !y.is_present() {
        return None;
    }

    Some(MotionInstruction {
        motion_type,
        x,
        y,
        line_number,
    })
}

/// A loaded G-code program
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GcodeProgram {
    lines: Vec<String>,
    instructions: Vec<MotionInstruction>,
}

impl GcodeProgram {
    /// Parse program text.
    ///
    /// Every source line yields exactly one cleaned line, empty or not.
    pub fn parse(text: &str) -> Self {
        let lines: Vec<String> = text.lines().map(clean_line).collect();
        let instructions: Vec<MotionInstruction> = lines
            .iter()
            .enumerate()
            .filter_map(|(ix, line)| parse_motion_line(line, ix + 1))
            .collect();

        debug!(
            "Parsed {} G-code lines, {} motion instructions",
            lines.len(),
            instructions.len()
        );

        Self {
            lines,
            instructions,
        }
    }

    /// Read and parse a program file
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| GcodeError::FileError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::parse(&text))
    }

    /// Cleaned lines, in source order
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Motion instructions, in source order
    pub fn instructions(&self) -> &[MotionInstruction] {
        &self.instructions
    }

    /// Number of lines to stream
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Check if the program has no lines
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_line_strips_comment_and_uppercases() {
        assert_eq!(clean_line("g1 x10 y5 ; comment"), "G1 X10 Y5");
        assert_eq!(clean_line("; whole line comment"), "");
        assert_eq!(clean_line("  m05  "), "M05");
        assert_eq!(clean_line("G0 X1;a;b"), "G0 X1");
    }

    #[test]
    fn test_parse_motion_line() {
        let inst = parse_motion_line("G1 X10 Y5", 3).unwrap();
        assert_eq!(inst.motion_type, MotionType::Linear);
        assert_eq!(inst.x, AxisWord::Present(10.0));
        assert_eq!(inst.y, AxisWord::Present(5.0));
        assert_eq!(inst.line_number, 3);

        let inst = parse_motion_line("G00 Y-2.5 F3000", 1).unwrap();
        assert_eq!(inst.motion_type, MotionType::Rapid);
        assert_eq!(inst.x, AxisWord::Unchanged);
        assert_eq!(inst.y, AxisWord::Present(-2.5));
    }

    #[test]
    fn test_lines_without_axes_are_skipped() {
        assert!(parse_motion_line("G1 F1000", 1).is_none());
        assert!(parse_motion_line("G90", 1).is_none());
        assert!(parse_motion_line("M03 S600", 1).is_none());
        assert!(parse_motion_line("", 1).is_none());
    }

    #[test]
    fn test_malformed_axis_word_is_ignored() {
        let inst = parse_motion_line("G1 XABC Y2", 1).unwrap();
        assert_eq!(inst.x, AxisWord::Unchanged);
        assert_eq!(inst.y, AxisWord::Present(2.0));
        assert!(parse_motion_line("G1 X", 1).is_none());
    }

    #[test]
    fn test_last_axis_word_wins() {
        let inst = parse_motion_line("G1 X1 X2", 1).unwrap();
        assert_eq!(inst.x, AxisWord::Present(2.0));
    }

    #[test]
    fn test_program_keeps_line_count() {
        let program = GcodeProgram::parse("G90\n\n; comment\nG1 X10 Y5 ; go\nM05\n");
        assert_eq!(program.len(), 5);
        assert_eq!(program.lines(), &["G90", "", "", "G1 X10 Y5", "M05"]);
        assert_eq!(program.instructions().len(), 1);
        assert_eq!(program.instructions()[0].line_number, 4);
    }

    #[test]
    fn test_parse_is_idempotent() {
        let text = "G0 X1\nG1 Y2 ; up\ng1 x3 y4\n";
        assert_eq!(GcodeProgram::parse(text), GcodeProgram::parse(text));
    }

    #[test]
    fn test_empty_program() {
        let program = GcodeProgram::parse("");
        assert!(program.is_empty());
        assert!(program.instructions().is_empty());
    }
}
