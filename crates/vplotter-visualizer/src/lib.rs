//! # vplotter Visualizer
//!
//! G-code parsing and toolpath construction for vplotter.
//! Includes the line cleaner used for streaming, the G0/G1 motion parser,
//! and the forward-filled toolpath used for plotting.

pub mod gcode;
pub mod visualizer;

pub use gcode::{clean_line, parse_motion_line, AxisWord, GcodeProgram, MotionInstruction, MotionType};
pub use visualizer::{Bounds, PlotPoint, PointKind, Toolpath};
