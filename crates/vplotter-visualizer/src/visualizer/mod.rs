//! Toolpath construction for plotting
//!
//! Turns parsed motion instructions into a forward-filled point sequence
//! split into rapid and linear moves.

pub mod toolpath;

pub use toolpath::{Bounds, PlotPoint, PointKind, Toolpath};
