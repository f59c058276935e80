//! G-Code program handling
//!
//! This module provides:
//! - Line cleaning (comment removal, normalization)
//! - Motion instruction parsing for G0/G1 lines
//! - Program loading from files

pub mod command;
pub mod parser;

pub use command::*;
pub use parser::*;
