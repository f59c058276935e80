//! Firmware implementations
//!
//! Supported controllers:
//! - GRBL (0.9 report format), as used on vertical plotters

pub mod grbl;
