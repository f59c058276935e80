//! GRBL Protocol Utilities
//!
//! Response classification shared by the streamer and the command path.

/// Check if a response line acknowledges a sent line.
///
/// Any line containing `ok` or `error` frees the slot of the oldest
/// unacknowledged line.
pub fn is_acknowledgment(line: &str) -> bool {
    line.contains("ok") || line.contains("error")
}

/// Check if a response reports a rejected line
pub fn is_command_error(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("error") || trimmed.starts_with("ALARM") || trimmed.starts_with("alarm")
}

/// Look up the description of a numbered `error:N` response
pub fn describe_error(line: &str) -> Option<&'static str> {
    let code = line.trim().strip_prefix("error:")?.trim().parse::<u8>().ok()?;
    let text = match code {
        1 => "Expected command letter",
        2 => "Bad number format",
        3 => "Invalid statement",
        4 => "Negative value",
        5 => "Setting disabled",
        9 => "G-code locked out during alarm or jog state",
        15 => "Jog target exceeds machine travel",
        20 => "Unsupported or invalid g-code command",
        21 => "Modal group violation",
        22 => "Undefined feed rate",
        23 => "Failed to execute startup block",
        24 => "EEPROM read failed",
        _ => return None,
    };
    Some(text)
}
