//! Number and duration formatting
//!
//! The firmware is fed positions with one decimal place and feed rates or
//! speeds with none. Durations are shown to the operator as hours, minutes
//! and seconds.

use std::time::Duration;

/// Format a position in mm with one decimal place
pub fn format_position(value_mm: f64) -> String {
    format!("{:.1}", value_mm)
}

/// Format a signed position delta, always carrying its sign (`+5.0`, `-5.0`)
pub fn format_signed_position(value_mm: f64) -> String {
    format!("{:+.1}", value_mm)
}

/// Format a feed rate in mm/min with no decimals
pub fn format_feed_rate(value: f64) -> String {
    format!("{:.0}", value)
}

/// Split a duration into whole (hours, minutes, seconds)
pub fn split_hms(duration: Duration) -> (u64, u64, u64) {
    let total = duration.as_secs();
    (total / 3600, (total % 3600) / 60, total % 60)
}

/// Format a duration as `1h, 2m, 3s`
pub fn format_hms(duration: Duration) -> String {
    let (h, m, s) = split_hms(duration);
    format!("{}h, {}m, {}s", h, m, s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_formatting() {
        assert_eq!(format_position(10.0), "10.0");
        assert_eq!(format_position(-12.34), "-12.3");
        assert_eq!(format_signed_position(5.0), "+5.0");
        assert_eq!(format_signed_position(-2.26), "-2.3");
        assert_eq!(format_feed_rate(1000.4), "1000");
    }

    #[test]
    fn test_hms() {
        assert_eq!(split_hms(Duration::from_secs(3723)), (1, 2, 3));
        assert_eq!(format_hms(Duration::from_millis(59_900)), "0h, 0m, 59s");
    }
}
