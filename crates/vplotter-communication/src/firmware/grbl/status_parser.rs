//! GRBL Status Report Parsing
//!
//! Reads the machine position from the `?` status report and the active
//! work offset from the `$#` parameter report, and combines the two into a
//! position snapshot.
//!
//! Both reports are comma separated. The status report carries the machine
//! X as `<tag>:<value>` in its fifth field and Y in its sixth; the offset
//! report carries X as `<tag>:<value>` in its first field and Y in its
//! second.

use std::thread;
use std::time::Duration;

use tracing::{debug, trace};
use vplotter_core::{PollError, PositionSnapshot, Result, SharedPosition};

use super::command_creator::{OFFSET_QUERY, STATUS_QUERY};
use crate::communication::{LineTerminator, Transport};

/// Default pause between a query and reading its answer
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(100);

fn malformed(query: &str, report: &str, reason: impl Into<String>) -> PollError {
    PollError::MalformedStatus {
        query: query.to_string(),
        report: report.to_string(),
        reason: reason.into(),
    }
}

/// Strip report brackets and whitespace from a field
fn clean_field(field: &str) -> &str {
    field.trim_matches(|c: char| c.is_whitespace() || matches!(c, '<' | '>' | '[' | ']'))
}

/// Extract a number from a field, optionally behind a `<tag>:` prefix
fn extract_value(
    query: &str,
    report: &str,
    field: &str,
    tagged: bool,
) -> std::result::Result<f64, PollError> {
    let value = if tagged {
        field
            .split_once(':')
            .map(|(_, value)| value)
            .ok_or_else(|| malformed(query, report, format!("field '{}' has no ':'", field)))?
    } else {
        field
    };

    clean_field(value)
        .parse::<f64>()
        .map_err(|_| malformed(query, report, format!("'{}' is not a number", value)))
}

/// Parse the machine (x, y) out of a status report line
pub fn parse_status_report(report: &str) -> std::result::Result<(f64, f64), PollError> {
    let fields: Vec<&str> = report.split(',').collect();
    if fields.len() < 6 {
        return Err(malformed(
            STATUS_QUERY,
            report,
            format!("expected at least 6 fields, got {}", fields.len()),
        ));
    }

    let x = extract_value(STATUS_QUERY, report, fields[4], true)?;
    let y = extract_value(STATUS_QUERY, report, fields[5], false)?;
    Ok((x, y))
}

/// Parse the work offset (x, y) out of an offset report line
pub fn parse_offset_report(report: &str) -> std::result::Result<(f64, f64), PollError> {
    let fields: Vec<&str> = report.split(',').collect();
    if fields.len() < 2 {
        return Err(malformed(
            OFFSET_QUERY,
            report,
            format!("expected at least 2 fields, got {}", fields.len()),
        ));
    }

    let x = extract_value(OFFSET_QUERY, report, fields[0], true)?;
    let y = extract_value(OFFSET_QUERY, report, fields[1], false)?;
    Ok((x, y))
}

/// Issues position queries and parses the answers
#[derive(Debug, Clone)]
pub struct StatusPoller {
    settle: Duration,
}

impl Default for StatusPoller {
    fn default() -> Self {
        Self::new(DEFAULT_SETTLE)
    }
}

impl StatusPoller {
    /// Create a poller that waits `settle` between query and read
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }

    /// Send `query` and return the first line of its answer
    fn query(&self, transport: &mut dyn Transport, query: &str) -> Result<String> {
        transport.send_line(query, LineTerminator::Interactive)?;
        thread::sleep(self.settle);
        let lines = transport.read_available_lines()?;
        trace!("{} answered {:?}", query, lines);

        match lines.into_iter().next() {
            Some(first) => Ok(first),
            None => Err(malformed(query, "", "no response").into()),
        }
    }

    /// Query the machine position
    pub fn poll_status(&self, transport: &mut dyn Transport) -> Result<(f64, f64)> {
        let report = self.query(transport, STATUS_QUERY)?;
        Ok(parse_status_report(&report)?)
    }

    /// Query the active work offset
    pub fn poll_offset(&self, transport: &mut dyn Transport) -> Result<(f64, f64)> {
        let report = self.query(transport, OFFSET_QUERY)?;
        Ok(parse_offset_report(&report)?)
    }

    /// Poll position and offset, publishing a new snapshot only if both
    /// succeed.
    pub fn update(
        &self,
        transport: &mut dyn Transport,
        position: &SharedPosition,
    ) -> Result<PositionSnapshot> {
        let machine = self.poll_status(transport)?;
        let offset = self.poll_offset(transport)?;
        let snapshot = PositionSnapshot::new(machine, offset);
        position.publish(snapshot);
        debug!("Position updated: {}", snapshot);
        Ok(snapshot)
    }
}
