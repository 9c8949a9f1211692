//! Connection log line parsing.
//!
//! Decodes raw log lines into typed [`Record`] values. A line is
//! `"<timestamp> <source> <destination>"` with single-space separators and a
//! base-10 integer timestamp. Anything else is a [`ParseError`]; callers
//! count discards rather than propagating them — one bad line must never
//! abort a run.

use thiserror::Error;

/// One parsed connection log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Host that opened the connection.
    pub source: String,
    /// Host that received the connection.
    pub destination: String,
}

/// Errors that can occur while parsing a log line.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected 3 fields, found {found}")]
    FieldCount { found: usize },

    #[error("invalid timestamp: {raw:?}")]
    InvalidTimestamp { raw: String },

    #[error("line is not valid UTF-8")]
    InvalidUtf8,
}

/// Parse a raw byte line into a [`Record`].
///
/// The aggregation path reads lines as bytes; a line that is not valid UTF-8
/// is a discard like any other malformed line.
pub fn parse_bytes(raw: &[u8]) -> Result<Record, ParseError> {
    let line = std::str::from_utf8(raw).map_err(|_| ParseError::InvalidUtf8)?;
    parse_line(line)
}

/// Parse a log line into a [`Record`].
pub fn parse_line(line: &str) -> Result<Record, ParseError> {
    let line = line.trim_end_matches(['\n', '\r']);

    let mut fields = line.split(' ');
    let ts_raw = fields.next().unwrap_or("");
    let source = fields.next();
    let destination = fields.next();

    let (Some(source), Some(destination)) = (source, destination) else {
        return Err(ParseError::FieldCount {
            found: line.split(' ').count(),
        });
    };

    if fields.next().is_some() {
        return Err(ParseError::FieldCount {
            found: line.split(' ').count(),
        });
    }

    let timestamp: i64 = ts_raw.parse().map_err(|_| ParseError::InvalidTimestamp {
        raw: ts_raw.to_string(),
    })?;

    Ok(Record {
        timestamp,
        source: source.to_string(),
        destination: destination.to_string(),
    })
}
