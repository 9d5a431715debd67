//! Timestamps that re-emit the text they were read from.

use chrono::{DateTime, ParseError, SecondsFormat, Utc};
use std::fmt;

/// An RFC 3339 instant together with its textual form.
///
/// Peers write the same instant in different ways (`Z` or `+00:00`,
/// with or without fractional seconds). Encoding returns the exact text
/// that was decoded, so a record read from a peer and stored locally
/// compares equal to the peer's copy on the next pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Timestamp {
    at: DateTime<Utc>,
    text: String,
}

impl Timestamp {
    /// Parses an RFC 3339 timestamp, keeping `text` verbatim.
    pub fn parse(text: impl Into<String>) -> Result<Self, ParseError> {
        let text = text.into();
        let at = DateTime::parse_from_rfc3339(&text)?.with_timezone(&Utc);
        Ok(Self { at, text })
    }

    /// The instant in UTC.
    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }

    /// The textual form emitted on encode.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Returns true if both timestamps denote the same instant,
    /// regardless of how they are written.
    pub fn same_instant(&self, other: &Timestamp) -> bool {
        self.at == other.at
    }
}

/// Instants created locally are written in UTC with a `Z` suffix.
impl From<DateTime<Utc>> for Timestamp {
    fn from(at: DateTime<Utc>) -> Self {
        Self {
            at,
            text: at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
