// Timestamps are stored as "YYYY-MM-DDTHH:MM:SS.sssZ" (UTC, millisecond
// precision). Any RFC 3339 value and a bare "YYYY-MM-DD" parse; anything else
// is kept as text.

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, UtcOffset};

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

pub fn format_iso(ts: OffsetDateTime) -> Result<String, time::error::Format> {
    ts.to_offset(UtcOffset::UTC).format(format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    ))
}

pub fn parse_iso(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
    let raw = raw.trim();
    match OffsetDateTime::parse(raw, &Rfc3339) {
        Ok(ts) => Ok(ts),
        Err(err) => Date::parse(raw, format_description!("[year]-[month]-[day]"))
            .map(|d| d.midnight().assume_utc())
            .map_err(|_| err),
    }
}

pub fn truncate_to_millis(ts: OffsetDateTime) -> OffsetDateTime {
    ts - Duration::nanoseconds(i64::from(ts.nanosecond() % 1_000_000))
}

/// Stamp for a mutation: `now` at millisecond precision, bumped past
/// `previous` so two mutations in the same millisecond still move forward.
pub fn next_stamp(now: OffsetDateTime, previous: Option<OffsetDateTime>) -> OffsetDateTime {
    let now = truncate_to_millis(now);
    match previous {
        Some(prev) if now <= prev => truncate_to_millis(prev) + Duration::milliseconds(1),
        _ => now,
    }
}

/// A timestamp exactly as it appears in the stored JSON.
///
/// The text is written back unchanged. Parsing happens only when a value is
/// displayed or a new stamp must move past it, and a value that does not
/// parse is still kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    pub fn at(ts: OffsetDateTime) -> Self {
        match format_iso(ts) {
            Ok(text) => Self(text),
            Err(_) => Self(ts.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `None` when the stored text is not a date.
    pub fn parse(&self) -> Option<OffsetDateTime> {
        parse_iso(&self.0).ok()
    }
}

impl From<&str> for Timestamp {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}
