//! Timestamp helpers.
//!
//! Three renderings matter to kmirror:
//! - the **sync clock**, millisecond-truncated UTC used to compare vault
//!   mod-times against row `updated_at`,
//! - the **index format** `YYYY-MM-DDTHH:MM:SSZ` used in search documents,
//! - **RFC 3339 with offset** used in exported frontmatter.

use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};

/// Truncate to millisecond precision.
///
/// Filesystems and stores keep different sub-millisecond precision; both
/// sides of a conflict comparison pass through this first.
#[must_use]
pub fn sync_clock(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(t.timestamp_millis()).unwrap_or(t)
}

/// Current time on the sync clock.
#[must_use]
pub fn now() -> DateTime<Utc> {
    sync_clock(Utc::now())
}

/// Convert a filesystem timestamp to the sync clock.
#[must_use]
pub fn from_system_time(t: SystemTime) -> DateTime<Utc> {
    sync_clock(DateTime::<Utc>::from(t))
}

#[must_use]
pub fn to_system_time(t: DateTime<Utc>) -> SystemTime {
    SystemTime::from(t)
}

/// Render for search documents: `2025-02-10T09:15:00Z`.
#[must_use]
pub fn index_timestamp(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Render for frontmatter: `2025-02-10T09:15:00+00:00`.
#[must_use]
pub fn frontmatter_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, false)
}
