//! UTC timestamp helpers shared by every repository in the sync pipeline.
//!
//! SQLite has no native timestamp type; every table in this workspace stores
//! `TEXT` columns in RFC 3339 with a trailing `Z`. Centralizing the
//! format/parse pair here keeps the three repositories (operations, events,
//! mappings) from drifting into slightly different string formats, which
//! would otherwise break the `ORDER BY scheduled_at` / `<=` comparisons the
//! claim query relies on.

use chrono::{DateTime, SecondsFormat, Utc};

/// Render a timestamp the way every table column in this workspace expects.
///
/// RFC 3339 with second precision sorts correctly as plain `TEXT` in SQLite,
/// which is what the claim query and retention sweep depend on.
#[must_use]
pub fn format_utc(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a column value written by [`format_utc`].
///
/// Accepts any RFC 3339 string, not just the canonical rendering, so rows
/// written by a future format tweak still parse.
///
/// # Errors
///
/// Returns an error if `value` is not a valid RFC 3339 timestamp.
pub fn parse_utc(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc))
}
