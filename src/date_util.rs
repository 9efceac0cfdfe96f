use chrono::{DateTime, Duration, DurationRound, NaiveDateTime, NaiveTime, Utc};

use crate::error::{Error, Result};

/// Format of persisted bookmarks and of `start_date`/`end_date` in config.
pub const BOOKMARK_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Query parameter format for raw (event-level) reports.
pub const RAW_QUERY_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Query parameter format for daily (aggregate) reports.
pub const DAILY_QUERY_FORMAT: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DDTHH:MM:SSZ` timestamp as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), BOOKMARK_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| Error::InvalidTimestamp {
            value: value.to_string(),
            format: BOOKMARK_FORMAT,
        })
}

/// Render a timestamp in bookmark format.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(BOOKMARK_FORMAT).to_string()
}

/// Drop seconds and sub-second precision.
pub fn truncate_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(Duration::minutes(1)).unwrap_or(ts)
}

/// Midnight (UTC) of the day containing `ts`.
pub fn truncate_to_midnight(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive().and_time(NaiveTime::MIN).and_utc()
}
