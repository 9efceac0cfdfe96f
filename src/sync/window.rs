use chrono::{DateTime, Duration, Utc};

use crate::catalog::{self, ReportCategory};
use crate::date_util::{format_timestamp, truncate_to_midnight};
use crate::error::{Error, Result};

/// Days per request for raw (event-level) pulls.
pub const RAW_CHUNK_DAYS: i64 = 5;

/// Gap left between consecutive aggregate windows.
pub const AGGREGATE_WINDOW_GAP_MINUTES: i64 = 1;

/// A request window, `from < to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    pub fn duration(&self) -> Duration {
        self.to - self.from
    }
}

fn check_range(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<()> {
    if to <= from {
        return Err(Error::InvalidRange {
            from: format_timestamp(from),
            to: format_timestamp(to),
        });
    }
    Ok(())
}

/// Pick the windowing algorithm for `report_id`'s category.
pub fn plan_windows(
    report_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<TimeWindow>> {
    let report = catalog::report(report_id)?;
    match report.category {
        ReportCategory::Raw => raw_windows(report_id, from, to),
        ReportCategory::Daily => aggregate_windows(report_id, from, to),
    }
}

/// Split `[from, to]` into windows of at most the report's `max_window_days`.
///
/// Full-length windows are laid back to back with a one-minute gap between
/// them; the final window always ends exactly at `to`. Daily reports are
/// queried by date, so their next window starts at the following midnight
/// instead and no date is requested twice; a `to` at midnight that only a
/// new window could reach is left out.
pub fn aggregate_windows(
    report_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<TimeWindow>> {
    let report = catalog::report(report_id)?;
    check_range(from, to)?;

    let limit = Duration::days(i64::from(report.max_window_days));
    let daily = report.category == ReportCategory::Daily;
    let gap = Duration::minutes(AGGREGATE_WINDOW_GAP_MINUTES);
    let mut windows = Vec::new();
    let mut cursor = from;

    while cursor < to {
        let mut end = (cursor + limit).min(to);
        let next = if daily {
            truncate_to_midnight(end) + Duration::days(1)
        } else {
            end + gap
        };
        // `to` falls on the date this window already ends on
        if daily && next > to {
            end = to;
        }
        windows.push(TimeWindow { from: cursor, to: end });
        cursor = next;
    }

    Ok(windows)
}

/// Partition `[from, to]` into contiguous chunks of [`RAW_CHUNK_DAYS`] days.
///
/// The day sequence `from, from + 1d, ...` (up to `to`) is cut into groups of
/// five. Each window starts on its chunk's first day and ends where the next
/// chunk starts, so every day is requested exactly once; the last window ends
/// at `to`.
pub fn raw_windows(
    report_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<TimeWindow>> {
    catalog::max_window_days(report_id)?;
    check_range(from, to)?;

    let last_day = (to - from).num_days();
    let mut windows = Vec::new();
    let mut first = 0;

    while first <= last_day {
        let chunk_last = (first + RAW_CHUNK_DAYS - 1).min(last_day);
        let start = from + Duration::days(first);
        let end = if chunk_last == last_day {
            to
        } else {
            from + Duration::days(chunk_last + 1)
        };
        if start < end {
            windows.push(TimeWindow { from: start, to: end });
        }
        first = chunk_last + 1;
    }

    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_util::DAILY_QUERY_FORMAT;
    use chrono::TimeZone;

    fn d(y: i32, m: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, day, 0, 0, 0).unwrap()
    }

    fn assert_contiguous_cover(
        windows: &[TimeWindow],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        gap: Duration,
    ) {
        assert_eq!(windows.first().unwrap().from, from);
        assert_eq!(windows.last().unwrap().to, to);
        for w in windows {
            assert!(w.from < w.to, "{w:?}");
        }
        for pair in windows.windows(2) {
            assert_eq!(pair[1].from, pair[0].to + gap, "{pair:?}");
        }
    }

    #[test]
    fn test_aggregate_single_window() {
        let windows = aggregate_windows("installs_report", d(2024, 1, 1), d(2024, 1, 3)).unwrap();
        assert_eq!(
            windows,
            vec![TimeWindow {
                from: d(2024, 1, 1),
                to: d(2024, 1, 3)
            }]
        );
    }

    #[test]
    fn test_aggregate_full_windows_plus_remainder() {
        let from = d(2024, 1, 1);
        let to = from + Duration::days(130);
        let windows = aggregate_windows("installs_report", from, to).unwrap();

        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].duration(), Duration::days(60));
        assert_eq!(windows[1].duration(), Duration::days(60));
        assert_contiguous_cover(&windows, from, to, Duration::minutes(1));
    }

    #[test]
    fn test_aggregate_windows_respect_limit_for_many_ranges() {
        let from = Utc.with_ymd_and_hms(2023, 2, 7, 13, 45, 0).unwrap();
        for days in [1i64, 59, 60, 61, 120, 365, 366, 731, 1000] {
            let to = from + Duration::days(days) + Duration::minutes(17);
            let windows = aggregate_windows("installs_report", from, to).unwrap();
            for w in &windows {
                assert!(w.duration() <= Duration::days(60), "{days}: {w:?}");
            }
            assert_contiguous_cover(&windows, from, to, Duration::minutes(1));
        }
    }

    #[test]
    fn test_daily_windows_never_share_a_date() {
        let from = d(2023, 1, 1);
        let to = d(2024, 3, 1);
        let windows = aggregate_windows("partners_by_date_report", from, to).unwrap();
        let date = |ts: DateTime<Utc>| ts.format(DAILY_QUERY_FORMAT).to_string();

        assert_eq!(windows.len(), 2);
        assert_eq!(date(windows[0].to), "2024-01-01");
        assert_eq!(date(windows[1].from), "2024-01-02");
        assert_eq!(windows[1].to, to);
    }

    #[test]
    fn test_daily_window_never_exceeds_limit_to_reach_midnight() {
        let from = d(2023, 1, 1);
        let windows = aggregate_windows("partners_by_date_report", from, d(2024, 1, 2)).unwrap();
        assert_eq!(windows, vec![TimeWindow { from, to: d(2024, 1, 1) }]);

        let windows = aggregate_windows("partners_by_date_report", from, d(2024, 1, 3)).unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1], TimeWindow { from: d(2024, 1, 2), to: d(2024, 1, 3) });
    }

    #[test]
    fn test_daily_windows_cover_every_date_once() {
        let from = Utc.with_ymd_and_hms(2021, 6, 30, 23, 59, 0).unwrap();
        for days in [1i64, 364, 365, 366, 700, 731, 1100] {
            for extra in [Duration::zero(), Duration::minutes(17), Duration::hours(23)] {
                let to = from + Duration::days(days) + extra;
                let windows = aggregate_windows("partners_by_date_report", from, to).unwrap();
                let date = |ts: DateTime<Utc>| ts.format(DAILY_QUERY_FORMAT).to_string();

                assert_eq!(windows.first().unwrap().from, from);
                assert_eq!(windows.last().unwrap().to, to);
                for w in &windows {
                    assert!(w.from < w.to, "{w:?}");
                    assert!(w.duration() < Duration::days(366), "{w:?}");
                }
                for pair in windows.windows(2) {
                    assert!(date(pair[0].to) < date(pair[1].from), "{pair:?}");
                    assert_eq!(
                        pair[1].from,
                        truncate_to_midnight(pair[0].to) + Duration::days(1),
                        "{pair:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_aggregate_exact_multiple_stays_within_range() {
        let from = d(2024, 1, 1);
        let to = from + Duration::days(120);
        let windows = aggregate_windows("installs_report", from, to).unwrap();
        assert!(windows.iter().all(|w| w.to <= to));
        assert_contiguous_cover(&windows, from, to, Duration::minutes(1));
    }

    #[test]
    fn test_raw_twelve_days_in_three_chunks() {
        let windows = raw_windows("installs_report", d(2024, 1, 1), d(2024, 1, 12)).unwrap();
        assert_eq!(
            windows,
            vec![
                TimeWindow { from: d(2024, 1, 1), to: d(2024, 1, 6) },
                TimeWindow { from: d(2024, 1, 6), to: d(2024, 1, 11) },
                TimeWindow { from: d(2024, 1, 11), to: d(2024, 1, 12) },
            ]
        );
    }

    #[test]
    fn test_raw_chunks_cover_every_day_once() {
        let from = Utc.with_ymd_and_hms(2024, 2, 25, 23, 59, 0).unwrap();
        for days in 0i64..40 {
            let to = from + Duration::days(days) + Duration::hours(7);
            let windows = raw_windows("in_app_events_report", from, to).unwrap();
            assert_contiguous_cover(&windows, from, to, Duration::zero());
            for w in &windows {
                assert!(w.duration() <= Duration::days(RAW_CHUNK_DAYS), "{w:?}");
            }

            let mut day = from;
            while day < to {
                let covering = windows.iter().filter(|w| w.from <= day && day < w.to).count();
                assert_eq!(covering, 1, "day {day} covered {covering} times");
                day += Duration::days(1);
            }
        }
    }

    #[test]
    fn test_raw_exact_chunk_boundary_has_no_empty_window() {
        let windows = raw_windows("installs_report", d(2024, 1, 1), d(2024, 1, 11)).unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1], TimeWindow { from: d(2024, 1, 6), to: d(2024, 1, 11) });
    }

    #[test]
    fn test_invalid_range() {
        for result in [
            raw_windows("installs_report", d(2024, 1, 2), d(2024, 1, 2)),
            raw_windows("installs_report", d(2024, 1, 3), d(2024, 1, 2)),
            aggregate_windows("installs_report", d(2024, 1, 3), d(2024, 1, 2)),
        ] {
            assert!(matches!(result, Err(Error::InvalidRange { .. })));
        }
    }

    #[test]
    fn test_unknown_report_checked_before_range() {
        assert!(matches!(
            raw_windows("cohort_report", d(2024, 1, 3), d(2024, 1, 2)),
            Err(Error::UnknownReport(_))
        ));
        assert!(matches!(
            aggregate_windows("cohort_report", d(2024, 1, 1), d(2024, 1, 2)),
            Err(Error::UnknownReport(_))
        ));
    }

    #[test]
    fn test_plan_dispatches_on_category() {
        let from = d(2024, 1, 1);
        let to = d(2024, 3, 1);
        assert_eq!(plan_windows("installs_report", from, to).unwrap().len(), 12);
        assert_eq!(plan_windows("partners_by_date_report", from, to).unwrap().len(), 1);
    }
}
