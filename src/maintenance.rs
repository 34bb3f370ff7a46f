//! Maintenance-window gate. Grounded on `routes/maintenance::is_time_in_window`
//! / `is_in_maintenance`, generalized to daily/weekly/monthly recurring
//! projections and a `monitor_ids` subset instead of a single `monitor_id`.

use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike};

const TS_FMT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// True if `at` falls inside the window described by `start`/`end`/`recurring`.
/// `recurring` is one of `""`, `"daily"`, `"weekly"`, `"monthly"`; empty means
/// a single one-shot window exactly like the teacher's original check.
pub fn is_time_in_window(start: &str, end: &str, recurring: &str, at: &str) -> bool {
    if recurring.is_empty() {
        return at >= start && at < end;
    }

    let (Ok(start_dt), Ok(end_dt), Ok(at_dt)) = (
        NaiveDateTime::parse_from_str(start, TS_FMT),
        NaiveDateTime::parse_from_str(end, TS_FMT),
        NaiveDateTime::parse_from_str(at, TS_FMT),
    ) else {
        return at >= start && at < end;
    };

    if at_dt < start_dt {
        return false;
    }

    let duration = end_dt - start_dt;
    let start_time = start_dt.time();

    match recurring {
        "daily" => {
            let at_time = at_dt.time();
            time_in_range(start_time, duration, at_time)
        }
        "weekly" => {
            if at_dt.weekday() != start_dt.weekday() {
                return false;
            }
            time_in_range(start_time, duration, at_dt.time())
        }
        "monthly" => {
            if at_dt.day() != start_dt.day() {
                return false;
            }
            time_in_range(start_time, duration, at_dt.time())
        }
        _ => at >= start && at < end,
    }
}

fn time_in_range(start_time: NaiveTime, duration: chrono::Duration, at_time: NaiveTime) -> bool {
    let start_secs = start_time.num_seconds_from_midnight() as i64;
    let at_secs = at_time.num_seconds_from_midnight() as i64;
    let duration_secs = duration.num_seconds().max(0);
    at_secs >= start_secs && at_secs < start_secs + duration_secs
}

/// True if `monitor_id` is covered by any active window in `windows` at `at`.
pub fn is_suppressed(windows: &[crate::models::MaintenanceWindow], monitor_id: &str, at: &str) -> bool {
    windows.iter().any(|w| {
        w.monitor_ids.iter().any(|id| id == monitor_id)
            && is_time_in_window(&w.start_time, &w.end_time, &w.recurring, at)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_window() {
        assert!(is_time_in_window("2026-01-01T10:00:00Z", "2026-01-01T11:00:00Z", "", "2026-01-01T10:30:00Z"));
        assert!(!is_time_in_window("2026-01-01T10:00:00Z", "2026-01-01T11:00:00Z", "", "2026-01-02T10:30:00Z"));
    }

    #[test]
    fn daily_recurrence() {
        let start = "2026-01-01T02:00:00Z";
        let end = "2026-01-01T03:00:00Z";
        assert!(is_time_in_window(start, end, "daily", "2026-03-15T02:30:00Z"));
        assert!(!is_time_in_window(start, end, "daily", "2026-03-15T04:00:00Z"));
        assert!(!is_time_in_window(start, end, "daily", "2025-12-31T02:30:00Z"));
    }

    #[test]
    fn weekly_recurrence_matches_weekday() {
        // 2026-01-01 is a Thursday.
        let start = "2026-01-01T02:00:00Z";
        let end = "2026-01-01T03:00:00Z";
        assert!(is_time_in_window(start, end, "weekly", "2026-01-08T02:15:00Z"));
        assert!(!is_time_in_window(start, end, "weekly", "2026-01-09T02:15:00Z"));
    }

    #[test]
    fn monthly_recurrence_matches_day_of_month() {
        let start = "2026-01-15T02:00:00Z";
        let end = "2026-01-15T03:00:00Z";
        assert!(is_time_in_window(start, end, "monthly", "2026-04-15T02:30:00Z"));
        assert!(!is_time_in_window(start, end, "monthly", "2026-04-16T02:30:00Z"));
    }
}
