use serde::{Deserialize, Serialize};
use time::macros::format_description;

use crate::{Category, UtcDateTime};

/// One recently cached query, as listed by the history view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub piece: String,
    pub model: String,
    pub category: Option<Category>,
    pub result_count: usize,
    pub stored_at: UtcDateTime,
    /// Human-readable age such as `"5 minutes ago"`.
    pub age: String,
}

/// Relative age of `stored_at` seen from `now`.
///
/// Minutes below one hour, hours below one day, days below one week, and the
/// calendar date (`YYYY-MM-DD`) beyond that.
pub fn relative_age(stored_at: UtcDateTime, now: UtcDateTime) -> String {
    let elapsed = stored_at.elapsed_until(now);
    let minutes = elapsed.whole_minutes();
    let hours = elapsed.whole_hours();
    let days = elapsed.whole_days();

    if minutes < 1 {
        String::from("just now")
    } else if minutes < 60 {
        plural(minutes, "minute")
    } else if hours < 24 {
        plural(hours, "hour")
    } else if days < 7 {
        plural(days, "day")
    } else {
        stored_at
            .into_inner()
            .format(format_description!("[year]-[month]-[day]"))
            .unwrap_or_else(|_| stored_at.format_rfc3339())
    }
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{count} {unit}s ago")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE_MS: i64 = 60_000;

    fn age_after(elapsed_ms: i64) -> String {
        let stored = UtcDateTime::from_unix_millis(1_700_000_000_000);
        relative_age(stored, UtcDateTime::from_unix_millis(1_700_000_000_000 + elapsed_ms))
    }

    #[test]
    fn labels_follow_elapsed_time() {
        assert_eq!(age_after(30_000), "just now");
        assert_eq!(age_after(MINUTE_MS), "1 minute ago");
        assert_eq!(age_after(5 * MINUTE_MS), "5 minutes ago");
        assert_eq!(age_after(2 * 60 * MINUTE_MS), "2 hours ago");
        assert_eq!(age_after(3 * 24 * 60 * MINUTE_MS), "3 days ago");
    }

    #[test]
    fn falls_back_to_date_after_a_week() {
        assert_eq!(age_after(8 * 24 * 60 * MINUTE_MS), "2023-11-14");
    }

    #[test]
    fn future_timestamps_read_as_just_now() {
        assert_eq!(age_after(-5 * MINUTE_MS), "just now");
    }
}
