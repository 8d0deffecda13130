//! Timestamp and ISO week utilities

use crate::{Error, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

/// Position of a point in a weekly series: `(isoYear, isoWeek)`
///
/// Ordering follows the calendar, so ranges of keys sort chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekKey {
    pub iso_year: i32,
    pub iso_week: u32,
}

impl WeekKey {
    /// Build a key, rejecting weeks the ISO year does not have
    pub fn new(iso_year: i32, iso_week: u32) -> Option<Self> {
        NaiveDate::from_isoywd_opt(iso_year, iso_week, Weekday::Mon)?;
        Some(Self { iso_year, iso_week })
    }

    /// ISO week containing `date`
    pub fn from_date(date: NaiveDate) -> Self {
        let week = date.iso_week();
        Self {
            iso_year: week.year(),
            iso_week: week.week(),
        }
    }

    /// ISO week containing the current UTC date
    pub fn current() -> Self {
        Self::from_date(now().date_naive())
    }

    /// Monday of this week
    pub fn monday(self) -> NaiveDate {
        // Keys are only built through `new`/`from_date`, so the week exists.
        NaiveDate::from_isoywd_opt(self.iso_year, self.iso_week, Weekday::Mon)
            .unwrap_or(NaiveDate::MIN)
    }

    /// Week `weeks` away from this one (negative goes back)
    pub fn offset(self, weeks: i64) -> Self {
        Self::from_date(self.monday() + Duration::weeks(weeks))
    }

    /// The `len` weeks ending just before this one, oldest first
    pub fn trailing(self, len: usize) -> Vec<WeekKey> {
        (1..=len as i64).rev().map(|n| self.offset(-n)).collect()
    }

    /// The `len` weeks starting just after this one, oldest first
    pub fn leading(self, len: usize) -> Vec<WeekKey> {
        (1..=len as i64).map(|n| self.offset(n)).collect()
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.iso_year, self.iso_week)
    }
}

impl FromStr for WeekKey {
    type Err = Error;

    /// Parse `YYYY-Www`, e.g. `2026-W07`
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Validation(format!("Invalid ISO week '{}', expected YYYY-Www", s));
        let (year, week) = s.split_once("-W").ok_or_else(invalid)?;
        let iso_year: i32 = year.parse().map_err(|_| invalid())?;
        let iso_week: u32 = week.parse().map_err(|_| invalid())?;
        WeekKey::new(iso_year, iso_week).ok_or_else(invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wk(y: i32, w: u32) -> WeekKey {
        WeekKey::new(y, w).unwrap()
    }

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_millis_to_duration_one_second() {
        let duration = millis_to_duration(1000);
        assert_eq!(duration, std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_week_validation() {
        assert!(WeekKey::new(2026, 53).is_some()); // 2026 is a long ISO year
        assert!(WeekKey::new(2025, 53).is_none());
        assert!(WeekKey::new(2025, 0).is_none());
    }

    #[test]
    fn test_from_date_uses_iso_year() {
        // 2027-01-01 is a Friday in ISO week 2026-W53
        let d = NaiveDate::from_ymd_opt(2027, 1, 1).unwrap();
        assert_eq!(WeekKey::from_date(d), wk(2026, 53));
    }

    #[test]
    fn test_offset_crosses_year_boundary() {
        assert_eq!(wk(2026, 53).offset(1), wk(2027, 1));
        assert_eq!(wk(2027, 1).offset(-1), wk(2026, 53));
        assert_eq!(wk(2025, 52).offset(1), wk(2026, 1));
    }

    #[test]
    fn test_trailing_and_leading_windows() {
        let current = wk(2026, 2);
        assert_eq!(
            current.trailing(4),
            vec![wk(2025, 50), wk(2025, 51), wk(2025, 52), wk(2026, 1)]
        );
        let leading = current.leading(8);
        assert_eq!(leading.len(), 8);
        assert_eq!(leading[0], wk(2026, 3));
        assert_eq!(leading[7], wk(2026, 10));
    }

    #[test]
    fn test_ordering_is_chronological() {
        assert!(wk(2025, 52) < wk(2026, 1));
        assert!(wk(2026, 1) < wk(2026, 2));
    }

    #[test]
    fn test_display_and_parse() {
        assert_eq!(wk(2026, 7).to_string(), "2026-W07");
        assert_eq!("2026-W07".parse::<WeekKey>().unwrap(), wk(2026, 7));
        assert!("2025-W53".parse::<WeekKey>().is_err());
        assert!("2026-07".parse::<WeekKey>().is_err());
    }
}
