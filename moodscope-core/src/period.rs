//! Month window calculation
//!
//! A digest always covers `[month start, min(as-of date, month end)]`. The
//! window math here is pure: no I/O, and the only failure is an invalid
//! target month.

use crate::error::{Error, Result};
use chrono::{Datelike, NaiveDate, Utc};

/// Days per week bucket when deriving the week index.
const DAYS_PER_WEEK: u32 = 7;

/// The computed analysis window for one (year, month) as of a given date.
///
/// Transient: derived per call, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthWindow {
    /// Target year
    pub year: i32,
    /// Target month (1-12)
    pub month: u32,
    /// The "today" the window was computed against
    pub as_of: NaiveDate,
    /// First day of the target month
    pub month_start: NaiveDate,
    /// Last day of the target month
    pub month_end: NaiveDate,
    /// Whole days covered, inclusive on both ends; 0 when `as_of` precedes
    /// the month
    pub days_elapsed: u32,
    /// `ceil(days_elapsed / 7)`, minimum 1
    pub week_index: u32,
    /// True once `as_of` is on or past the month's last day
    pub is_final: bool,
}

impl MonthWindow {
    /// Compute the window for `(year, month)` as of `as_of`.
    ///
    /// Returns [`Error::InvalidWindow`] when `month` is outside 1..=12 or
    /// the year is outside chrono's representable range.
    pub fn compute(year: i32, month: u32, as_of: NaiveDate) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(Error::InvalidWindow(format!(
                "month must be 1..=12, got {}",
                month
            )));
        }

        let month_start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
            Error::InvalidWindow(format!("unrepresentable month: {}-{:02}", year, month))
        })?;

        // Last day of the month: roll to the next month's first day, step back one.
        let (next_year, next_month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
        let month_end = NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .and_then(|d| d.pred_opt())
            .ok_or_else(|| {
                Error::InvalidWindow(format!("unrepresentable month: {}-{:02}", year, month))
            })?;

        let days_elapsed = if as_of < month_start {
            0
        } else {
            let end = as_of.min(month_end);
            (end - month_start).num_days() as u32 + 1
        };

        let week_index = ((days_elapsed + DAYS_PER_WEEK - 1) / DAYS_PER_WEEK).max(1);
        let is_final = as_of >= month_end;

        Ok(Self {
            year,
            month,
            as_of,
            month_start,
            month_end,
            days_elapsed,
            week_index,
            is_final,
        })
    }

    /// Compute the window for the month `as_of` falls in.
    pub fn current(as_of: NaiveDate) -> Result<Self> {
        Self::compute(as_of.year(), as_of.month(), as_of)
    }

    /// Inclusive upper bound of the entry fetch range.
    pub fn window_end(&self) -> NaiveDate {
        self.as_of.min(self.month_end)
    }

    /// Display name for this window's month (e.g. "March 2025").
    pub fn display_name(&self) -> String {
        let month_name = match self.month {
            1 => "January",
            2 => "February",
            3 => "March",
            4 => "April",
            5 => "May",
            6 => "June",
            7 => "July",
            8 => "August",
            9 => "September",
            10 => "October",
            11 => "November",
            12 => "December",
            _ => "Unknown",
        };
        format!("{} {}", month_name, self.year)
    }
}

/// Today's date in UTC, the default as-of for live callers.
pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}
