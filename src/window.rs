//! Date-window resolution.
//!
//! A seasonal window is a pair of month-day strings ("06-14", "10-30")
//! that is re-anchored on every year of the requested range. Each year
//! is resolved independently, so a day that does not exist in one year
//! (Feb 29) only removes that year.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A concrete `[start, end]` window for one year, both bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateInterval {
    pub year: i32,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateInterval {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// A year for which no interval could be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedYear {
    pub year: i32,
    pub error: WindowError,
}

/// Result of expanding a window across a year range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalPlan {
    /// Resolved intervals, ascending by year
    pub intervals: Vec<DateInterval>,
    /// Years that failed resolution, ascending by year
    pub skipped: Vec<SkippedYear>,
}

/// Errors raised while resolving a month-day window bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    /// The string is not `MM-DD`, or the date does not exist in that year
    InvalidFormat { mmdd: String, year: i32 },
    /// The window starts after it ends within the same year
    Reversed { year: i32, start: NaiveDate, end: NaiveDate },
}

impl fmt::Display for WindowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowError::InvalidFormat { mmdd, year } => {
                write!(f, "Invalid month-day '{}' for year {}", mmdd, year)
            }
            WindowError::Reversed { year, start, end } => write!(
                f,
                "Window for {} starts on {} after it ends on {}",
                year, start, end
            ),
        }
    }
}

impl std::error::Error for WindowError {}

fn parse_group(group: &str) -> Option<u32> {
    if group.is_empty() || group.len() > 2 || !group.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    group.parse().ok()
}

/// Resolves `"MM-DD"` against `year`.
///
/// # Errors
/// Returns `WindowError::InvalidFormat` when `mmdd` is not two digit groups
/// joined by a single dash, or when the month/day is not a real calendar
/// date in `year`. Invalid days are never clamped.
pub fn resolve(year: i32, mmdd: &str) -> Result<NaiveDate, WindowError> {
    let invalid = || WindowError::InvalidFormat {
        mmdd: mmdd.to_string(),
        year,
    };

    let (month, day) = mmdd.split_once('-').ok_or_else(invalid)?;
    let month = parse_group(month).ok_or_else(invalid)?;
    let day = parse_group(day).ok_or_else(invalid)?;

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

/// Builds one interval per year in `[start_year, end_year]`.
///
/// Both bounds are resolved against the same year. Years that fail are
/// reported in `IntervalPlan::skipped` instead of aborting the plan.
///
/// # Arguments
/// * `start_mmdd` - Window start as `"MM-DD"`
/// * `end_mmdd` - Window end as `"MM-DD"`
/// * `start_year`, `end_year` - Inclusive year span
///
/// # Returns
/// Intervals and skipped years, each ascending by year. A window whose start
/// falls after its end is skipped as `WindowError::Reversed`.
pub fn build_intervals(
    start_mmdd: &str,
    end_mmdd: &str,
    start_year: i32,
    end_year: i32,
) -> IntervalPlan {
    let mut plan = IntervalPlan::default();

    for year in start_year..=end_year {
        let resolved = resolve(year, start_mmdd).and_then(|start| {
            let end = resolve(year, end_mmdd)?;
            if start > end {
                return Err(WindowError::Reversed { year, start, end });
            }
            Ok(DateInterval { year, start, end })
        });

        match resolved {
            Ok(interval) => plan.intervals.push(interval),
            Err(error) => plan.skipped.push(SkippedYear { year, error }),
        }
    }

    plan
}
