//! Five-field cron expressions, evaluated in UTC.
//!
//! Supports `*`, lists (`1,15`), ranges (`1-5`), steps (`*/10`, `0-30/5`),
//! month and weekday names, `7` as Sunday, and the `@hourly`-style macros.
//! Day-of-month and day-of-week combine with OR when both are restricted,
//! matching classic cron.

use chrono::{Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use serde::Serialize;

use crate::error::CoreError;
use crate::types::Timestamp;

/// Number of upcoming runs reported by [`validate`].
pub const PREVIEW_RUNS: usize = 5;

/// How far ahead [`CronSchedule::next_after`] searches before giving up.
/// Covers leap-day schedules with a margin.
const SEARCH_HORIZON_DAYS: i64 = 366 * 9;

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_star: bool,
    dow_star: bool,
}

impl CronSchedule {
    /// Parse a cron expression or macro.
    pub fn parse(expression: &str) -> Result<Self, CoreError> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(CoreError::Validation("Cron expression is empty".into()));
        }

        let expanded = match expression.to_ascii_lowercase().as_str() {
            "@hourly" => "0 * * * *".to_string(),
            "@daily" | "@midnight" => "0 0 * * *".to_string(),
            "@weekly" => "0 0 * * 0".to_string(),
            "@monthly" => "0 0 1 * *".to_string(),
            "@yearly" | "@annually" => "0 0 1 1 *".to_string(),
            other if other.starts_with('@') => {
                return Err(CoreError::Validation(format!(
                    "Unknown cron macro '{expression}'"
                )));
            }
            _ => expression.to_string(),
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CoreError::Validation(format!(
                "Cron expression must have 5 fields (minute hour day month weekday), got {}",
                fields.len()
            )));
        }

        let minutes = parse_field(fields[0], "minute", 0, 59, None)?;
        let hours = parse_field(fields[1], "hour", 0, 23, None)?;
        let days_of_month = parse_field(fields[2], "day-of-month", 1, 31, None)?;
        let months = parse_field(fields[3], "month", 1, 12, Some((&MONTH_NAMES, 1)))?;
        let mut days_of_week = parse_field(fields[4], "day-of-week", 0, 7, Some((&WEEKDAY_NAMES, 0)))?;
        // 7 is an alias for Sunday.
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_star: fields[2].starts_with('*'),
            dow_star: fields[4].starts_with('*'),
        })
    }

    /// Whether the schedule fires on the given calendar day.
    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = has_bit(self.days_of_month, date.day());
        let dow = has_bit(self.days_of_week, date.weekday().num_days_from_sunday());
        if self.dom_star || self.dow_star {
            dom && dow
        } else {
            dom || dow
        }
    }

    /// The first fire time strictly after `after`, truncated to the minute.
    ///
    /// Returns `None` when the schedule never fires (e.g. `0 0 30 2 *`).
    pub fn next_after(&self, after: Timestamp) -> Option<Timestamp> {
        let mut t = after.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let horizon = after + Duration::days(SEARCH_HORIZON_DAYS);

        while t <= horizon {
            if !has_bit(self.months, t.month()) {
                t = start_of_next_month(t)?;
                continue;
            }
            if !self.day_matches(t.date_naive()) {
                t = start_of_next_day(t)?;
                continue;
            }
            if !has_bit(self.hours, t.hour()) {
                t = t.with_minute(0)? + Duration::hours(1);
                continue;
            }
            if !has_bit(self.minutes, t.minute()) {
                t += Duration::minutes(1);
                continue;
            }
            return Some(t);
        }
        None
    }

    /// The next `count` fire times after `after`, strictly increasing.
    pub fn next_runs(&self, after: Timestamp, count: usize) -> Vec<Timestamp> {
        let mut runs = Vec::with_capacity(count);
        let mut cursor = after;
        while runs.len() < count {
            match self.next_after(cursor) {
                Some(next) => {
                    runs.push(next);
                    cursor = next;
                }
                None => break,
            }
        }
        runs
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Result of standalone expression validation.
///
/// Serializes as `{ "valid": true, "next_runs": [..] }` or
/// `{ "valid": false, "error": ".." }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CronValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub next_runs: Vec<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Validate an expression and preview its next [`PREVIEW_RUNS`] runs after `now`.
///
/// Never fails: problems are reported through `valid: false`.
pub fn validate(expression: &str, now: Timestamp) -> CronValidation {
    let invalid = |error: String| CronValidation {
        valid: false,
        next_runs: Vec::new(),
        error: Some(error),
    };

    let schedule = match CronSchedule::parse(expression) {
        Ok(s) => s,
        Err(CoreError::Validation(msg)) => return invalid(msg),
        Err(e) => return invalid(e.to_string()),
    };

    let next_runs = schedule.next_runs(now, PREVIEW_RUNS);
    if next_runs.len() < PREVIEW_RUNS {
        return invalid(format!("Cron expression '{expression}' never fires"));
    }

    CronValidation {
        valid: true,
        next_runs,
        error: None,
    }
}

/// Compute the next run after `after`, failing with a validation error for
/// unparseable or never-firing expressions.
pub fn next_run(expression: &str, after: Timestamp) -> Result<Timestamp, CoreError> {
    CronSchedule::parse(expression)?
        .next_after(after)
        .ok_or_else(|| CoreError::Validation(format!("Cron expression '{expression}' never fires")))
}

// ---------------------------------------------------------------------------
// Field parsing
// ---------------------------------------------------------------------------

/// Parse one field into a bitmask. `names` maps textual values to numbers
/// starting at the given offset.
fn parse_field(
    field: &str,
    label: &str,
    min: u32,
    max: u32,
    names: Option<(&[&str], u32)>,
) -> Result<u64, CoreError> {
    let mut mask = 0u64;

    for part in field.split(',') {
        if part.is_empty() {
            return Err(CoreError::Validation(format!("Empty list item in {label} field '{field}'")));
        }

        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| {
                    CoreError::Validation(format!("Invalid step '{step}' in {label} field"))
                })?;
                if step == 0 {
                    return Err(CoreError::Validation(format!("Step must be positive in {label} field")));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_value(a, label, names)?, parse_value(b, label, names)?)
        } else {
            let v = parse_value(range, label, names)?;
            // `5/15` means "from 5 to the end, every 15".
            if step.is_some() { (v, max) } else { (v, v) }
        };

        if start < min || end > max {
            return Err(CoreError::Validation(format!(
                "{label} value out of range {min}-{max} in '{part}'"
            )));
        }
        if start > end {
            return Err(CoreError::Validation(format!("Descending range '{part}' in {label} field")));
        }

        for v in (start..=end).step_by(step.unwrap_or(1) as usize) {
            mask |= 1 << v;
        }
    }

    Ok(mask)
}

fn parse_value(raw: &str, label: &str, names: Option<(&[&str], u32)>) -> Result<u32, CoreError> {
    if let Ok(v) = raw.parse::<u32>() {
        return Ok(v);
    }
    if let Some((names, offset)) = names {
        let lower = raw.to_ascii_lowercase();
        if let Some(idx) = names.iter().position(|n| *n == lower) {
            return Ok(idx as u32 + offset);
        }
    }
    Err(CoreError::Validation(format!("Invalid {label} value '{raw}'")))
}

fn has_bit(mask: u64, bit: u32) -> bool {
    mask & (1 << bit) != 0
}

fn start_of_next_month(t: Timestamp) -> Option<Timestamp> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
}

fn start_of_next_day(t: Timestamp) -> Option<Timestamp> {
    Some(t.date_naive().succ_opt()?.and_hms_opt(0, 0, 0)?.and_utc())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
