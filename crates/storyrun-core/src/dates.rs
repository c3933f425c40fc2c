//! Date/time shorthand for specification cells.
//!
//! Authors rarely want to write absolute timestamps, so date/time cells
//! accept relative forms. Recognized in this order:
//!
//! 1. `TODAY` - the current date at midnight
//! 2. `TODAY+N` / `TODAY-N` - the current date shifted by `N` days
//! 3. `<Weekday> HH:MM` - the first such weekday on or after today, at `HH:MM`
//! 4. `HH:MM` - today at `HH:MM` (24-hour clock)
//! 5. a calendar literal: ISO `YYYY-MM-DD[ HH:MM[:SS]]`, `YYYY-MM-DDTHH:MM:SS`,
//!    slash dates ordered per [`DateOrder`], or `January 1, 2009` / `1 January 2009`
//!
//! `TODAY` is matched case-sensitively.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Weekday};
use serde::{Deserialize, Serialize};

use crate::resolver::ResolveError;

/// The "current date" sentinel.
pub const TODAY: &str = "TODAY";

// ============================================================================
// Clock
// ============================================================================

/// Source of the current local time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current local date and time.
    fn now(&self) -> NaiveDateTime;

    /// Current local date.
    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Wall clock in the local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: NaiveDateTime,
}

impl FixedClock {
    /// Freeze the clock at `now`.
    pub fn new(now: NaiveDateTime) -> Self {
        FixedClock { now }
    }

    /// Freeze the clock at midnight of `date`.
    pub fn at_date(date: NaiveDate) -> Self {
        FixedClock {
            now: date.and_time(NaiveTime::MIN),
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.now
    }
}

// ============================================================================
// Date Order
// ============================================================================

/// Field order for slash-delimited calendar dates (`1/2/2009`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DateOrder {
    /// `M/D/Y`.
    #[default]
    MonthFirst,
    /// `D/M/Y`.
    DayFirst,
}

impl DateOrder {
    fn date_time_formats(self) -> &'static [&'static str] {
        match self {
            DateOrder::MonthFirst => &["%m/%d/%Y %H:%M:%S", "%m/%d/%Y %H:%M"],
            DateOrder::DayFirst => &["%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M"],
        }
    }

    fn date_format(self) -> &'static str {
        match self {
            DateOrder::MonthFirst => "%m/%d/%Y",
            DateOrder::DayFirst => "%d/%m/%Y",
        }
    }
}

impl FromStr for DateOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "month-first" | "mdy" => Ok(DateOrder::MonthFirst),
            "day-first" | "dmy" => Ok(DateOrder::DayFirst),
            other => Err(format!(
                "unknown date order '{}', expected 'month-first' or 'day-first'",
                other
            )),
        }
    }
}

impl fmt::Display for DateOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateOrder::MonthFirst => f.write_str("month-first"),
            DateOrder::DayFirst => f.write_str("day-first"),
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

const ISO_DATE_TIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];
const LONG_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%B %d, %Y", "%d %B %Y"];

/// Parse date/time text relative to `today`.
pub fn parse_date_time(
    text: &str,
    today: NaiveDate,
    order: DateOrder,
) -> Result<NaiveDateTime, ResolveError> {
    let text = text.trim();
    let midnight = today.and_time(NaiveTime::MIN);

    if text == TODAY {
        return Ok(midnight);
    }

    if let Some(offset) = text.strip_prefix(TODAY) {
        if offset.starts_with('+') || offset.starts_with('-') {
            let days: i64 = offset.parse().map_err(|_| unparseable(text, "bad day offset"))?;
            let delta =
                TimeDelta::try_days(days).ok_or_else(|| unparseable(text, "day offset out of range"))?;
            return midnight
                .checked_add_signed(delta)
                .ok_or_else(|| unparseable(text, "day offset out of range"));
        }
    }

    if let Some((day, time)) = text.split_once(char::is_whitespace) {
        if let (Ok(weekday), Ok(time)) = (day.parse::<Weekday>(), parse_clock_time(time.trim())) {
            return Ok(next_weekday(today, weekday).and_time(time));
        }
    }

    if let Ok(time) = parse_clock_time(text) {
        return Ok(today.and_time(time));
    }

    parse_calendar_literal(text, order).ok_or_else(|| unparseable(text, "unrecognized date/time"))
}

/// Parse date/time text against the system clock, with month-first slash dates.
pub fn get_date_time(text: &str) -> Result<NaiveDateTime, ResolveError> {
    parse_date_time(text, SystemClock.today(), DateOrder::MonthFirst)
}

/// The first date on or after `from` that falls on `weekday`.
pub fn next_weekday(from: NaiveDate, weekday: Weekday) -> NaiveDate {
    let current = from.weekday().num_days_from_monday();
    let target = weekday.num_days_from_monday();
    let ahead = (target + 7 - current) % 7;
    from + TimeDelta::days(i64::from(ahead))
}

fn parse_clock_time(text: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(text, "%H:%M")
}

fn parse_calendar_literal(text: &str, order: DateOrder) -> Option<NaiveDateTime> {
    let date_time_formats = ISO_DATE_TIME_FORMATS
        .iter()
        .chain(order.date_time_formats());
    for format in date_time_formats {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed);
        }
    }

    let slash_format = order.date_format();
    let date_formats = std::iter::once(&slash_format).chain(LONG_DATE_FORMATS);
    for format in date_formats {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }

    None
}

fn unparseable(text: &str, reason: &str) -> ResolveError {
    ResolveError::Unparseable {
        type_name: "datetime".to_string(),
        text: text.to_string(),
        reason: reason.to_string(),
    }
}

/// Render a date/time in the canonical re-parseable form.
pub fn format_date_time(value: &NaiveDateTime) -> String {
    value.format("%Y-%m-%d %H:%M:%S").to_string()
}

// ============================================================================
// Tests
// ============================================================================
