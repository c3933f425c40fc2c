//! Duration parsing for specification cells.
//!
//! Two forms are accepted:
//!
//! ```text
//! <clock>  := [days "."] hours ":" minutes [":" seconds]    3:5:2, 1.02:00:00
//! <scaled> := number [ws] unit                              5d, 1.5 hours, 15 seconds
//! ```
//!
//! Units are matched case-insensitively: `d`, `day`, `days`, `h`, `hr`,
//! `hrs`, `hour`, `hours`, `m`, `min`, `mins`, `minute`, `minutes`, `s`,
//! `sec`, `secs`, `second`, `seconds`. Whitespace is allowed anywhere around
//! the number and unit.

use chrono::TimeDelta;
use winnow::ascii::{alpha1, digit1, multispace0};
use winnow::combinator::{delimited, opt, preceded, terminated};
use winnow::prelude::*;
use winnow::ModalResult;

use crate::resolver::ResolveError;

const MILLIS_PER_SECOND: f64 = 1_000.0;
const MILLIS_PER_MINUTE: f64 = 60.0 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: f64 = 60.0 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: f64 = 24.0 * MILLIS_PER_HOUR;

/// Parse duration text in either the clock or the scaled form.
///
/// A leading `-` negates either form.
pub fn parse_duration(text: &str) -> Result<TimeDelta, ResolveError> {
    if let Ok((sign, (days, hours, minutes, seconds))) =
        delimited(multispace0, (opt('-'), parse_clock), multispace0).parse(text)
    {
        let delta = clock_delta(days, hours, minutes, seconds)
            .ok_or_else(|| unparseable(text, "out of range"))?;
        return Ok(apply_sign(sign, delta));
    }

    let (sign, (number, unit)) = delimited(multispace0, (opt('-'), parse_scaled), multispace0)
        .parse(text)
        .map_err(|_| unparseable(text, "expected H:M:S or <number> <unit>"))?;

    let per_unit = unit_millis(unit).ok_or_else(|| ResolveError::Unparseable {
        type_name: "duration".to_string(),
        text: text.to_string(),
        reason: format!("unrecognized duration unit '{}'", unit),
    })?;

    let millis = (number * per_unit).round();
    if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
        return Err(unparseable(text, "out of range"));
    }
    TimeDelta::try_milliseconds(millis as i64)
        .map(|delta| apply_sign(sign, delta))
        .ok_or_else(|| unparseable(text, "out of range"))
}

fn apply_sign(sign: Option<char>, delta: TimeDelta) -> TimeDelta {
    match sign {
        Some(_) => -delta,
        None => delta,
    }
}

/// Render a duration in the canonical clock form, `[d.]H:MM:SS[.fff]`.
pub fn format_duration(value: &TimeDelta) -> String {
    let sign = if *value < TimeDelta::zero() { "-" } else { "" };
    let value = value.abs();

    let days = value.num_days();
    let hours = value.num_hours() % 24;
    let minutes = value.num_minutes() % 60;
    let seconds = value.num_seconds() % 60;
    let millis = value.num_milliseconds() % 1_000;

    let mut out = String::from(sign);
    if days > 0 {
        out.push_str(&format!("{}.", days));
    }
    out.push_str(&format!("{}:{:02}:{:02}", hours, minutes, seconds));
    if millis > 0 {
        out.push_str(&format!(".{:03}", millis));
    }
    out
}

// ============================================================================
// Parser implementation using winnow
// ============================================================================

/// `[days "."] hours ":" minutes [":" seconds]`
fn parse_clock(input: &mut &str) -> ModalResult<(i64, i64, i64, f64)> {
    let days = opt(terminated(parse_integer, '.')).parse_next(input)?;
    let hours = parse_integer(input)?;
    let _ = ':'.parse_next(input)?;
    let minutes = parse_integer(input)?;
    let seconds = opt(preceded(':', parse_number)).parse_next(input)?;
    Ok((days.unwrap_or(0), hours, minutes, seconds.unwrap_or(0.0)))
}

/// `number [ws] unit`
fn parse_scaled<'i>(input: &mut &'i str) -> ModalResult<(f64, &'i str)> {
    let number = parse_number(input)?;
    let _ = multispace0.parse_next(input)?;
    let unit: &str = alpha1.parse_next(input)?;
    Ok((number, unit))
}

fn parse_integer(input: &mut &str) -> ModalResult<i64> {
    digit1.try_map(str::parse::<i64>).parse_next(input)
}

/// Unsigned decimal with an optional fraction (`5`, `1.5`).
fn parse_number(input: &mut &str) -> ModalResult<f64> {
    (digit1, opt(('.', digit1)))
        .take()
        .try_map(str::parse::<f64>)
        .parse_next(input)
}

fn clock_delta(days: i64, hours: i64, minutes: i64, seconds: f64) -> Option<TimeDelta> {
    let whole = TimeDelta::try_days(days)?
        .checked_add(&TimeDelta::try_hours(hours)?)?
        .checked_add(&TimeDelta::try_minutes(minutes)?)?;
    let millis = (seconds * MILLIS_PER_SECOND).round();
    if !millis.is_finite() {
        return None;
    }
    whole.checked_add(&TimeDelta::try_milliseconds(millis as i64)?)
}

fn unit_millis(unit: &str) -> Option<f64> {
    match unit.to_ascii_lowercase().as_str() {
        "d" | "day" | "days" => Some(MILLIS_PER_DAY),
        "h" | "hr" | "hrs" | "hour" | "hours" => Some(MILLIS_PER_HOUR),
        "m" | "min" | "mins" | "minute" | "minutes" => Some(MILLIS_PER_MINUTE),
        "s" | "sec" | "secs" | "second" | "seconds" => Some(MILLIS_PER_SECOND),
        _ => None,
    }
}

fn unparseable(text: &str, reason: &str) -> ResolveError {
    ResolveError::Unparseable {
        type_name: "duration".to_string(),
        text: text.to_string(),
        reason: reason.to_string(),
    }
}
