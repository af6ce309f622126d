//! Conversions between the persisted date/time strings and `time` values.
//!
//! Due dates are stored in long form (`August 31st, 2024`), alarms as a
//! 12-hour clock time (`2:30 PM`) and reset markers as ISO dates
//! (`2024-09-01`). Every other module goes through these helpers instead of
//! parsing strings itself.

use crate::error::AppError;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Month, Time, Weekday};

const TIME_OF_DAY: &[BorrowedFormatItem<'static>] = format_description!(
    "[hour repr:12 padding:none]:[minute] [period case:upper case_sensitive:false]"
);
const ISO_DATE: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

const WEEKDAY_CODES: [(Weekday, &str); 7] = [
    (Weekday::Sunday, "SUN"),
    (Weekday::Monday, "MON"),
    (Weekday::Tuesday, "TUE"),
    (Weekday::Wednesday, "WED"),
    (Weekday::Thursday, "THU"),
    (Weekday::Friday, "FRI"),
    (Weekday::Saturday, "SAT"),
];

/// Formats `date` as `<MonthName> <day><suffix>, <year>`.
pub fn format_long_date(date: Date) -> String {
    let day = date.day();
    format!(
        "{} {}{}, {:04}",
        date.month(),
        day,
        ordinal_suffix(day),
        date.year()
    )
}

/// Parses a long-form date produced by [`format_long_date`].
///
/// The month name is case-sensitive and the ordinal suffix must be one of
/// `st`, `nd`, `rd` or `th`. Calendar-invalid dates such as `February 30th`
/// are rejected rather than rolled over.
pub fn parse_long_date(value: &str) -> Result<Date, AppError> {
    let invalid = || AppError::invalid_input(format!("invalid date '{value}'"));
    let trimmed = value.trim();

    let (month_and_day, year) = trimmed.split_once(", ").ok_or_else(invalid)?;
    let (month_name, day_part) = month_and_day.split_once(' ').ok_or_else(invalid)?;

    let digits_end = day_part
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(day_part.len());
    let (day_digits, suffix) = day_part.split_at(digits_end);
    if day_digits.is_empty() || !matches!(suffix, "st" | "nd" | "rd" | "th") {
        return Err(invalid());
    }

    let month = month_from_name(month_name).ok_or_else(invalid)?;
    let day: u8 = day_digits.parse().map_err(|_| invalid())?;
    let year: i32 = year.trim().parse().map_err(|_| invalid())?;

    Date::from_calendar_date(year, month, day).map_err(|_| invalid())
}

/// Formats a time of day as `h:mm AM`, dropping seconds.
pub fn format_time_of_day(time: Time) -> String {
    let hour = match time.hour() % 12 {
        0 => 12,
        other => other,
    };
    let period = if time.hour() < 12 { "AM" } else { "PM" };
    format!("{}:{:02} {}", hour, time.minute(), period)
}

/// Parses `h:mm AM`/`h:mm PM` (the marker is case-insensitive).
pub fn parse_time_of_day(value: &str) -> Result<Time, AppError> {
    Time::parse(value.trim(), TIME_OF_DAY)
        .map_err(|_| AppError::invalid_input(format!("invalid time '{value}'")))
}

pub fn format_iso_date(date: Date) -> String {
    date.format(ISO_DATE).unwrap_or_else(|_| {
        format!(
            "{:04}-{:02}-{:02}",
            date.year(),
            u8::from(date.month()),
            date.day()
        )
    })
}

pub fn parse_iso_date(value: &str) -> Result<Date, AppError> {
    Date::parse(value.trim(), ISO_DATE)
        .map_err(|_| AppError::invalid_input(format!("invalid ISO date '{value}'")))
}

/// Accepts either a long-form date or an ISO date, as typed by a user.
pub fn parse_user_date(value: &str) -> Result<Date, AppError> {
    parse_long_date(value)
        .or_else(|_| parse_iso_date(value))
        .map_err(|_| {
            AppError::invalid_input(format!(
                "invalid date '{value}' (expected e.g. 'August 31st, 2024' or 2024-08-31)"
            ))
        })
}

/// Day-granularity ordering: `a` falls on an earlier calendar day than `b`.
pub fn is_strictly_before_day(a: Date, b: Date) -> bool {
    a < b
}

/// Drops seconds and sub-second precision.
pub fn truncate_to_minute(time: Time) -> Time {
    Time::from_hms(time.hour(), time.minute(), 0).unwrap_or(time)
}

pub fn weekday_code(weekday: Weekday) -> &'static str {
    WEEKDAY_CODES
        .iter()
        .find(|(day, _)| *day == weekday)
        .map(|(_, code)| *code)
        .unwrap_or("SUN")
}

/// Looks up a three-letter weekday code, ignoring case.
pub fn weekday_from_code(code: &str) -> Option<Weekday> {
    WEEKDAY_CODES
        .iter()
        .find(|(_, known)| known.eq_ignore_ascii_case(code.trim()))
        .map(|(day, _)| *day)
}

fn ordinal_suffix(day: u8) -> &'static str {
    if (11..=13).contains(&(day % 100)) {
        return "th";
    }
    match day % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

fn month_from_name(name: &str) -> Option<Month> {
    let mut month = Month::January;
    for _ in 0..12 {
        if month.to_string() == name {
            return Some(month);
        }
        month = month.next();
    }
    None
}
