//! Classification of the stored `repeat_schedule` strings.
//!
//! The persisted grammar is `Daily`, `Weekly\nMON, WED`, `Monthly\n1, 15` or
//! empty. Anything else classifies as [`Recurrence::None`] so a malformed value
//! leaves the task inert instead of failing the whole refresh.

use crate::calendar::{weekday_code, weekday_from_code};
use crate::error::AppError;
use std::collections::BTreeSet;
use time::{Date, Weekday};
use tracing::debug;

const DAILY: &str = "Daily";
const WEEKLY: &str = "Weekly";
const MONTHLY: &str = "Monthly";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Recurrence {
    #[default]
    None,
    Daily,
    /// Weekdays kept in Sunday-first order without duplicates.
    Weekly(Vec<Weekday>),
    Monthly(BTreeSet<u8>),
}

impl Recurrence {
    pub fn weekly<I: IntoIterator<Item = Weekday>>(days: I) -> Self {
        let mut days: Vec<Weekday> = days.into_iter().collect();
        days.sort_by_key(|day| day.number_days_from_sunday());
        days.dedup();
        Self::Weekly(days)
    }

    pub fn monthly<I: IntoIterator<Item = u8>>(days: I) -> Self {
        Self::Monthly(days.into_iter().collect())
    }

    /// Whether `date` falls on one of the schedule's days.
    pub fn occurs_on(&self, date: Date) -> bool {
        match self {
            Self::None => false,
            Self::Daily => true,
            Self::Weekly(days) => days.contains(&date.weekday()),
            Self::Monthly(days) => days.contains(&date.day()),
        }
    }

    /// Encodes back into the persisted grammar; `None` has no encoding.
    pub fn encode(&self) -> Option<String> {
        match self {
            Self::None => None,
            Self::Daily => Some(DAILY.to_string()),
            Self::Weekly(days) if days.is_empty() => Some(WEEKLY.to_string()),
            Self::Weekly(days) => {
                let codes: Vec<&str> = days.iter().map(|day| weekday_code(*day)).collect();
                Some(format!("{WEEKLY}\n{}", codes.join(", ")))
            }
            Self::Monthly(days) if days.is_empty() => Some(MONTHLY.to_string()),
            Self::Monthly(days) => {
                let numbers: Vec<String> = days.iter().map(u8::to_string).collect();
                Some(format!("{MONTHLY}\n{}", numbers.join(", ")))
            }
        }
    }

    /// Parses the command-line shorthand: `daily`, `weekly:MON,WED`,
    /// `monthly:1,15`. Unlike [`classify`] this rejects bad input.
    pub fn from_shorthand(raw: &str) -> Result<Self, AppError> {
        let trimmed = raw.trim();
        let (kind, days) = trimmed
            .split_once(':')
            .map(|(kind, days)| (kind.trim(), Some(days)))
            .unwrap_or((trimmed, None));

        let invalid = || {
            AppError::invalid_input(format!(
                "invalid repeat '{raw}' (expected daily, weekly:MON,WED or monthly:1,15)"
            ))
        };

        match (kind.to_ascii_lowercase().as_str(), days) {
            ("daily", None) => Ok(Self::Daily),
            ("weekly", Some(days)) => parse_weekdays(days)
                .filter(|days| !days.is_empty())
                .map(Self::weekly)
                .ok_or_else(invalid),
            ("monthly", Some(days)) => parse_month_days(days)
                .filter(|days| !days.is_empty())
                .map(Self::monthly)
                .ok_or_else(invalid),
            _ => Err(invalid()),
        }
    }
}

/// Maps a stored schedule string onto a [`Recurrence`].
pub fn classify(raw: &str) -> Recurrence {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Recurrence::None;
    }
    if trimmed == DAILY {
        return Recurrence::Daily;
    }

    let parsed = if let Some(rest) = keyword_tail(trimmed, WEEKLY) {
        parse_weekdays(rest).map(Recurrence::weekly)
    } else if let Some(rest) = keyword_tail(trimmed, MONTHLY) {
        parse_month_days(rest).map(Recurrence::monthly)
    } else {
        None
    };

    parsed.unwrap_or_else(|| {
        debug!(schedule = raw, "unrecognised repeat schedule treated as none");
        Recurrence::None
    })
}

fn keyword_tail<'a>(value: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = value.strip_prefix(keyword)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest)
    } else {
        None
    }
}

fn split_list(raw: &str) -> Option<Vec<&str>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(Vec::new());
    }
    let items: Vec<&str> = trimmed.split(',').map(str::trim).collect();
    if items.iter().any(|item| item.is_empty()) {
        return None;
    }
    Some(items)
}

fn parse_weekdays(raw: &str) -> Option<Vec<Weekday>> {
    split_list(raw)?
        .into_iter()
        .map(weekday_from_code)
        .collect()
}

fn parse_month_days(raw: &str) -> Option<Vec<u8>> {
    split_list(raw)?
        .into_iter()
        .map(|item| item.parse::<u8>().ok().filter(|day| (1..=31).contains(day)))
        .collect()
}
