//! Date and week-key resolution.
//!
//! Spreadsheet dates arrive either as day serials counted from 1899-12-30 or
//! as free-form strings. Everything downstream buckets on [`WeekKey`]
//! (`YYYY/wkNN`, Monday-start) or [`MonthKey`] (`YYYY-MM`).
//!
//! Week numbering counts from the Monday on or before January 1 of the
//! date's calendar year. It is not ISO 8601: the last days of December can
//! land in `wk53` of their own year while the same Monday-week is `wk01` of
//! the next year for dates after January 1.

use crate::cell::CellValue;
use crate::error::{DashboardError, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref EXCEL_EPOCH: NaiveDate = NaiveDate::from_ymd_opt(1899, 12, 30).unwrap();
    static ref WEEK_KEY_REGEX: Regex = Regex::new(r"(\d{4})/wk(\d+)").unwrap();
    static ref MONTH_KEY_REGEX: Regex = Regex::new(r"^(\d{4})[-/](\d{1,2})$").unwrap();
    static ref YEAR_ONLY_REGEX: Regex = Regex::new(r"^\d{4}$").unwrap();
    static ref SLASH_DATE_REGEX: Regex = Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{2,4})$").unwrap();
}

// Roughly the year 10000; chrono cannot represent much further anyway.
const MAX_SERIAL_DAYS: f64 = 3_000_000.0;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// Converts a spreadsheet day serial to a calendar date. Time of day is dropped.
pub fn from_serial(serial: f64) -> Result<NaiveDate> {
    if !serial.is_finite() || serial.abs() > MAX_SERIAL_DAYS {
        return Err(DashboardError::InvalidDate(serial.to_string()));
    }
    EXCEL_EPOCH
        .checked_add_signed(Duration::days(serial.floor() as i64))
        .ok_or_else(|| DashboardError::InvalidDate(serial.to_string()))
}

/// Parses `M/D/YY`, `M/D/YYYY`, ISO dates and date-times, or a numeric serial.
///
/// Two-digit years from 50 up are 19xx, the rest 20xx. A bare four-digit
/// number is January 1 of that year; any other number is a day serial.
pub fn parse_date_text(text: &str) -> Result<NaiveDate> {
    let text = text.trim();
    let invalid = || DashboardError::InvalidDate(text.to_string());

    if text.is_empty() {
        return Err(invalid());
    }

    // a bare four-digit number is a year, not a day serial
    if YEAR_ONLY_REGEX.is_match(text) {
        let year: i32 = text.parse().map_err(|_| invalid())?;
        return NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(invalid);
    }

    if let Ok(serial) = text.parse::<f64>() {
        return from_serial(serial);
    }

    if let Some(caps) = SLASH_DATE_REGEX.captures(text) {
        let month: u32 = caps[1].parse().map_err(|_| invalid())?;
        let day: u32 = caps[2].parse().map_err(|_| invalid())?;
        let mut year: i32 = caps[3].parse().map_err(|_| invalid())?;
        if year < 100 {
            year += if year >= 50 { 1900 } else { 2000 };
        }
        return NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid);
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Ok(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(datetime.date());
        }
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Ok(datetime.date_naive());
    }

    Err(invalid())
}

/// Resolves a raw cell to a calendar date.
pub fn resolve(value: &CellValue) -> Result<NaiveDate> {
    match value {
        CellValue::Number(serial) => from_serial(*serial),
        CellValue::Text(text) => parse_date_text(text),
        other => Err(DashboardError::InvalidDate(format!("{other:?}"))),
    }
}

/// The Monday on or before January 1 of `year`.
pub fn first_monday(year: i32) -> Option<NaiveDate> {
    let jan1 = NaiveDate::from_ymd_opt(year, 1, 1)?;
    Some(monday_of(jan1))
}

pub fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeekKey {
    pub year: i32,
    pub week: u32,
}

impl WeekKey {
    pub fn new(year: i32, week: u32) -> Option<Self> {
        (1..=99).contains(&week).then_some(WeekKey { year, week })
    }

    /// `year * 100 + week`; ordering keys by this is chronological.
    pub fn sort_index(&self) -> i64 {
        self.year as i64 * 100 + self.week as i64
    }

    /// Monday and Sunday of the week, inclusive.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let start = first_monday(self.year)?
            .checked_add_signed(Duration::days((self.week as i64 - 1) * 7))?;
        Some((start, start + Duration::days(6)))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.date_range()
            .is_some_and(|(start, end)| start <= date && date <= end)
    }
}

/// Week key for a calendar date.
pub fn week_key(date: NaiveDate) -> WeekKey {
    let year = date.year();
    let Some(year_start) = first_monday(year) else {
        return WeekKey { year, week: 1 };
    };

    let days = (monday_of(date) - year_start).num_days();
    let week = days.div_euclid(7) + 1;

    if week <= 0 {
        return match NaiveDate::from_ymd_opt(year - 1, 12, 31) {
            Some(prev) => week_key(prev),
            None => WeekKey { year, week: 1 },
        };
    }
    if week > 53 {
        return WeekKey {
            year: year + 1,
            week: 1,
        };
    }

    WeekKey {
        year,
        week: week as u32,
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/wk{:02}", self.year, self.week)
    }
}

impl FromStr for WeekKey {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || DashboardError::InvalidDate(format!("week key {s:?}"));
        let caps = WEEK_KEY_REGEX.captures(s).ok_or_else(invalid)?;
        let year = caps[1].parse().map_err(|_| invalid())?;
        let week = caps[2].parse().map_err(|_| invalid())?;
        WeekKey::new(year, week).ok_or_else(invalid)
    }
}

impl Serialize for WeekKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WeekKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(MonthKey { year, month })
    }

    /// Month column cells are usually `2025/07`-style text, sometimes a date.
    pub fn from_cell(value: &CellValue) -> Option<Self> {
        if let CellValue::Text(text) = value {
            if let Ok(key) = text.parse() {
                return Some(key);
            }
        }
        resolve(value).ok().map(month_key)
    }
}

pub fn month_key(date: NaiveDate) -> MonthKey {
    MonthKey {
        year: date.year(),
        month: date.month(),
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || DashboardError::InvalidDate(format!("month key {s:?}"));
        let caps = MONTH_KEY_REGEX.captures(s.trim()).ok_or_else(invalid)?;
        let year = caps[1].parse().map_err(|_| invalid())?;
        let month = caps[2].parse().map_err(|_| invalid())?;
        MonthKey::new(year, month).ok_or_else(invalid)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
