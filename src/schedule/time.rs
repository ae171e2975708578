//! Service-day time arithmetic.
//!
//! Scheduled times are integer seconds from the start of a trip's service
//! day, not wall-clock instants: a trip leaving at `25:30:00` belongs to the
//! previous calendar date's service day. Dates are plain calendar dates with
//! no time zone attached.

use chrono::{Datelike, NaiveDate};
use std::fmt;

pub const SECONDS_PER_DAY: u32 = 86_400;

/// Parses a GTFS `HH:MM:SS` time into seconds since the start of the
/// service day. Hours may be 24 or more.
pub fn parse_service_time(value: &str) -> Option<u32> {
    let mut parts = value.trim().split(':');
    let hours = parts.next()?;
    let minutes = parts.next()?;
    let seconds = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    if hours.is_empty() || hours.len() > 3 || minutes.len() != 2 || seconds.len() != 2 {
        return None;
    }
    if ![hours, minutes, seconds]
        .iter()
        .all(|p| p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }

    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    let seconds: u32 = seconds.parse().ok()?;
    if minutes > 59 || seconds > 59 {
        return None;
    }

    Some(hours * 3600 + minutes * 60 + seconds)
}

/// Renders seconds since the start of the service day as `HH:MM:SS`,
/// keeping hours past 23.
pub fn format_service_time(seconds: u32) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// A calendar date identifying a service day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceDate(NaiveDate);

impl ServiceDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// Parses the GTFS `YYYYMMDD` form.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        NaiveDate::parse_from_str(value, "%Y%m%d").ok().map(Self)
    }

    pub fn previous(self) -> Option<Self> {
        self.0.pred_opt().map(Self)
    }

    pub fn date(self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for ServiceDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}{:02}{:02}",
            self.0.year(),
            self.0.month(),
            self.0.day()
        )
    }
}
