//! Calendar handling for granule dates.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Day of year, 1-based, leap years included (Feb 29 2024 is day 60).
pub fn day_of_year(date: NaiveDate) -> u32 {
    date.ordinal()
}

/// Day of year zero-padded to three digits, as used in granule names.
pub fn doy_string(date: NaiveDate) -> String {
    format!("{:03}", day_of_year(date))
}

/// First day of the composite period containing `date`.
///
/// Periods restart every January 1st, so the last period of a year is short.
pub fn composite_start(date: NaiveDate, period_days: u32) -> NaiveDate {
    if period_days <= 1 {
        return date;
    }
    let doy = day_of_year(date);
    let start_doy = ((doy - 1) / period_days) * period_days + 1;
    // start_doy <= doy, so it always exists in this year
    date.with_ordinal(start_doy).unwrap_or(date)
}

/// Parse a "YYYY-MM-DD" date.
pub fn parse_date(s: &str) -> PipelineResult<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| PipelineError::invalid_input(format!("invalid date '{}', expected YYYY-MM-DD", s)))
}

/// The temporal extent of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSpec {
    Single(NaiveDate),
    /// Inclusive on both ends.
    Range { start: NaiveDate, end: NaiveDate },
}

impl DateSpec {
    pub fn range(start: NaiveDate, end: NaiveDate) -> PipelineResult<Self> {
        if start > end {
            return Err(PipelineError::invalid_input(format!(
                "date range start {} is after end {}",
                start, end
            )));
        }
        Ok(DateSpec::Range { start, end })
    }

    /// Parse "YYYY-MM-DD" or "YYYY-MM-DD/YYYY-MM-DD".
    pub fn parse(s: &str) -> PipelineResult<Self> {
        match s.split_once('/') {
            Some((start, end)) => Self::range(parse_date(start)?, parse_date(end)?),
            None => Ok(DateSpec::Single(parse_date(s)?)),
        }
    }

    pub fn start(&self) -> NaiveDate {
        match self {
            DateSpec::Single(d) => *d,
            DateSpec::Range { start, .. } => *start,
        }
    }

    pub fn end(&self) -> NaiveDate {
        match self {
            DateSpec::Single(d) => *d,
            DateSpec::Range { end, .. } => *end,
        }
    }

    /// Every calendar day in the extent, ascending.
    pub fn days(&self) -> Vec<NaiveDate> {
        self.start().iter_days().take_while(|d| *d <= self.end()).collect()
    }

    /// Whether `date` falls inside the extent.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start() && date <= self.end()
    }

    /// Catalog temporal parameter: "<start>T00:00:00Z,<end>T23:59:59Z".
    pub fn to_temporal_param(&self) -> String {
        format!(
            "{}T00:00:00Z,{}T23:59:59Z",
            self.start().format("%Y-%m-%d"),
            self.end().format("%Y-%m-%d")
        )
    }
}
