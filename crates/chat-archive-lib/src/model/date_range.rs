use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, Result};

/// Inclusive range of calendar days, iterated in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(ArchiveError::Config(format!(
                "date range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Every day from `start` to `end`, both included.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

/// What a run enumerates: the whole collection once, or one pass per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateScope {
    Unfiltered,
    Range(DateRange),
}

impl DateScope {
    /// Build a scope from optional CLI bounds. A lone bound selects that single day.
    pub fn from_bounds(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Self> {
        match (from, to) {
            (None, None) => Ok(DateScope::Unfiltered),
            (Some(day), None) | (None, Some(day)) => Ok(DateScope::Range(DateRange::new(day, day)?)),
            (Some(from), Some(to)) => Ok(DateScope::Range(DateRange::new(from, to)?)),
        }
    }

    /// The date filters to query, in order. `None` means "no filter".
    pub fn filters(&self) -> Vec<Option<NaiveDate>> {
        match self {
            DateScope::Unfiltered => vec![None],
            DateScope::Range(range) => range.days().map(Some).collect(),
        }
    }
}
