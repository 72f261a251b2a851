use std::fmt;

use chrono::{DateTime, Utc};
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};

/// Half-open time range `[start, end)` of a requested or confirmed occupancy.
///
/// This is the only overlap rule in the engine: every call site (submission,
/// approval, reconciliation, history queries) goes through [`Interval::overlaps`],
/// so back-to-back bookings never conflict anywhere.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, IntervalError> {
        if start >= end {
            return Err(IntervalError::Empty);
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// `[a, b)` intersects `[c, d)` iff `a < d && c < b`.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Inclusive calendar-day count for billing: a rental touching N calendar
    /// days is billed N times the daily rate. A billing rule, not a duration.
    pub fn billable_days(&self) -> u32 {
        let days = (self.end.date_naive() - self.start.date_naive()).num_days();
        days.max(0) as u32 + 1
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Error, Display, Debug, PartialEq, Eq)]
pub enum IntervalError {
    #[display(fmt = "Interval must end after it starts")]
    Empty,
}
