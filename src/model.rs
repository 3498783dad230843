//! # Data model
//! Raw sensor samples, per-location series and the `[start, end)` windows the
//! cache reasons about.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Sampling cadence of the raw sensor feed (5 minutes).
pub const DEFAULT_CADENCE_MINUTES: i64 = 5;

pub fn default_cadence() -> Duration {
    Duration::minutes(DEFAULT_CADENCE_MINUTES)
}

/// One sensor reading. Synthetic (gap-filled) samples carry zero counts and
/// no extended attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub count_in: u64,
    pub count_out: u64,
    /// Returning-customer percentage (0..=100).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returning: Option<f64>,
    /// Average visit duration in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visit_duration: Option<f64>,
    /// Passers-by counted outside the entrance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outside_traffic: Option<f64>,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, count_in: u64, count_out: u64) -> Self {
        Self {
            timestamp,
            count_in,
            count_out,
            returning: None,
            visit_duration: None,
            outside_traffic: None,
        }
    }

    /// Zero-valued filler sample used to make a series contiguous.
    pub fn synthetic(timestamp: DateTime<Utc>) -> Self {
        Self::new(timestamp, 0, 0)
    }

    pub fn with_returning(mut self, pct: f64) -> Self {
        self.returning = Some(pct);
        self
    }

    pub fn with_visit_duration(mut self, minutes: f64) -> Self {
        self.visit_duration = Some(minutes);
        self
    }

    pub fn with_outside_traffic(mut self, count: f64) -> Self {
        self.outside_traffic = Some(count);
        self
    }
}

/// Ordered samples of one physical location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSeries {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub samples: Vec<Sample>,
}

impl LocationSeries {
    pub fn new(id: impl Into<String>, name: impl Into<String>, samples: Vec<Sample>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            samples,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Half-open `[start, end)` time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// True when `other` lies entirely inside `self`.
    pub fn covers(&self, other: &TimeWindow) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// Smallest window spanning both.
    pub fn union(&self, other: &TimeWindow) -> TimeWindow {
        TimeWindow {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Inclusive on both ends; the range filter treats `end` as visible.
    pub fn contains_inclusive(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}
