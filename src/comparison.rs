//! # Comparison periods
//! Equal-length preceding period for a window and the delta of a headline
//! metric between the two.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::TimeWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonPeriods {
    pub current: TimeWindow,
    pub previous: TimeWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub current: f64,
    pub previous: f64,
    pub delta: f64,
    pub delta_percentage: f64,
    pub trend: Trend,
}

fn start_of_day(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn end_of_day(ts: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(ts) + Duration::days(1) - Duration::milliseconds(1)
}

/// Previous period of the same duration, ending the millisecond before
/// `current.start`, day-aligned (UTC): it ends at 23:59:59.999 and starts at
/// 00:00:00.000.
pub fn comparison_periods(current: TimeWindow) -> ComparisonPeriods {
    let duration = current.duration();
    let prev_end = end_of_day(current.start - Duration::milliseconds(1));
    let prev_start = start_of_day(prev_end - duration + Duration::milliseconds(1));
    ComparisonPeriods {
        current,
        previous: TimeWindow::new(prev_start, prev_end),
    }
}

/// Delta of `current` against `previous`.
///
/// A previous value of 0 cannot be divided by: growth from 0 reports +100%,
/// no growth reports 0%.
pub fn metric_comparison(current: f64, previous: f64) -> MetricComparison {
    let delta = current - previous;
    let delta_percentage = if previous != 0.0 {
        delta / previous * 100.0
    } else if current > 0.0 {
        100.0
    } else {
        0.0
    };
    let trend = if delta > f64::EPSILON {
        Trend::Up
    } else if delta < -f64::EPSILON {
        Trend::Down
    } else {
        Trend::Stable
    };
    MetricComparison {
        current,
        previous,
        delta,
        delta_percentage,
        trend,
    }
}
