//! # Time buckets
//! Groups raw samples of each location into fixed calendar buckets
//! (15 minutes, hourly, daily, ...).
//!
//! Count-in/count-out are flow counts and always summed. Visit duration and
//! returning percentage are rates and always averaged. Outside traffic follows
//! the requested [`AggregationMode`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{LocationSeries, Sample};

/// Bucket width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// Raw 5-minute ticks.
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    Hour,
    Day,
    /// ISO week starting Monday.
    Week,
    Month,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        };
        f.write_str(s)
    }
}

impl Granularity {
    fn minutes(self) -> Option<i64> {
        match self {
            Self::FiveMinutes => Some(5),
            Self::FifteenMinutes => Some(15),
            Self::ThirtyMinutes => Some(30),
            Self::Hour => Some(60),
            Self::Day | Self::Week | Self::Month => None,
        }
    }

    /// Start of the bucket containing `ts`.
    pub fn floor(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        if let Some(m) = self.minutes() {
            let step = m * 60;
            let secs = ts.timestamp();
            return DateTime::from_timestamp(secs - secs.rem_euclid(step), 0).unwrap_or(ts);
        }

        let date = ts.date_naive();
        let start: NaiveDate = match self {
            Self::Week => {
                date - chrono::Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            Self::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date),
            _ => date,
        };
        start.and_time(NaiveTime::MIN).and_utc()
    }

    /// Human-readable label for a bucket start.
    pub fn label(self, ts: DateTime<Utc>) -> String {
        let fmt = match self {
            Self::Day => "%Y-%m-%d",
            Self::Week => "%G-W%V",
            Self::Month => "%Y-%m",
            _ => "%Y-%m-%d %H:%M",
        };
        ts.format(fmt).to_string()
    }
}

/// How non-rate extended attributes are combined inside a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    #[default]
    Sum,
    Average,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub start: DateTime<Utc>,
    pub count_in: u64,
    pub count_out: u64,
    pub returning: Option<f64>,
    pub visit_duration: Option<f64>,
    pub outside_traffic: Option<f64>,
    /// Raw samples that fell into this bucket.
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketedSeries {
    pub id: String,
    pub name: String,
    pub buckets: Vec<Bucket>,
}

#[derive(Debug, Default)]
struct Acc {
    count_in: u64,
    count_out: u64,
    returning: Mean,
    visit_duration: Mean,
    outside: Mean,
    samples: usize,
}

#[derive(Debug, Default)]
struct Mean {
    sum: f64,
    n: usize,
}

impl Mean {
    fn add(&mut self, v: Option<f64>) {
        if let Some(v) = v.filter(|v| v.is_finite()) {
            self.sum += v;
            self.n += 1;
        }
    }

    fn mean(&self) -> Option<f64> {
        (self.n > 0).then(|| self.sum / self.n as f64)
    }

    fn total(&self) -> Option<f64> {
        (self.n > 0).then_some(self.sum)
    }
}

impl Acc {
    fn add(&mut self, s: &Sample) {
        self.count_in += s.count_in;
        self.count_out += s.count_out;
        self.returning.add(s.returning);
        self.visit_duration.add(s.visit_duration);
        self.outside.add(s.outside_traffic);
        self.samples += 1;
    }

    fn finish(self, start: DateTime<Utc>, mode: AggregationMode) -> Bucket {
        Bucket {
            start,
            count_in: self.count_in,
            count_out: self.count_out,
            returning: self.returning.mean(),
            visit_duration: self.visit_duration.mean(),
            outside_traffic: match mode {
                AggregationMode::Sum => self.outside.total(),
                AggregationMode::Average => self.outside.mean(),
            },
            samples: self.samples,
        }
    }
}

/// Bucket one location's samples. Output is ordered by bucket start.
pub fn bucket_samples(
    samples: &[Sample],
    granularity: Granularity,
    mode: AggregationMode,
) -> Vec<Bucket> {
    let mut groups: BTreeMap<DateTime<Utc>, Acc> = BTreeMap::new();
    for s in samples {
        groups
            .entry(granularity.floor(s.timestamp))
            .or_default()
            .add(s);
    }
    groups
        .into_iter()
        .map(|(start, acc)| acc.finish(start, mode))
        .collect()
}

/// Bucket every location independently.
pub fn bucket_locations(
    series: &[LocationSeries],
    granularity: Granularity,
    mode: AggregationMode,
) -> Vec<BucketedSeries> {
    series
        .iter()
        .map(|loc| BucketedSeries {
            id: loc.id.clone(),
            name: loc.name.clone(),
            buckets: bucket_samples(&loc.samples, granularity, mode),
        })
        .collect()
}
