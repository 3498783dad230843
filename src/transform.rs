//! # Transform / derive
//! Turns bucketed samples of one location into index-aligned, display-ready
//! arrays and derives affluence and validated returning-customer values.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bucket::{BucketedSeries, Granularity};

/// Per-location output. Index `i` of every array refers to the same bucket.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TransformedSeries {
    pub location_id: String,
    pub name: String,
    pub timestamps: Vec<DateTime<Utc>>,
    pub labels: Vec<String>,
    pub count_in: Vec<u64>,
    pub count_out: Vec<u64>,
    /// Returning-customer percentage after dropout validation.
    pub returning_rate: Vec<f64>,
    pub returning_valid: Vec<bool>,
    /// Estimated returning customers (`rate * count_in / 100`), 0 when invalid.
    pub returning_customers: Vec<f64>,
    pub visit_duration: Vec<f64>,
    pub outside_traffic: Vec<f64>,
    pub affluence: Vec<f64>,
}

impl TransformedSeries {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Count-in weighted returning rate over the whole series.
    pub fn weighted_returning(&self) -> Option<f64> {
        weighted_returning_average(&self.returning_rate, &self.returning_valid, &self.count_in)
    }
}

/// Entries as a percentage of outside traffic; 0 when there is no traffic.
pub fn affluence(count_in: f64, outside_traffic: f64) -> f64 {
    if outside_traffic > 0.0 {
        count_in / outside_traffic * 100.0
    } else {
        0.0
    }
}

/// Flags sensor dropouts in a returning-customer series.
///
/// The first value is always valid. A literal zero right after a non-zero
/// value is a dropout; a zero after a zero is a real zero.
pub fn validate_returning(values: &[f64]) -> Vec<bool> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            if i == 0 {
                return true;
            }
            !(v == 0.0 && values[i - 1] != 0.0)
        })
        .collect()
}

/// `sum(rate * in) / sum(in)` over valid buckets with a positive weight.
pub fn weighted_returning_average(rates: &[f64], valid: &[bool], weights: &[u64]) -> Option<f64> {
    let mut num = 0.0;
    let mut den = 0.0;
    for ((&r, &ok), &w) in rates.iter().zip(valid).zip(weights) {
        if !ok || w == 0 {
            continue;
        }
        num += r * w as f64;
        den += w as f64;
    }
    (den > 0.0).then(|| num / den)
}

/// Build the display series for one location.
pub fn transform_location(series: &BucketedSeries, granularity: Granularity) -> TransformedSeries {
    let n = series.buckets.len();
    let raw_returning: Vec<f64> = series
        .buckets
        .iter()
        .map(|b| b.returning.unwrap_or(0.0))
        .collect();
    let valid = validate_returning(&raw_returning);

    let mut out = TransformedSeries {
        location_id: series.id.clone(),
        name: series.name.clone(),
        timestamps: Vec::with_capacity(n),
        labels: Vec::with_capacity(n),
        count_in: Vec::with_capacity(n),
        count_out: Vec::with_capacity(n),
        returning_rate: Vec::with_capacity(n),
        returning_valid: valid,
        returning_customers: Vec::with_capacity(n),
        visit_duration: Vec::with_capacity(n),
        outside_traffic: Vec::with_capacity(n),
        affluence: Vec::with_capacity(n),
    };

    for (i, b) in series.buckets.iter().enumerate() {
        let ok = out.returning_valid[i];
        let rate = if ok { raw_returning[i] } else { 0.0 };
        let outside = b.outside_traffic.unwrap_or(0.0);

        out.timestamps.push(b.start);
        out.labels.push(granularity.label(b.start));
        out.count_in.push(b.count_in);
        out.count_out.push(b.count_out);
        out.returning_rate.push(rate);
        out.returning_customers.push(rate * b.count_in as f64 / 100.0);
        out.visit_duration.push(b.visit_duration.unwrap_or(0.0));
        out.outside_traffic.push(outside);
        out.affluence.push(affluence(b.count_in as f64, outside));
    }

    out
}

pub fn transform_locations(
    series: &[BucketedSeries],
    granularity: Granularity,
) -> Vec<TransformedSeries> {
    series
        .iter()
        .map(|s| transform_location(s, granularity))
        .collect()
}
