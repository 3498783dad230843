//! # Cross-location aggregation
//! Combines per-location series into one, matching buckets by timestamp.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::transform::{affluence, weighted_returning_average, TransformedSeries};

/// Same shape as [`TransformedSeries`], summed/averaged over locations.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AggregatedSeries {
    pub location_count: usize,
    pub timestamps: Vec<DateTime<Utc>>,
    pub labels: Vec<String>,
    pub count_in: Vec<u64>,
    pub count_out: Vec<u64>,
    pub returning_rate: Vec<f64>,
    pub returning_valid: Vec<bool>,
    pub returning_customers: Vec<f64>,
    pub visit_duration: Vec<f64>,
    pub outside_traffic: Vec<f64>,
    pub affluence: Vec<f64>,
}

impl AggregatedSeries {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn weighted_returning(&self) -> Option<f64> {
        weighted_returning_average(&self.returning_rate, &self.returning_valid, &self.count_in)
    }
}

#[derive(Debug, Default)]
struct Slot {
    label: String,
    count_in: u64,
    count_out: u64,
    customers: f64,
    outside: f64,
    valid_in: u64,
    any_valid: bool,
    duration_sum: f64,
    duration_n: usize,
}

/// Combine `series` bucket by bucket.
///
/// Buckets are matched by timestamp, not position. The timeline is the
/// union of every location's bucket timestamps; a location without a bucket
/// at some timestamp contributes nothing there.
pub fn combine_locations(series: &[TransformedSeries]) -> AggregatedSeries {
    let mut slots: BTreeMap<DateTime<Utc>, Slot> = BTreeMap::new();

    for loc in series {
        for (i, ts) in loc.timestamps.iter().enumerate() {
            let slot = slots.entry(*ts).or_insert_with(|| Slot {
                label: loc.labels[i].clone(),
                ..Default::default()
            });
            slot.count_in += loc.count_in[i];
            slot.count_out += loc.count_out[i];
            slot.outside += loc.outside_traffic[i];
            if loc.returning_valid[i] {
                slot.any_valid = true;
                slot.customers += loc.returning_customers[i];
                slot.valid_in += loc.count_in[i];
            }
            // locations reporting no duration are left out, not averaged as 0
            let d = loc.visit_duration[i];
            if d > 0.0 {
                slot.duration_sum += d;
                slot.duration_n += 1;
            }
        }
    }

    let n = slots.len();
    let mut out = AggregatedSeries {
        location_count: series.len(),
        timestamps: Vec::with_capacity(n),
        labels: Vec::with_capacity(n),
        count_in: Vec::with_capacity(n),
        count_out: Vec::with_capacity(n),
        returning_rate: Vec::with_capacity(n),
        returning_valid: Vec::with_capacity(n),
        returning_customers: Vec::with_capacity(n),
        visit_duration: Vec::with_capacity(n),
        outside_traffic: Vec::with_capacity(n),
        affluence: Vec::with_capacity(n),
    };

    for (ts, slot) in slots {
        let rate = if slot.valid_in > 0 {
            slot.customers / slot.valid_in as f64 * 100.0
        } else {
            0.0
        };

        out.timestamps.push(ts);
        out.labels.push(slot.label);
        out.count_in.push(slot.count_in);
        out.count_out.push(slot.count_out);
        out.returning_customers.push(slot.customers);
        out.returning_rate.push(rate);
        out.returning_valid.push(slot.any_valid);
        out.outside_traffic.push(slot.outside);
        out.visit_duration.push(if slot.duration_n > 0 {
            slot.duration_sum / slot.duration_n as f64
        } else {
            0.0
        });
        out.affluence.push(affluence(slot.count_in as f64, slot.outside));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn loc(id: &str, cin: &[u64], dur: &[f64], outside: &[f64], rate: &[f64]) -> TransformedSeries {
        let n = cin.len();
        let ts: Vec<_> = (0..n)
            .map(|h| Utc.with_ymd_and_hms(2024, 8, 1, h as u32, 0, 0).unwrap())
            .collect();
        TransformedSeries {
            location_id: id.into(),
            name: id.into(),
            labels: ts.iter().map(|t| t.to_rfc3339()).collect(),
            timestamps: ts,
            count_in: cin.to_vec(),
            count_out: cin.to_vec(),
            returning_rate: rate.to_vec(),
            returning_valid: vec![true; n],
            returning_customers: rate
                .iter()
                .zip(cin)
                .map(|(r, c)| r * *c as f64 / 100.0)
                .collect(),
            visit_duration: dur.to_vec(),
            outside_traffic: outside.to_vec(),
            affluence: vec![0.0; n],
        }
    }

    #[test]
    fn zero_locations_yield_empty_arrays() {
        let out = combine_locations(&[]);
        assert!(out.is_empty());
        assert!(out.count_in.is_empty() && out.affluence.is_empty());
        assert_eq!(out.location_count, 0);
    }

    #[test]
    fn sums_counts_and_recomputes_affluence() {
        let a = loc("a", &[10, 30], &[20.0, 0.0], &[100.0, 0.0], &[50.0, 0.0]);
        let b = loc("b", &[30, 10], &[10.0, 8.0], &[100.0, 50.0], &[10.0, 20.0]);
        let out = combine_locations(&[a, b]);

        assert_eq!(out.count_in, vec![40, 40]);
        assert_eq!(out.outside_traffic, vec![200.0, 50.0]);
        // from totals, not the mean of per-location affluence
        assert_eq!(out.affluence, vec![20.0, 80.0]);
        // index 1: location a reports 0 and is excluded
        assert_eq!(out.visit_duration, vec![15.0, 8.0]);
        // (5 + 3) / 40
        assert!((out.returning_rate[0] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn empty_first_location_does_not_hide_the_others() {
        let empty = TransformedSeries::default();
        let b = loc("b", &[5], &[3.0], &[10.0], &[0.0]);
        let out = combine_locations(&[empty, b]);
        assert_eq!(out.count_in, vec![5]);
        assert_eq!(out.location_count, 2);
    }

    /// Drop the first `n` buckets of every array.
    fn skip(mut s: TransformedSeries, n: usize) -> TransformedSeries {
        s.timestamps.drain(..n);
        s.labels.drain(..n);
        s.count_in.drain(..n);
        s.count_out.drain(..n);
        s.returning_rate.drain(..n);
        s.returning_valid.drain(..n);
        s.returning_customers.drain(..n);
        s.visit_duration.drain(..n);
        s.outside_traffic.drain(..n);
        s.affluence.drain(..n);
        s
    }

    #[test]
    fn buckets_are_matched_by_timestamp() {
        let a = loc("a", &[1, 1, 1, 1], &[0.0; 4], &[0.0; 4], &[0.0; 4]);
        // b only has the last two hours
        let b = skip(loc("b", &[7, 7, 9, 9], &[0.0; 4], &[0.0; 4], &[0.0; 4]), 2);

        let out = combine_locations(&[b.clone(), a.clone()]);
        assert_eq!(out.timestamps, a.timestamps);
        assert_eq!(out.count_in, vec![1, 1, 10, 10]);
        assert_eq!(out, combine_locations(&[a, b]));
    }
}
