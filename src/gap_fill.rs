//! # Gap filling
//! Makes a sparse series contiguous at the sampling cadence by inserting
//! zero-valued synthetic samples between, before and after the real ones.

use chrono::{DateTime, Duration, Utc};

use crate::model::Sample;

/// Sort by timestamp and collapse duplicates; of several samples with the
/// same timestamp the one that came last wins.
pub fn sort_dedup_keep_last(samples: &mut Vec<Sample>) {
    // stable sort keeps arrival order among equal timestamps
    samples.sort_by_key(|s| s.timestamp);
    samples.reverse();
    samples.dedup_by_key(|s| s.timestamp);
    samples.reverse();
}

/// Sort `samples`, collapse duplicate timestamps (last one wins) and insert
/// synthetic ticks so that:
/// - consecutive samples are at most one `cadence` apart,
/// - the first sample is less than one `cadence` after `start`,
/// - the last sample is less than one `cadence` before `end`.
///
/// Empty input stays empty: without an anchor there is no tick grid.
pub fn fill_gaps(
    mut samples: Vec<Sample>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    cadence: Duration,
) -> Vec<Sample> {
    if samples.is_empty() || cadence <= Duration::zero() {
        return samples;
    }

    sort_dedup_keep_last(&mut samples);

    let mut out = Vec::with_capacity(samples.len());

    // 1) Backward from the first real sample to `start`.
    let first = samples[0].timestamp;
    let mut lead = Vec::new();
    let mut t = first - cadence;
    while t >= start {
        lead.push(Sample::synthetic(t));
        t -= cadence;
    }
    lead.reverse();
    out.extend(lead);

    // 2) Interior gaps.
    let mut prev: Option<DateTime<Utc>> = None;
    for s in samples {
        if let Some(mut last) = prev {
            while s.timestamp - last > cadence {
                last += cadence;
                out.push(Sample::synthetic(last));
            }
        }
        prev = Some(s.timestamp);
        out.push(s);
    }

    // 3) Forward from the last sample to `end`.
    if let Some(last) = prev {
        let mut t = last + cadence;
        while t < end {
            out.push(Sample::synthetic(t));
            t += cadence;
        }
    }

    out
}
