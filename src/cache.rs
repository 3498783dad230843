//! # Location cache
//! Stateful core of the pipeline: per-location raw samples plus the window
//! for which they are known to be complete.
//!
//! Lifecycle: `Empty` → (merge) → `Populated` → (reset) → `Empty`.
//! `revision` changes on every mutation so callers can dirty-check derived
//! results; `generation` changes only on reset so a fetch started for an
//! older selection can be recognised and dropped.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Duration;
use serde::Serialize;

use crate::gap_fill::fill_gaps;
use crate::model::{default_cadence, LocationSeries, TimeWindow};
use crate::range_filter::filter_to_window;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    Empty,
    Populated,
}

#[derive(Debug)]
pub struct LocationCache {
    locations: Vec<LocationSeries>,
    fetched: Option<TimeWindow>,
    cadence: Duration,
    revision: u64,
    generation: u64,
}

impl Default for LocationCache {
    fn default() -> Self {
        Self::with_cadence(default_cadence())
    }
}

impl LocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cadence(cadence: Duration) -> Self {
        Self {
            locations: Vec::new(),
            fetched: None,
            cadence: if cadence > Duration::zero() {
                cadence
            } else {
                default_cadence()
            },
            revision: 0,
            generation: 0,
        }
    }

    pub fn state(&self) -> CacheState {
        if self.fetched.is_none() {
            CacheState::Empty
        } else {
            CacheState::Populated
        }
    }

    pub fn fetched_window(&self) -> Option<&TimeWindow> {
        self.fetched.as_ref()
    }

    pub fn locations(&self) -> &[LocationSeries] {
        &self.locations
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Drop every sample and the fetched window.
    pub fn reset(&mut self) {
        self.locations.clear();
        self.fetched = None;
        self.revision += 1;
        self.generation += 1;
    }

    /// Merge freshly fetched series covering `range` into the cache.
    ///
    /// Samples are concatenated per location id; when the same timestamp
    /// arrives twice the incoming sample replaces the cached one. Afterwards
    /// every location is re-filled across the whole fetched window, so one
    /// that reported nothing for `range` still has a tick for every cadence
    /// step there. Returns the number of incoming samples.
    pub fn merge(&mut self, range: TimeWindow, incoming: Vec<LocationSeries>) -> usize {
        let mut merged = 0usize;

        for loc in incoming {
            merged += loc.samples.len();
            match self.locations.iter_mut().find(|l| l.id == loc.id) {
                Some(existing) => {
                    if !loc.name.is_empty() {
                        existing.name = loc.name;
                    }
                    existing.samples.extend(loc.samples);
                }
                None => self.locations.push(loc),
            }
        }

        let fetched = match self.fetched {
            Some(prev) => prev.union(&range),
            None => range,
        };
        for loc in &mut self.locations {
            let samples = std::mem::take(&mut loc.samples);
            loc.samples = fill_gaps(samples, fetched.start, fetched.end, self.cadence);
        }

        self.fetched = Some(fetched);
        self.revision += 1;
        merged
    }

    /// Samples of every location clipped to `window`.
    pub fn visible(&self, window: &TimeWindow) -> Vec<LocationSeries> {
        filter_to_window(&self.locations, window)
    }

    pub fn sample_count(&self) -> usize {
        self.locations.iter().map(|l| l.samples.len()).sum()
    }
}

/// Single-slot re-entrancy guard: at most one fetch per session.
#[derive(Debug, Default)]
pub struct InFlight(AtomicBool);

impl InFlight {
    /// `None` when a fetch is already running; the caller drops its request.
    pub fn try_acquire(&self) -> Option<InFlightGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(&self.0))
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sample;
    use chrono::{DateTime, Datelike, TimeZone, Utc};

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, d, 0, 0, 0).unwrap()
    }

    fn cache() -> LocationCache {
        LocationCache::with_cadence(Duration::days(1))
    }

    fn loc(id: &str, days: &[u32]) -> LocationSeries {
        LocationSeries::new(
            id,
            id.to_uppercase(),
            days.iter().map(|d| Sample::new(day(*d), *d as u64, 0)).collect(),
        )
    }

    #[test]
    fn first_merge_sets_window_and_populates() {
        let mut c = cache();
        assert_eq!(c.state(), CacheState::Empty);
        c.merge(TimeWindow::new(day(1), day(3)), vec![loc("a", &[1, 2])]);
        assert_eq!(c.state(), CacheState::Populated);
        assert_eq!(c.fetched_window(), Some(&TimeWindow::new(day(1), day(3))));
    }

    #[test]
    fn adjacent_merges_equal_one_big_merge() {
        let mut split = cache();
        split.merge(TimeWindow::new(day(1), day(4)), vec![loc("a", &[1, 2, 3])]);
        split.merge(TimeWindow::new(day(4), day(7)), vec![loc("a", &[4, 5, 6])]);

        let mut whole = cache();
        whole.merge(
            TimeWindow::new(day(1), day(7)),
            vec![loc("a", &[1, 2, 3, 4, 5, 6])],
        );

        assert_eq!(split.fetched_window(), whole.fetched_window());
        assert_eq!(split.locations(), whole.locations());
    }

    #[test]
    fn left_extension_is_reordered_and_new_locations_are_added() {
        let mut c = cache();
        c.merge(TimeWindow::new(day(5), day(8)), vec![loc("a", &[5, 6, 7])]);
        c.merge(
            TimeWindow::new(day(2), day(5)),
            vec![loc("a", &[2, 3, 4]), loc("b", &[3])],
        );

        let a: Vec<u64> = c.locations()[0].samples.iter().map(|s| s.count_in).collect();
        assert_eq!(a, vec![2, 3, 4, 5, 6, 7]);
        assert_eq!(c.locations().len(), 2);
        assert_eq!(c.fetched_window(), Some(&TimeWindow::new(day(2), day(8))));
    }

    #[test]
    fn overlapping_refetch_does_not_duplicate() {
        let mut c = cache();
        c.merge(TimeWindow::new(day(3), day(5)), vec![loc("a", &[3, 4])]);
        c.merge(TimeWindow::new(day(1), day(7)), vec![loc("a", &[1, 2, 3, 4, 5, 6])]);
        assert_eq!(c.sample_count(), 6);
    }

    #[test]
    fn location_silent_during_a_delta_is_filled_across_it() {
        let mut c = cache();
        c.merge(
            TimeWindow::new(day(10), day(12)),
            vec![loc("a", &[10, 11]), loc("b", &[10, 11])],
        );
        // b reports nothing for the left extension
        c.merge(
            TimeWindow::new(day(1), day(10)),
            vec![loc("a", &[1, 2, 3, 4, 5, 6, 7, 8, 9]), loc("b", &[])],
        );

        let days = |i: usize| -> Vec<u32> {
            c.locations()[i]
                .samples
                .iter()
                .map(|s| s.timestamp.day())
                .collect()
        };
        assert_eq!(days(0), (1..=11).collect::<Vec<_>>());
        assert_eq!(days(1), days(0));

        let b: Vec<u64> = c.locations()[1].samples.iter().map(|s| s.count_in).collect();
        assert_eq!(b, vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 10, 11]);
    }

    #[test]
    fn reset_clears_and_bumps_generation() {
        let mut c = cache();
        c.merge(TimeWindow::new(day(1), day(2)), vec![loc("a", &[1])]);
        let gen = c.generation();
        let rev = c.revision();
        c.reset();
        assert_eq!(c.state(), CacheState::Empty);
        assert!(c.locations().is_empty());
        assert_eq!(c.generation(), gen + 1);
        assert!(c.revision() > rev);
    }

    #[test]
    fn in_flight_admits_one_holder() {
        let f = InFlight::default();
        let g = f.try_acquire();
        assert!(g.is_some());
        assert!(f.try_acquire().is_none());
        drop(g);
        assert!(!f.is_busy());
        assert!(f.try_acquire().is_some());
    }
}
