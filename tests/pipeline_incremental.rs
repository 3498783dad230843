// tests/pipeline_incremental.rs
//
// End-to-end behaviour of the session cache: only missing ranges are fetched,
// the fetched window grows monotonically and repeated requests hit the memo.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use footfall_dashboard::{
    auth::AuthFlag,
    bucket::{AggregationMode, Granularity},
    cache::CacheState,
    clock::FixedClock,
    ingest::providers::{memory::MemorySource, synthetic::SyntheticSource},
    model::{default_cadence, LocationSeries, Sample, TimeWindow},
    Pipeline, SeriesRequest,
};

const TICKS_PER_DAY: usize = 288;

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, d, 0, 0, 0).unwrap()
}

/// Two sensors reporting every 5 minutes for the whole of July.
fn july() -> Vec<LocationSeries> {
    ["s1", "s2"]
        .iter()
        .map(|id| {
            let mut samples = Vec::new();
            let mut t = day(1);
            while t < day(31) + Duration::days(1) {
                samples.push(
                    Sample::new(t, 3, 2)
                        .with_outside_traffic(10.0)
                        .with_returning(20.0),
                );
                t += default_cadence();
            }
            LocationSeries::new(*id, format!("Entrance {id}"), samples)
        })
        .collect()
}

fn setup(now: DateTime<Utc>) -> (Pipeline, Arc<MemorySource>, Arc<FixedClock>) {
    let source = Arc::new(MemorySource::new(july()));
    let clock = Arc::new(FixedClock::new(now));
    let pipeline = Pipeline::new(
        Arc::new(SyntheticSource::new(7, default_cadence())),
        clock.clone(),
        Arc::new(AuthFlag::new(true)),
    )
    .with_source(source.clone());
    (pipeline, source, clock)
}

fn req(start: DateTime<Utc>, end: DateTime<Utc>) -> SeriesRequest {
    SeriesRequest {
        sensor_ids: vec!["s2".into(), "s1".into()],
        start,
        end,
        granularity: Granularity::Day,
        mode: AggregationMode::Sum,
    }
}

#[tokio::test]
async fn narrowing_and_extending_fetch_only_the_delta() {
    let (p, source, _) = setup(Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap());
    assert_eq!(p.cache_state(), CacheState::Empty);

    // 14 days: one fetch for the whole window
    let first = p.get_series(&req(day(1), day(15))).await;
    assert!(first.error.is_none());
    assert!(!first.loading);
    assert_eq!(source.windows(), vec![TimeWindow::new(day(1), day(15))]);
    assert_eq!(p.cached_samples(), 2 * 14 * TICKS_PER_DAY);
    assert_eq!(first.combined.count_in.len(), 14);
    assert_eq!(first.combined.count_in[0], 2 * 3 * TICKS_PER_DAY as u64);

    // last 7 days of it: served from cache
    let narrow = p.get_series(&req(day(8), day(15))).await;
    assert_eq!(source.calls().len(), 1);
    assert_eq!(narrow.per_location.len(), 2);
    assert_eq!(narrow.combined.count_in.len(), 7);
    assert_eq!(p.cache_state(), CacheState::Populated);

    // 3 more days: only those are fetched
    let wide = p.get_series(&req(day(8), day(18))).await;
    assert_eq!(source.calls().len(), 2);
    assert_eq!(source.windows()[1], TimeWindow::new(day(15), day(18)));
    assert_eq!(p.fetched_window(), Some(TimeWindow::new(day(1), day(18))));
    assert_eq!(wide.fetched_window, Some(TimeWindow::new(day(1), day(18))));
    assert_eq!(p.cached_samples(), 2 * 17 * TICKS_PER_DAY);
    assert_eq!(wide.combined.count_in.len(), 10);

    // sensor order in the request does not matter
    let (ids, _) = &source.calls()[1];
    assert_eq!(ids, &vec!["s1".to_string(), "s2".to_string()]);
}

#[tokio::test]
async fn repeated_request_is_served_from_memo() {
    let (p, source, _) = setup(Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap());

    let a = p.get_series(&req(day(1), day(4))).await;
    let b = p.get_series(&req(day(1), day(4))).await;
    assert_eq!(a, b);
    assert_eq!(source.calls().len(), 1);
    assert!(b.last_updated.is_none(), "no refresh store attached");
}

#[tokio::test]
async fn left_extension_prepends_history() {
    let (p, source, _) = setup(Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap());

    p.get_series(&req(day(10), day(12))).await;
    let out = p.get_series(&req(day(5), day(12))).await;

    assert_eq!(source.windows()[1], TimeWindow::new(day(5), day(10)));
    assert_eq!(p.fetched_window(), Some(TimeWindow::new(day(5), day(12))));
    assert_eq!(out.combined.count_in.len(), 7);
    let first_bucket = out.combined.timestamps[0];
    assert_eq!(first_bucket, day(5));
}

#[tokio::test]
async fn future_tail_waits_until_it_is_in_the_past() {
    let now = Utc.with_ymd_and_hms(2024, 7, 9, 12, 0, 0).unwrap();
    let (p, source, clock) = setup(now);

    p.get_series(&req(day(1), day(10))).await;
    assert_eq!(source.calls().len(), 1);

    // end lies in the future and data is visible: nothing to fetch yet
    let out = p.get_series(&req(day(5), day(12))).await;
    assert_eq!(source.calls().len(), 1);
    assert!(!out.combined.is_empty());

    clock.set(Utc.with_ymd_and_hms(2024, 7, 13, 0, 0, 0).unwrap());
    p.get_series(&req(day(5), day(12))).await;
    assert_eq!(source.windows()[1], TimeWindow::new(day(10), day(12)));
}

#[tokio::test]
async fn extending_both_edges_refetches_the_whole_request() {
    let (p, source, _) = setup(Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap());

    p.get_series(&req(day(10), day(12))).await;
    p.get_series(&req(day(8), day(14))).await;

    assert_eq!(source.windows()[1], TimeWindow::new(day(8), day(14)));
    assert_eq!(p.fetched_window(), Some(TimeWindow::new(day(8), day(14))));
    // overlap collapsed, no duplicate timestamps
    assert_eq!(p.cached_samples(), 2 * 6 * TICKS_PER_DAY);
}

#[tokio::test]
async fn location_silent_during_a_delta_stays_aligned() {
    // s1 reports July 1-11, s2 only July 10-11
    let tick = |id: &str, from: u32| {
        let mut samples = Vec::new();
        let mut t = day(from);
        while t < day(12) {
            samples.push(Sample::new(t, 1, 1));
            t += default_cadence();
        }
        LocationSeries::new(id, id.to_uppercase(), samples)
    };
    let (p, source, _) = setup(Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap());
    source.replace(vec![tick("s1", 1), tick("s2", 10)]);

    p.get_series(&req(day(10), day(12))).await;
    let out = p.get_series(&req(day(1), day(12))).await;
    assert_eq!(source.windows()[1], TimeWindow::new(day(1), day(10)));

    let per_day = TICKS_PER_DAY as u64;
    let mut expected = vec![per_day; 9];
    expected.extend([2 * per_day, 2 * per_day]);
    assert_eq!(out.combined.count_in, expected);
    assert_eq!(out.combined.timestamps[0], day(1));

    // the silent location is zero-filled, not shifted
    let s2 = out
        .per_location
        .iter()
        .find(|l| l.location_id == "s2")
        .expect("s2 present");
    assert_eq!(s2.timestamps, out.combined.timestamps);
    assert_eq!(s2.count_in[0], 0);
    assert_eq!(s2.count_in[9], per_day);
}
