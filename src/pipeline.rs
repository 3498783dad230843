//! # Pipeline
//! Orchestrates one dashboard request end to end:
//!
//! selection check → fetch decision → minimal range → fetch + gap-fill →
//! merge → clip → bucket → transform → combine.
//!
//! Every logical session (one dashboard tab, keyed by a caller-supplied id)
//! owns its own cache, memo and in-flight guard. A session's cache is only
//! touched under a short lock that is never held across the fetch, and at
//! most one fetch per session runs at a time: a request arriving meanwhile
//! is served from resident data with `loading = true`. Derived results are
//! memoized per cache revision so repeating an unchanged request does no
//! work.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::auth::SessionAuth;
use crate::bucket::{bucket_locations, AggregationMode, Granularity};
use crate::cache::{CacheState, InFlight, LocationCache};
use crate::clock::Clock;
use crate::combine::{combine_locations, AggregatedSeries};
use crate::comparison::comparison_periods;
use crate::config::PipelineConfig;
use crate::fetch_plan::{needs_fetch, reconcile};
use crate::headline::{compare_headlines, summarize, HeadlineComparison};
use crate::ingest::providers::{http::HttpSampleSource, synthetic::SyntheticSource};
use crate::ingest::{ensure_metrics_described, fetch_range, types::SampleSource};
use crate::model::{LocationSeries, TimeWindow};
use crate::refresh::{MemoryRefreshStore, RefreshStore};
use crate::transform::{transform_locations, TransformedSeries};

/// Session used by callers that do not name one.
pub const DEFAULT_SESSION: &str = "default";
pub const DEFAULT_SESSION_CAPACITY: usize = 256;
pub const DEFAULT_MAX_WINDOW_DAYS: i64 = 400;

fn default_granularity() -> Granularity {
    Granularity::Hour
}

/// What the dashboard is currently looking at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesRequest {
    pub sensor_ids: Vec<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default = "default_granularity")]
    pub granularity: Granularity,
    #[serde(default)]
    pub mode: AggregationMode,
}

impl SeriesRequest {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SeriesResponse {
    pub per_location: Vec<TransformedSeries>,
    pub combined: AggregatedSeries,
    /// A fetch for this session was already running; data may be partial.
    pub loading: bool,
    pub error: Option<String>,
    pub fetched_window: Option<TimeWindow>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadlineReport {
    pub comparison: HeadlineComparison,
    pub loading: bool,
    pub error: Option<String>,
}

/// Identity of a sensor selection. Order and duplicates in the request do
/// not matter; switching between real and demo data is a new selection.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SelectionKey {
    sensors: Vec<String>,
    authenticated: bool,
}

impl SelectionKey {
    fn new(ids: &[String], authenticated: bool) -> Self {
        let mut sensors: Vec<String> = ids
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        sensors.sort();
        sensors.dedup();
        Self {
            sensors,
            authenticated,
        }
    }

    /// Short anonymized id of (session, selection) for logs and the
    /// refresh store.
    fn fingerprint(&self, session: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(session.as_bytes());
        hasher.update([0u8]);
        for s in &self.sensors {
            hasher.update(s.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update([u8::from(self.authenticated)]);
        let digest = hasher.finalize();
        let mut out = String::with_capacity(12);
        for b in digest.iter().take(6) {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        out
    }
}

#[derive(Debug)]
struct Memo {
    request: SeriesRequest,
    revision: u64,
    response: SeriesResponse,
}

#[derive(Debug)]
struct Session {
    key: Option<SelectionKey>,
    fingerprint: String,
    cache: LocationCache,
    memo: Option<Memo>,
}

impl Session {
    fn new(cadence: Duration) -> Self {
        Self {
            key: None,
            fingerprint: String::new(),
            cache: LocationCache::with_cadence(cadence),
            memo: None,
        }
    }

    /// Reset the cache when the selection differs from the cached one.
    fn ensure_selection(&mut self, session: &str, key: &SelectionKey) {
        if self.key.as_ref() == Some(key) {
            return;
        }
        let fingerprint = key.fingerprint(session);
        if self.key.is_some() {
            counter!("pipeline_cache_resets_total").increment(1);
            tracing::info!(
                target: "pipeline",
                from = %self.fingerprint,
                to = %fingerprint,
                "sensor selection changed; cache invalidated"
            );
        }
        self.cache.reset();
        self.memo = None;
        self.fingerprint = fingerprint;
        self.key = Some(key.clone());
    }

    fn clear(&mut self) {
        self.cache.reset();
        self.key = None;
        self.memo = None;
        self.fingerprint.clear();
    }
}

/// State of one logical session.
#[derive(Debug)]
struct SessionSlot {
    state: Mutex<Session>,
    in_flight: InFlight,
    last_used: AtomicU64,
}

impl SessionSlot {
    fn new(cadence: Duration, tick: u64) -> Self {
        Self {
            state: Mutex::new(Session::new(cadence)),
            in_flight: InFlight::default(),
            last_used: AtomicU64::new(tick),
        }
    }
}

pub struct Pipeline {
    source: Option<Arc<dyn SampleSource>>,
    synthetic: Arc<dyn SampleSource>,
    clock: Arc<dyn Clock>,
    auth: Arc<dyn SessionAuth>,
    refresh: Option<Arc<dyn RefreshStore>>,
    cadence: Duration,
    max_window: Duration,
    session_capacity: usize,
    sessions: Mutex<HashMap<String, Arc<SessionSlot>>>,
    tick: AtomicU64,
}

impl Pipeline {
    /// Pipeline serving only `synthetic` until a real source is attached.
    pub fn new(
        synthetic: Arc<dyn SampleSource>,
        clock: Arc<dyn Clock>,
        auth: Arc<dyn SessionAuth>,
    ) -> Self {
        ensure_metrics_described();
        Self {
            source: None,
            synthetic,
            clock,
            auth,
            refresh: None,
            cadence: crate::model::default_cadence(),
            max_window: Duration::days(DEFAULT_MAX_WINDOW_DAYS),
            session_capacity: DEFAULT_SESSION_CAPACITY,
            sessions: Mutex::new(HashMap::new()),
            tick: AtomicU64::new(0),
        }
    }

    /// Wire providers and stores from configuration.
    pub fn from_config(
        cfg: &PipelineConfig,
        clock: Arc<dyn Clock>,
        auth: Arc<dyn SessionAuth>,
    ) -> anyhow::Result<Self> {
        let synthetic = Arc::new(SyntheticSource::new(cfg.synthetic_seed, cfg.cadence()));
        let mut p = Self::new(synthetic, clock, auth)
            .with_cadence(cfg.cadence())
            .with_max_window(cfg.max_window())
            .with_session_capacity(cfg.session_capacity)
            .with_refresh_store(Arc::new(MemoryRefreshStore::with_capacity(
                cfg.refresh_capacity,
            )));
        if let Some(url) = &cfg.source_url {
            let http = HttpSampleSource::new(url.clone(), cfg.source_token.clone(), cfg.fetch_timeout())?;
            p = p.with_source(Arc::new(http));
        }
        Ok(p)
    }

    pub fn with_source(mut self, source: Arc<dyn SampleSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_refresh_store(mut self, store: Arc<dyn RefreshStore>) -> Self {
        self.refresh = Some(store);
        self
    }

    pub fn with_cadence(mut self, cadence: Duration) -> Self {
        if cadence > Duration::zero() {
            self.cadence = cadence;
        }
        self
    }

    pub fn with_max_window(mut self, max: Duration) -> Self {
        if max > Duration::zero() {
            self.max_window = max;
        }
        self
    }

    pub fn with_session_capacity(mut self, cap: usize) -> Self {
        self.session_capacity = cap.max(1);
        self
    }

    /// Reject windows longer than the configured maximum.
    pub fn validate_window(&self, window: &TimeWindow) -> anyhow::Result<()> {
        if window.duration() > self.max_window {
            anyhow::bail!(
                "window of {} days exceeds the maximum of {} days",
                window.duration().num_days(),
                self.max_window.num_days()
            );
        }
        Ok(())
    }

    /// Handle on the session named `id`, created on first use. When the
    /// session table is full the least recently used idle session is
    /// dropped.
    pub fn session(&self, id: &str) -> SessionHandle<'_> {
        SessionHandle {
            pipeline: self,
            id: id.to_string(),
            slot: self.slot(id),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    fn slot(&self, id: &str) -> Arc<SessionSlot> {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);
        let mut map = self.sessions.lock();
        if let Some(slot) = map.get(id) {
            slot.last_used.store(tick, Ordering::Relaxed);
            return slot.clone();
        }

        if map.len() >= self.session_capacity {
            let oldest = map
                .iter()
                .filter(|(_, s)| !s.in_flight.is_busy())
                .min_by_key(|(_, s)| s.last_used.load(Ordering::Relaxed))
                .map(|(k, _)| k.clone());
            if let Some(k) = oldest {
                map.remove(&k);
                tracing::debug!(target: "pipeline", "session table full; evicted least recently used");
            }
        }

        let slot = Arc::new(SessionSlot::new(self.cadence, tick));
        map.insert(id.to_string(), slot.clone());
        slot
    }

    fn pick_source(&self, authenticated: bool) -> Arc<dyn SampleSource> {
        match (&self.source, authenticated) {
            (Some(real), true) => real.clone(),
            (None, true) => {
                tracing::debug!(target: "pipeline", "no sample source configured; serving synthetic data");
                self.synthetic.clone()
            }
            (_, false) => self.synthetic.clone(),
        }
    }

    // ---- default-session shortcuts ----

    pub async fn get_series(&self, req: &SeriesRequest) -> SeriesResponse {
        self.session(DEFAULT_SESSION).get_series(req).await
    }

    pub async fn headline_comparison(&self, req: &SeriesRequest) -> HeadlineReport {
        self.session(DEFAULT_SESSION).headline_comparison(req).await
    }

    pub fn reset(&self) {
        self.session(DEFAULT_SESSION).reset();
    }

    pub fn fetched_window(&self) -> Option<TimeWindow> {
        self.session(DEFAULT_SESSION).fetched_window()
    }

    pub fn cache_state(&self) -> CacheState {
        self.session(DEFAULT_SESSION).cache_state()
    }

    pub fn cached_samples(&self) -> usize {
        self.session(DEFAULT_SESSION).cached_samples()
    }
}

/// One session of a [`Pipeline`].
pub struct SessionHandle<'a> {
    pipeline: &'a Pipeline,
    id: String,
    slot: Arc<SessionSlot>,
}

impl SessionHandle<'_> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn fetched_window(&self) -> Option<TimeWindow> {
        self.slot.state.lock().cache.fetched_window().copied()
    }

    pub fn cache_state(&self) -> CacheState {
        self.slot.state.lock().cache.state()
    }

    /// Total cached samples across locations.
    pub fn cached_samples(&self) -> usize {
        self.slot.state.lock().cache.sample_count()
    }

    /// Forget the current selection and everything cached for it.
    pub fn reset(&self) {
        self.slot.state.lock().clear();
        tracing::info!(target: "pipeline", "session reset");
    }

    /// Serve `req`, fetching only what the cache is missing.
    pub async fn get_series(&self, req: &SeriesRequest) -> SeriesResponse {
        if let Err(e) = self.pipeline.validate_window(&req.window()) {
            return SeriesResponse {
                error: Some(e.to_string()),
                ..Default::default()
            };
        }
        self.serve(req).await
    }

    async fn serve(&self, req: &SeriesRequest) -> SeriesResponse {
        let p = self.pipeline;
        let requested = req.window();
        let authenticated = p.auth.is_authenticated();
        let key = SelectionKey::new(&req.sensor_ids, authenticated);
        let now = p.clock.now();

        // 1) Decide under the lock; release it before any I/O.
        let plan = {
            let mut s = self.slot.state.lock();
            s.ensure_selection(&self.id, &key);

            if key.sensors.is_empty() || requested.is_empty() {
                None
            } else {
                let visible = s.cache.visible(&requested);
                let fetched = s.cache.fetched_window();
                let must = needs_fetch(&requested, fetched, &visible, now);
                let range = reconcile(&requested, fetched);
                (must && range.should_fetch).then(|| (range.window(), s.cache.generation()))
            }
        };

        // 2) Fetch + merge.
        let mut loading = false;
        let mut error = None;
        if let Some((window, generation)) = plan {
            match self.slot.in_flight.try_acquire() {
                None => {
                    loading = true;
                    counter!("pipeline_fetch_coalesced_total").increment(1);
                    tracing::debug!(target: "pipeline", "fetch already in flight; request coalesced");
                }
                Some(_guard) => {
                    let source = p.pick_source(authenticated);
                    match fetch_range(source.as_ref(), &key.sensors, window, p.cadence).await {
                        Ok(fetched) => self.merge_fetched(generation, window, fetched),
                        Err(e) => {
                            tracing::warn!(
                                target: "pipeline",
                                error = %format!("{e:#}"),
                                start = %window.start,
                                end = %window.end,
                                "fetch failed; serving resident data"
                            );
                            error = Some(format!("{e:#}"));
                        }
                    }
                }
            }
        }

        // 3) Derive from whatever is resident.
        let mut s = self.slot.state.lock();
        let revision = s.cache.revision();
        let cacheable = !loading && error.is_none();
        if cacheable {
            if let Some(memo) = &s.memo {
                if memo.revision == revision && memo.request == *req {
                    return memo.response.clone();
                }
            }
        }

        let visible = s.cache.visible(&requested);
        let bucketed = bucket_locations(&visible, req.granularity, req.mode);
        let per_location = transform_locations(&bucketed, req.granularity);
        let combined = combine_locations(&per_location);

        let response = SeriesResponse {
            per_location,
            combined,
            loading,
            error,
            fetched_window: s.cache.fetched_window().copied(),
            last_updated: p.refresh.as_ref().and_then(|r| r.last(&s.fingerprint)),
        };

        if cacheable {
            s.memo = Some(Memo {
                request: req.clone(),
                revision,
                response: response.clone(),
            });
        }
        response
    }

    fn merge_fetched(&self, generation: u64, window: TimeWindow, fetched: Vec<LocationSeries>) {
        let mut s = self.slot.state.lock();
        if s.cache.generation() != generation {
            // selection changed while the fetch was running
            tracing::debug!(target: "pipeline", "discarding fetch for a previous selection");
            return;
        }

        let merged = s.cache.merge(window, fetched);
        counter!("pipeline_samples_merged_total").increment(merged as u64);
        if let Some(w) = s.cache.fetched_window() {
            gauge!("pipeline_fetched_window_hours").set(w.duration().num_minutes() as f64 / 60.0);
        }
        if let Some(store) = &self.pipeline.refresh {
            store.record(&s.fingerprint, self.pipeline.clock.now());
        }

        tracing::info!(
            target: "pipeline",
            session = %s.fingerprint,
            start = %window.start,
            end = %window.end,
            merged,
            "range merged"
        );
    }

    /// Headline numbers for `req` against the equal-length previous period.
    ///
    /// The current window is served first so the previous period reaches the
    /// cache as a left extension. Only the current window is checked against
    /// the length limit; day alignment may make the previous one slightly
    /// longer.
    pub async fn headline_comparison(&self, req: &SeriesRequest) -> HeadlineReport {
        let periods = comparison_periods(req.window());
        let current = self.get_series(req).await;
        if current.error.is_some() && current.fetched_window.is_none() {
            // rejected or nothing resident: the previous period cannot do better
            let empty = summarize(&AggregatedSeries::default());
            return HeadlineReport {
                comparison: compare_headlines(periods, empty.clone(), empty),
                loading: current.loading,
                error: current.error,
            };
        }

        let prev_req = SeriesRequest {
            start: periods.previous.start,
            end: periods.previous.end,
            ..req.clone()
        };
        let previous = self.serve(&prev_req).await;

        HeadlineReport {
            comparison: compare_headlines(
                periods,
                summarize(&current.combined),
                summarize(&previous.combined),
            ),
            loading: current.loading || previous.loading,
            error: current.error.or(previous.error),
        }
    }
}
