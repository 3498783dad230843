//! # Fetch planning
//! Pure decisions taken before any I/O: whether the cached window already
//! satisfies a request, and which minimal sub-range to fetch when it does not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{LocationSeries, TimeWindow};

/// Result of reconciling the requested window against the fetched one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRange {
    pub fetch_start: DateTime<Utc>,
    pub fetch_end: DateTime<Utc>,
    pub should_fetch: bool,
}

impl FetchRange {
    fn fetch(window: TimeWindow) -> Self {
        Self {
            fetch_start: window.start,
            fetch_end: window.end,
            should_fetch: true,
        }
    }

    fn skip(requested: TimeWindow) -> Self {
        Self {
            fetch_start: requested.start,
            fetch_end: requested.end,
            should_fetch: false,
        }
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.fetch_start, self.fetch_end)
    }
}

/// Decide whether the cache must be extended for `requested`.
///
/// Rules, in order:
/// 1. nothing fetched yet → fetch
/// 2. request reaches before the fetched start, or after the fetched end
///    while the requested end is not in the future → fetch
/// 3. identical windows → no fetch
/// 4. request inside the fetched window, or only its future tail is
///    uncovered and data is already visible → no fetch
/// 5. anything else → fetch
pub fn needs_fetch(
    requested: &TimeWindow,
    fetched: Option<&TimeWindow>,
    visible: &[LocationSeries],
    now: DateTime<Utc>,
) -> bool {
    let Some(fetched) = fetched else {
        return true;
    };

    let extends_left = requested.start < fetched.start;
    let extends_right = requested.end > fetched.end;
    if extends_left || (extends_right && requested.end <= now) {
        return true;
    }

    if requested == fetched {
        return false;
    }

    if fetched.covers(requested) {
        return false;
    }

    let has_visible = visible.iter().any(|l| !l.samples.is_empty());
    if has_visible && requested.start >= fetched.start {
        // remaining gap is the future tail past `fetched.end`
        return false;
    }

    true
}

/// Minimal sub-range to fetch for `requested` given what is cached.
pub fn reconcile(requested: &TimeWindow, fetched: Option<&TimeWindow>) -> FetchRange {
    let Some(fetched) = fetched else {
        return FetchRange::fetch(*requested);
    };

    let extends_left = requested.start < fetched.start;
    let extends_right = requested.end > fetched.end;

    match (extends_left, extends_right) {
        (false, false) => FetchRange::skip(*requested),
        (true, false) => FetchRange::fetch(TimeWindow::new(requested.start, fetched.start)),
        (false, true) => FetchRange::fetch(TimeWindow::new(fetched.end, requested.end)),
        // no partial merge; the whole request is fetched again
        (true, true) => FetchRange::fetch(*requested),
    }
}
