//! Side channel recording when each sensor selection was last refreshed
//! from the source. Passed in by the caller; the pipeline only writes to it
//! after a successful merge.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

pub trait RefreshStore: Send + Sync {
    fn record(&self, session: &str, at: DateTime<Utc>);
    fn last(&self, session: &str) -> Option<DateTime<Utc>>;
}

/// In-memory store, bounded to `cap` sessions (oldest refresh evicted).
#[derive(Debug)]
pub struct MemoryRefreshStore {
    inner: Mutex<HashMap<String, DateTime<Utc>>>,
    cap: usize,
}

impl MemoryRefreshStore {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, 10_000);
        Self {
            inner: Mutex::new(HashMap::with_capacity(cap)),
            cap,
        }
    }
}

impl Default for MemoryRefreshStore {
    fn default() -> Self {
        Self::with_capacity(256)
    }
}

impl RefreshStore for MemoryRefreshStore {
    fn record(&self, session: &str, at: DateTime<Utc>) {
        let mut map = self.inner.lock();
        map.insert(session.to_string(), at);
        if map.len() > self.cap {
            if let Some(oldest) = map
                .iter()
                .min_by_key(|(_, ts)| **ts)
                .map(|(k, _)| k.clone())
            {
                map.remove(&oldest);
            }
        }
    }

    fn last(&self, session: &str) -> Option<DateTime<Utc>> {
        self.inner.lock().get(session).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn keeps_latest_and_evicts_oldest() {
        let store = MemoryRefreshStore::with_capacity(2);
        let t = |m| Utc.with_ymd_and_hms(2024, 8, 1, 0, m, 0).unwrap();
        store.record("a", t(1));
        store.record("b", t(2));
        store.record("a", t(3));
        assert_eq!(store.last("a"), Some(t(3)));

        store.record("c", t(4));
        assert_eq!(store.last("b"), None);
        assert_eq!(store.last("c"), Some(t(4)));
    }
}
