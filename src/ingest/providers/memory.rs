// src/ingest/providers/memory.rs
//! Fixed in-memory sample source. Serves slices of pre-loaded series and
//! remembers every requested window; used by tests and local demos.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::ingest::types::SampleSource;
use crate::model::{LocationSeries, TimeWindow};

pub struct MemorySource {
    data: Mutex<Vec<LocationSeries>>,
    calls: Mutex<Vec<(Vec<String>, TimeWindow)>>,
    failing: AtomicBool,
}

impl MemorySource {
    pub fn new(data: Vec<LocationSeries>) -> Self {
        Self {
            data: Mutex::new(data),
            calls: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Replace the backing data (e.g. to simulate new readings arriving).
    pub fn replace(&self, data: Vec<LocationSeries>) {
        *self.data.lock() = data;
    }

    /// When set, every fetch fails with a transport-style error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    pub fn calls(&self) -> Vec<(Vec<String>, TimeWindow)> {
        self.calls.lock().clone()
    }

    pub fn windows(&self) -> Vec<TimeWindow> {
        self.calls.lock().iter().map(|(_, w)| *w).collect()
    }
}

#[async_trait]
impl SampleSource for MemorySource {
    async fn fetch(
        &self,
        sensor_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LocationSeries>> {
        self.calls
            .lock()
            .push((sensor_ids.to_vec(), TimeWindow::new(start, end)));

        if self.failing.load(Ordering::Acquire) {
            anyhow::bail!("memory source unavailable");
        }

        let data = self.data.lock();
        Ok(data
            .iter()
            .filter(|l| sensor_ids.iter().any(|id| *id == l.id))
            .map(|l| LocationSeries {
                id: l.id.clone(),
                name: l.name.clone(),
                samples: l
                    .samples
                    .iter()
                    .filter(|s| s.timestamp >= start && s.timestamp < end)
                    .cloned()
                    .collect(),
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
