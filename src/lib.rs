// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod model;

// Pure pipeline stages
pub mod bucket;
pub mod combine;
pub mod comparison;
pub mod fetch_plan;
pub mod gap_fill;
pub mod headline;
pub mod range_filter;
pub mod transform;

// Session state + orchestration
pub mod auth;
pub mod cache;
pub mod clock;
pub mod ingest;
pub mod pipeline;
pub mod refresh;

// Ambient
pub mod api;
pub mod config;
pub mod metrics;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::config::PipelineConfig;
pub use crate::pipeline::{HeadlineReport, Pipeline, SeriesRequest, SeriesResponse, SessionHandle};
