use std::sync::Arc;

use chrono::{DateTime, Utc};
use shuttle_axum::axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::comparison::{comparison_periods, metric_comparison};
use crate::model::TimeWindow;
use crate::pipeline::{Pipeline, SeriesRequest, DEFAULT_SESSION};

/// Header naming the caller's dashboard session.
pub const SESSION_HEADER: &str = "x-session-id";
const MAX_SESSION_ID_LEN: usize = 128;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/series", post(series))
        .route("/headline", post(headline))
        .route("/comparison", get(comparison))
        .route("/metric-comparison", get(metric_comparison_handler))
        .route("/session/reset", post(reset_session))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Alias kept for `footfall_dashboard::router(state)`.
pub fn router(state: AppState) -> Router {
    create_router(state)
}

fn bad_request(msg: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, msg.into()).into_response()
}

/// Session id from the request headers; absent or blank → the default session.
fn session_id(headers: &HeaderMap) -> Result<String, Response> {
    let Some(raw) = headers.get(SESSION_HEADER) else {
        return Ok(DEFAULT_SESSION.to_string());
    };
    let id = raw
        .to_str()
        .map_err(|_| bad_request("session id must be visible ASCII"))?
        .trim();
    if id.len() > MAX_SESSION_ID_LEN {
        return Err(bad_request("session id too long"));
    }
    Ok(if id.is_empty() { DEFAULT_SESSION } else { id }.to_string())
}

fn check_request(state: &AppState, req: &SeriesRequest) -> Result<(), Response> {
    if req.end < req.start {
        return Err(bad_request("end must not be before start"));
    }
    state
        .pipeline
        .validate_window(&req.window())
        .map_err(|e| bad_request(e.to_string()))
}

async fn series(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SeriesRequest>,
) -> Response {
    let id = match session_id(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if let Err(resp) = check_request(&state, &req) {
        return resp;
    }
    let session = state.pipeline.session(&id);
    Json(session.get_series(&req).await).into_response()
}

async fn headline(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SeriesRequest>,
) -> Response {
    let id = match session_id(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if let Err(resp) = check_request(&state, &req) {
        return resp;
    }
    let session = state.pipeline.session(&id);
    Json(session.headline_comparison(&req).await).into_response()
}

#[derive(serde::Deserialize)]
struct WindowQuery {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

async fn comparison(q: Result<Query<WindowQuery>, QueryRejection>) -> Response {
    let Ok(Query(q)) = q else {
        return bad_request("expected ?start=<rfc3339>&end=<rfc3339>");
    };
    if q.end < q.start {
        return bad_request("end must not be before start");
    }
    Json(comparison_periods(TimeWindow::new(q.start, q.end))).into_response()
}

#[derive(serde::Deserialize)]
struct MetricQuery {
    current: f64,
    previous: f64,
}

async fn metric_comparison_handler(q: Result<Query<MetricQuery>, QueryRejection>) -> Response {
    let Ok(Query(q)) = q else {
        return bad_request("expected ?current=<number>&previous=<number>");
    };
    if !q.current.is_finite() || !q.previous.is_finite() {
        return bad_request("values must be finite");
    }
    Json(metric_comparison(q.current, q.previous)).into_response()
}

async fn reset_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match session_id(&headers) {
        Ok(id) => {
            state.pipeline.session(&id).reset();
            StatusCode::NO_CONTENT.into_response()
        }
        Err(resp) => resp,
    }
}
