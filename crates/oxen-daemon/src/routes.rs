//! Axum router and all HTTP handlers for oxen-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use oxen_core::NewJob;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::{
    api_types::{
        DispatcherStatusDto, EnqueueRequest, EnqueueResponse, ErrorResponse, HealthResponse,
        RunJobTypeRequest, RunStartedResponse, RunStoppedResponse, StatusResponse,
    },
    state::{uptime_secs, AppState},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/enqueue", post(enqueue))
        .route("/v1/run/start", post(run_start))
        .route("/v1/run/stop", post(run_stop))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let controller = st.controller.lock().await;
    let active_job_types = controller.active_job_types();
    let dispatchers = controller
        .debug()
        .into_iter()
        .map(|(k, v)| (k, DispatcherStatusDto::from(v)))
        .collect();

    (
        StatusCode::OK,
        Json(StatusResponse {
            daemon_uptime_secs: uptime_secs(),
            active_job_types,
            dispatchers,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/stream (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(
    State(st): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = st.bus.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(bus_msg) => serde_json::to_string(&bus_msg)
                .ok()
                .map(|json| Ok(Event::default().data(json))),
            Err(_lagged) => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ---------------------------------------------------------------------------
// POST /v1/enqueue
// ---------------------------------------------------------------------------

pub(crate) async fn enqueue(
    State(st): State<Arc<AppState>>,
    Json(req): Json<EnqueueRequest>,
) -> Response {
    let mut job = NewJob::new(req.job_type, req.body);
    job.priority = req.priority;
    job.start_time = req.start_time;
    job.unique_key = req.unique_key;

    let controller = st.controller.lock().await;
    match controller.enqueue(&job).await {
        Ok(outcome) => (StatusCode::OK, Json(EnqueueResponse::from(outcome))).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("{e:#}"),
            }),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/run/start
// ---------------------------------------------------------------------------

pub(crate) async fn run_start(
    State(st): State<Arc<AppState>>,
    Json(req): Json<RunJobTypeRequest>,
) -> Response {
    let Some(cfg) = st.processors.read().await.get(&req.job_type).cloned() else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("no processor configured for job_type '{}'", req.job_type),
            }),
        )
            .into_response();
    };

    let spec = st.processor_spec(&cfg);
    let mut controller = st.controller.lock().await;
    match controller.start_processing(spec).await {
        Ok(()) => {
            info!(job_type = %req.job_type, "run started via HTTP");
            (
                StatusCode::OK,
                Json(RunStartedResponse {
                    job_type: req.job_type,
                    started: true,
                }),
            )
                .into_response()
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("{e:#}"),
            }),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/run/stop
// ---------------------------------------------------------------------------

pub(crate) async fn run_stop(
    State(st): State<Arc<AppState>>,
    Json(req): Json<RunJobTypeRequest>,
) -> Response {
    let mut controller = st.controller.lock().await;
    match controller.stop_processing(&req.job_type).await {
        Ok(()) => {
            info!(job_type = %req.job_type, "run stopped via HTTP");
            (
                StatusCode::OK,
                Json(RunStoppedResponse {
                    job_type: req.job_type,
                    stopped: true,
                }),
            )
                .into_response()
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("{e:#}"),
            }),
        )
            .into_response(),
    }
}
