//! The HTTP API layer: four routes over an `axum::Router`, decoding
//! parameters and mapping `CoreError` to status codes. Not part of the
//! core's tested invariants — glue only.

mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use idlescope_core::Registry;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub registry: Registry,
    pub open_retry_window: Duration,
    pub open_retry_sleep: Duration,
}

#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/trace-events/listen", post(handlers::listen_trace_events))
        .route(
            "/trace-events/:id/top-idling-goroutines",
            get(handlers::top_idling_goroutines),
        )
        .route("/heap-profiles/listen", post(handlers::listen_heap_profiles))
        .route("/heap-profiles/:id/summaries", get(handlers::heap_summaries))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
