use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use idlescope_core::CoreError;
use serde::Serialize;

use super::AppState;
use crate::fetcher::ReqwestHeapFetcher;
use crate::reader::TraceFileOrHttpSource;

/// Wraps a `CoreError` so it can be returned directly from a handler.
/// Maps `BadArgument` to 400, `Conflict` to 409, everything else to 500.
struct AppError(CoreError);

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::BadArgument(_) => StatusCode::BAD_REQUEST,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::UpstreamUnavailable(_) | CoreError::StreamBroken(_) | CoreError::ParseFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.0.to_string()).into_response()
    }
}

#[derive(Serialize)]
struct ListenResponse {
    id: u64,
}

fn require_source_path(params: &HashMap<String, String>) -> Result<&str, AppError> {
    match params.get("source_path") {
        Some(path) if !path.is_empty() => Ok(path.as_str()),
        _ => Err(AppError(CoreError::BadArgument("source_path is required".to_string()))),
    }
}

fn parse_handle(id: &str) -> Result<u64, AppError> {
    id.parse::<u64>()
        .map_err(|_| AppError(CoreError::BadArgument(format!("invalid handle: {id}"))))
}

pub async fn listen_trace_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ListenResponse>, AppError> {
    let source_path = require_source_path(&params)?;

    let source = TraceFileOrHttpSource::open(
        source_path,
        state.open_retry_window,
        state.open_retry_sleep,
    )
    .await?;

    let id = state.registry.start_trace(source_path, source).await?;
    Ok(Json(ListenResponse { id }))
}

pub async fn top_idling_goroutines(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let handle = parse_handle(&id)?;
    let processor = state.registry.trace(handle)?;
    Ok(Json(processor.top_idling().await).into_response())
}

pub async fn listen_heap_profiles(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ListenResponse>, AppError> {
    let source_path = require_source_path(&params)?;

    let fetcher = Arc::new(ReqwestHeapFetcher::new());
    let id = state.registry.start_heap(source_path, Vec::new(), fetcher).await?;
    Ok(Json(ListenResponse { id }))
}

pub async fn heap_summaries(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let handle = parse_handle(&id)?;
    let collector = state.registry.heap(handle)?;
    let summaries = collector.summaries().await?;
    Ok(Json(summaries).into_response())
}
