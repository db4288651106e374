//! HTTP handlers.
//!
//! Failures from external sources become `500 {"error": "..."}`; input
//! problems never fail a request.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::{debug, error, warn};

use burnrate_core::PodCount;

use crate::ApiState;

fn error_response(msg: &str, status: StatusCode) -> Response {
    (status, Json(serde_json::json!({ "error": msg }))).into_response()
}

fn ok_text() -> Response {
    ([(header::CONTENT_TYPE, "text/plain")], "ok").into_response()
}

/// First `ms` value in the query, if any. Pairs are taken raw so repeated
/// or garbled parameters fall back to the default instead of a 400.
fn first_ms(params: &[(String, String)]) -> Option<&str> {
    params
        .iter()
        .find(|(key, _)| key == "ms")
        .map(|(_, value)| value.as_str())
}

/// GET /compute
pub async fn compute(
    State(state): State<ApiState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let requested = first_ms(&params);
    let ms = burnrate_load::effective_ms(requested, &state.compute);
    debug!(?requested, effective_ms = ms, "compute request");

    match tokio::task::spawn_blocking(move || burnrate_load::burn(ms)).await {
        Ok(_) => ok_text(),
        Err(e) => {
            error!(error = %e, "burn task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "burn task failed").into_response()
        }
    }
}

/// GET /healthz
pub async fn healthz() -> Response {
    ok_text()
}

/// GET /metrics
pub async fn metrics(State(state): State<ApiState>) -> Response {
    match state.source.report().await {
        Ok(report) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            report.to_json_bytes(),
        )
            .into_response(),
        Err(e) => {
            warn!(source = %state.source.kind(), error = %e, "utilization report failed");
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /pods
pub async fn pods(State(state): State<ApiState>) -> Response {
    match state.source.pod_count().await {
        Ok(count) => Json(PodCount { count }).into_response(),
        Err(e) if e.is_unsupported() => error_response(&e.to_string(), StatusCode::NOT_FOUND),
        Err(e) => {
            warn!(source = %state.source.kind(), error = %e, "pod count failed");
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
