//! Health and metrics endpoints.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

use crate::state::{AppState, HealthStatus};

use super::{empty_response, json_response, Body};

pub async fn health(state: &AppState) -> Response<Body> {
    let (status_text, http_status) = match state.health.status() {
        HealthStatus::Up => ("up", StatusCode::OK),
        HealthStatus::Degraded => ("degraded", StatusCode::OK),
        HealthStatus::Down => ("down", StatusCode::SERVICE_UNAVAILABLE),
    };
    json_response(http_status, &serde_json::json!({ "status": status_text }))
}

pub async fn metrics(state: &AppState) -> Response<Body> {
    match state.metrics.encode() {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(hyper::header::CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(Full::new(Bytes::from(body)))
            .unwrap_or_else(|_| empty_response(StatusCode::INTERNAL_SERVER_ERROR)),
        Err(err) => {
            tracing::error!(error = %err, "failed to encode metrics");
            empty_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
