//! Schema API: `GET /schema` and cascading `DELETE /schema/publishers/...`
//! forms.

use hyper::{Response, StatusCode};

use langhook_core::error::Error;

use crate::state::AppState;

use super::{error_response, json_response, Body};

pub async fn summary(state: &AppState) -> Response<Body> {
    match state.store.schema.summary().await {
        Ok(summary) => json_response(StatusCode::OK, &summary),
        Err(err) => error_response(Error::StoreUnavailable(err.to_string())),
    }
}

pub async fn delete(
    state: &AppState,
    publisher: &str,
    resource_type: Option<&str>,
    action: Option<&str>,
) -> Response<Body> {
    match state.store.schema.delete(publisher, resource_type, action).await {
        Ok(rows_affected) => json_response(
            StatusCode::OK,
            &serde_json::json!({ "rows_affected": rows_affected }),
        ),
        Err(err) => error_response(Error::StoreUnavailable(err.to_string())),
    }
}
