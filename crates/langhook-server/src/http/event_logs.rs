//! Event log API: paginated reads over `EventLog` and `SubscriptionEventLog`
//! rows.

use std::collections::HashMap;

use hyper::{Response, StatusCode};
use uuid::Uuid;

use langhook_core::error::Error;
use langhook_store::GateFilter;

use crate::state::AppState;

use super::{error_response, json_response, not_found, Body};

fn parse_page(query: &HashMap<String, String>) -> u32 {
    query.get("page").and_then(|v| v.parse().ok()).unwrap_or(0)
}

fn parse_size(query: &HashMap<String, String>) -> u32 {
    query.get("size").and_then(|v| v.parse().ok()).unwrap_or(50)
}

fn parse_resource_types(query: &HashMap<String, String>) -> Vec<String> {
    query
        .get("resource_types")
        .map(|raw| raw.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

fn parse_gate_filter(query: &HashMap<String, String>) -> GateFilter {
    match query.get("gate").map(String::as_str) {
        Some("allowed") => GateFilter::Allowed,
        Some("blocked") => GateFilter::Blocked,
        _ => GateFilter::All,
    }
}

pub async fn list_events(state: &AppState, query: &HashMap<String, String>) -> Response<Body> {
    let page = parse_page(query);
    let size = parse_size(query);
    let resource_types = parse_resource_types(query);

    match state.store.event_logs.list_events(page, size, &resource_types).await {
        Ok(events) => json_response(StatusCode::OK, &serde_json::json!({ "events": events, "page": page })),
        Err(err) => error_response(Error::StoreUnavailable(err.to_string())),
    }
}

pub async fn list_subscription_events(
    state: &AppState,
    id: &str,
    query: &HashMap<String, String>,
) -> Response<Body> {
    let Ok(subscription_id) = Uuid::parse_str(id) else {
        return not_found();
    };
    let page = parse_page(query);
    let size = parse_size(query);
    let gate = parse_gate_filter(query);

    match state
        .store
        .event_logs
        .list_subscription_events(subscription_id, page, size, gate)
        .await
    {
        Ok(events) => json_response(StatusCode::OK, &serde_json::json!({ "events": events, "page": page })),
        Err(err) => error_response(Error::StoreUnavailable(err.to_string())),
    }
}
