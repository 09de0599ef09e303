//! Subscription API: create/list/get/update/delete, plus the
//! pattern-synthesis and matcher bind/rebind/unbind lifecycle that goes
//! with a pattern change.

use chrono::Utc;
use hyper::{Response, StatusCode};
use serde::Deserialize;
use uuid::Uuid;

use langhook_core::domain::{ChannelConfig, Gate, Subscription, SubscriptionStatus};
use langhook_core::error::Error;

use crate::state::AppState;
use crate::workers::spawn_matcher;

use super::{error_response, json_response, not_found, Body};

#[derive(Deserialize)]
struct CreateSubscriptionRequest {
    subscriber_id: String,
    description: String,
    channel: Option<ChannelConfig>,
    gate: Option<Gate>,
    #[serde(default)]
    disposable: bool,
}

#[derive(Deserialize)]
struct UpdateSubscriptionRequest {
    /// A new description resynthesizes `pattern` and forces a consumer
    /// rebind; omitted, the existing pattern is left alone.
    description: Option<String>,
    channel: Option<ChannelConfig>,
    gate: Option<Gate>,
    disposable: Option<bool>,
    active: Option<bool>,
}

async fn known_triples(state: &AppState) -> Result<Vec<(String, String, String)>, Error> {
    let triples = state
        .store
        .schema
        .known_triples()
        .await
        .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
    Ok(triples
        .into_iter()
        .map(|t| (t.publisher, t.resource_type, t.action))
        .collect())
}

pub async fn create(state: &AppState, body: Vec<u8>) -> Response<Body> {
    let request: CreateSubscriptionRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => return error_response(Error::InvalidJson(err.to_string())),
    };

    let triples = match known_triples(state).await {
        Ok(triples) => triples,
        Err(err) => return error_response(err),
    };
    let pattern = match state.llm.synthesize_subject_filter(&request.description, &triples).await {
        Ok(pattern) => pattern,
        Err(err) => return error_response(err),
    };

    let subscription = Subscription {
        id: Uuid::new_v4(),
        subscriber_id: request.subscriber_id,
        description: request.description,
        pattern,
        channel: request.channel.unwrap_or(ChannelConfig::None),
        gate: request.gate.unwrap_or(Gate::Disabled),
        disposable: request.disposable,
        active: true,
        used: false,
        status: SubscriptionStatus::Active,
        created_at: Utc::now(),
    };

    if let Err(err) = state.store.subscriptions.create(&subscription).await {
        return error_response(Error::StoreUnavailable(err.to_string()));
    }

    let handle = spawn_matcher(state, subscription.id);
    state.subscriptions.insert(subscription.id, handle);
    state.metrics.active_subscriptions.inc();

    json_response(StatusCode::CREATED, &subscription)
}

pub async fn list(state: &AppState) -> Response<Body> {
    match state.store.subscriptions.list().await {
        Ok(subscriptions) => json_response(StatusCode::OK, &serde_json::json!({ "subscriptions": subscriptions })),
        Err(err) => error_response(Error::StoreUnavailable(err.to_string())),
    }
}

pub async fn get(state: &AppState, id: &str) -> Response<Body> {
    let Ok(id) = Uuid::parse_str(id) else {
        return not_found();
    };
    match state.store.subscriptions.get(id).await {
        Ok(Some(subscription)) => json_response(StatusCode::OK, &subscription),
        Ok(None) => not_found(),
        Err(err) => error_response(Error::StoreUnavailable(err.to_string())),
    }
}

pub async fn update(state: &AppState, id: &str, body: Vec<u8>) -> Response<Body> {
    let Ok(id) = Uuid::parse_str(id) else {
        return not_found();
    };
    let request: UpdateSubscriptionRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => return error_response(Error::InvalidJson(err.to_string())),
    };

    let new_pattern = if let Some(description) = &request.description {
        let triples = match known_triples(state).await {
            Ok(triples) => triples,
            Err(err) => return error_response(err),
        };
        match state.llm.synthesize_subject_filter(description, &triples).await {
            Ok(pattern) => Some(pattern),
            Err(err) => return error_response(err),
        }
    } else {
        None
    };

    let result = state
        .store
        .subscriptions
        .update(
            id,
            new_pattern.as_deref(),
            request.channel.as_ref(),
            request.gate.as_ref(),
            request.disposable,
            request.active,
        )
        .await;

    let updated = match result {
        Ok(Some(updated)) => updated,
        Ok(None) => return not_found(),
        Err(err) => return error_response(Error::StoreUnavailable(err.to_string())),
    };

    if new_pattern.is_some() {
        rebind(state, id);
    }

    json_response(StatusCode::OK, &updated)
}

pub async fn delete(state: &AppState, id: &str) -> Response<Body> {
    let Ok(id) = Uuid::parse_str(id) else {
        return not_found();
    };
    unbind(state, id);
    match state.store.subscriptions.delete(id).await {
        Ok(true) => super::empty_response(StatusCode::NO_CONTENT),
        Ok(false) => not_found(),
        Err(err) => error_response(Error::StoreUnavailable(err.to_string())),
    }
}

/// Stop and discard a subscription's matcher task, if one is running.
fn unbind(state: &AppState, id: Uuid) {
    if let Some((_, handle)) = state.subscriptions.remove(&id) {
        handle.cancel.notify_one();
        state.metrics.active_subscriptions.dec();
    }
}

/// Replace a subscription's matcher task wholesale after a pattern edit —
/// the old consumer's `filter_subject` is stale, so it's cheaper to rebind
/// than to mutate the live consumer.
fn rebind(state: &AppState, id: Uuid) {
    if let Some((_, handle)) = state.subscriptions.remove(&id) {
        handle.cancel.notify_one();
    } else {
        state.metrics.active_subscriptions.inc();
    }
    let handle = spawn_matcher(state, id);
    state.subscriptions.insert(id, handle);
}
