//! Ingest pipeline: `POST /ingest/{source}`.
//!
//! Order of checks matters: rate limit before parsing (an attacker shouldn't
//! be able to burn CPU on malformed JSON past the limiter), signature after
//! parsing (so a DLQ'd malformed body never needs a signature check at all).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use hyper::{Response, StatusCode};

use langhook_core::domain::RawEvent;
use langhook_core::error::Error;
use langhook_core::signature::SignatureVerifier;
use langhook_core::subject;

use crate::state::AppState;

use super::{error_response, json_response, Body};

pub async fn handle(
    state: &AppState,
    remote_addr: SocketAddr,
    source: &str,
    headers: HashMap<String, String>,
    body: Vec<u8>,
) -> Response<Body> {
    state
        .metrics
        .ingest_requests_total
        .with_label_values(&[source])
        .inc();

    let rate_key = remote_addr.ip().to_string();
    let decision = state
        .rate_limiter
        .check(&rate_key, state.config.rate_limit.limit, state.config.rate_limit.window)
        .await;
    if !decision.allowed {
        state
            .metrics
            .ingest_rejected_total
            .with_label_values(&[source, "rate_limited"])
            .inc();
        return rate_limited_response(decision.retry_after);
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            state
                .metrics
                .ingest_rejected_total
                .with_label_values(&[source, "invalid_json"])
                .inc();
            publish_to_ingest_dlq(state, source, &headers, &body, &err.to_string()).await;
            return error_response(Error::InvalidJson(err.to_string()));
        }
    };

    let secret = state.config.secret_for(source);
    let signature_valid = SignatureVerifier::verify(source, &headers, &body, secret);
    if secret.is_some() && !signature_valid {
        state
            .metrics
            .ingest_rejected_total
            .with_label_values(&[source, "invalid_signature"])
            .inc();
        return error_response(Error::InvalidSignature(format!(
            "signature mismatch for source '{source}'"
        )));
    }

    let raw = RawEvent::new(source, headers, signature_valid, payload);
    let request_id = raw.id;
    let encoded = match serde_json::to_vec(&raw) {
        Ok(encoded) => encoded,
        Err(err) => {
            tracing::error!(error = %err, source, "raw event failed to serialize");
            return error_response(Error::BrokerUnavailable("failed to encode raw event".to_string()));
        }
    };

    if let Err(err) = state.broker.publish(&subject::raw_subject(source), encoded).await {
        state
            .metrics
            .ingest_rejected_total
            .with_label_values(&[source, "broker_unavailable"])
            .inc();
        return error_response(Error::BrokerUnavailable(err.to_string()));
    }

    json_response(
        StatusCode::ACCEPTED,
        &serde_json::json!({ "request_id": request_id }),
    )
}

/// Spec §4.7 step 3: a body that doesn't even parse as JSON never becomes a
/// `RawEvent` — it's written to the ingest DLQ as its own envelope instead.
async fn publish_to_ingest_dlq(
    state: &AppState,
    source: &str,
    headers: &HashMap<String, String>,
    body: &[u8],
    parse_error: &str,
) {
    let envelope = serde_json::json!({
        "source": source,
        "headers": headers,
        "body": String::from_utf8_lossy(body),
        "error": parse_error,
    });
    let Ok(encoded) = serde_json::to_vec(&envelope) else {
        return;
    };
    let dlq_subject = subject::ingest_dlq_subject(source);
    if let Err(err) = state.broker.publish(&dlq_subject, encoded).await {
        tracing::error!(error = %err, subject = %dlq_subject, "failed to write unparseable body to ingest dlq");
    }
}

fn rate_limited_response(retry_after: Duration) -> Response<Body> {
    let retry_after_secs = retry_after.as_secs().max(1);
    let mut response = error_response(Error::RateLimited { retry_after_secs });
    if let Ok(value) = hyper::header::HeaderValue::from_str(&retry_after_secs.to_string()) {
        response.headers_mut().insert(hyper::header::RETRY_AFTER, value);
    }
    response
}
