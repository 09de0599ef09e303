use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A webhook payload as received by the ingest path, before canonicalization
/// by the map worker.
///
/// Owned by the ingest path until the map worker acknowledges it (after
/// canonicalization or after it is written to the DLQ).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    /// Unique id assigned at ingest time. Becomes the idempotency key for
    /// the canonical event the map worker derives from it.
    pub id: Uuid,
    /// Wall-clock time the request was accepted, to millisecond precision.
    pub received_at: DateTime<Utc>,
    /// The `{source}` path segment of `POST /ingest/{source}`.
    pub source: String,
    /// Request headers, lowercased keys.
    pub headers: HashMap<String, String>,
    /// `true` if no secret is configured for `source`, or if the
    /// configured secret's signature matched.
    pub signature_valid: bool,
    /// The parsed JSON body.
    pub payload: serde_json::Value,
}

impl RawEvent {
    /// Build a new raw event with a fresh id and the current time.
    pub fn new(
        source: impl Into<String>,
        headers: HashMap<String, String>,
        signature_valid: bool,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            received_at: Utc::now(),
            source: source.into(),
            headers,
            signature_valid,
            payload,
        }
    }
}
