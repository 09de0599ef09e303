use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::schema::SchemaTriple;

/// One row per canonical event, logged only when `EVENT_LOGGING_ENABLED`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLog {
    pub event_id: Uuid,
    pub subject: String,
    pub triple: SchemaTriple,
    pub payload: serde_json::Value,
    pub emitted_at: DateTime<Utc>,
    pub logged_at: DateTime<Utc>,
}

/// Whether the gate passed, blocked, or was not evaluated (no gate
/// configured).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePassed {
    NotEvaluated,
    Passed,
    Blocked,
}

/// One row per (subscription, event) observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionEventLog {
    pub subscription_id: Uuid,
    pub event_id: Uuid,
    pub subject: String,
    pub payload: serde_json::Value,
    pub gate_passed: GatePassed,
    pub gate_reason: Option<String>,
    pub webhook_sent: bool,
    pub webhook_response_status: Option<u16>,
    pub observed_at: DateTime<Utc>,
}
