use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What to do when the LLM gate is unreachable or over budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverPolicy {
    FailOpen,
    FailClosed,
}

/// The optional semantic gate attached to a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Gate {
    Disabled,
    Enabled {
        prompt: String,
        threshold: f64,
        audit: bool,
        failover_policy: FailoverPolicy,
    },
}

impl Gate {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Gate::Enabled { .. })
    }
}

/// The delivery channel a subscription dispatches matched events to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelConfig {
    Webhook { url: String },
    None,
}

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Used,
    Inactive,
    Deleted,
}

/// A user-defined subscription to canonical events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub subscriber_id: String,
    pub description: String,
    /// Broker subject filter synthesized from `description` against the
    /// schema registry at creation time.
    pub pattern: String,
    pub channel: ChannelConfig,
    pub gate: Gate,
    pub disposable: bool,
    pub active: bool,
    pub used: bool,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// `true` once a disposable subscription has dispatched and should stop
    /// matching.
    pub fn should_unbind(&self) -> bool {
        self.disposable && self.used
    }
}
