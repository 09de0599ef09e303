//! Subscription persistence.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use langhook_core::domain::{ChannelConfig, FailoverPolicy, Gate, Subscription, SubscriptionStatus};

use crate::error::StoreError;

pub struct SubscriptionRepository {
    pool: PgPool,
}

impl SubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, subscription: &Subscription) -> Result<(), StoreError> {
        let (channel_type, channel_config) = encode_channel(&subscription.channel);
        let (gate_enabled, gate_prompt, gate_threshold, gate_audit, gate_failover_policy) =
            encode_gate(&subscription.gate);

        sqlx::query(
            "INSERT INTO subscriptions \
             (id, subscriber_id, description, pattern, channel_type, channel_config, \
              gate_enabled, gate_prompt, gate_threshold, gate_audit, gate_failover_policy, \
              disposable, active, used, status, created_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)",
        )
        .bind(subscription.id)
        .bind(&subscription.subscriber_id)
        .bind(&subscription.description)
        .bind(&subscription.pattern)
        .bind(channel_type)
        .bind(channel_config)
        .bind(gate_enabled)
        .bind(gate_prompt)
        .bind(gate_threshold)
        .bind(gate_audit)
        .bind(gate_failover_policy)
        .bind(subscription.disposable)
        .bind(subscription.active)
        .bind(subscription.used)
        .bind(encode_status(subscription.status))
        .bind(subscription.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Subscription>, StoreError> {
        let row = sqlx::query(SELECT_COLUMNS_WHERE_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_subscription(&r)).transpose()
    }

    pub async fn list(&self) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_subscription).collect()
    }

    /// All subscriptions the control plane should bind a consumer for at
    /// startup.
    pub async fn list_active(&self) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} WHERE active ORDER BY created_at"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_subscription).collect()
    }

    /// Partial update. `None` leaves a field untouched. Returns the updated
    /// row, or `None` if `id` doesn't exist.
    #[allow(clippy::too_many_arguments)]
    pub async fn update(
        &self,
        id: Uuid,
        pattern: Option<&str>,
        channel: Option<&ChannelConfig>,
        gate: Option<&Gate>,
        disposable: Option<bool>,
        active: Option<bool>,
    ) -> Result<Option<Subscription>, StoreError> {
        let Some(mut current) = self.get(id).await? else {
            return Ok(None);
        };
        if let Some(pattern) = pattern {
            current.pattern = pattern.to_string();
        }
        if let Some(channel) = channel {
            current.channel = channel.clone();
        }
        if let Some(gate) = gate {
            current.gate = gate.clone();
        }
        if let Some(disposable) = disposable {
            current.disposable = disposable;
        }
        if let Some(active) = active {
            current.active = active;
            current.status = if active {
                SubscriptionStatus::Active
            } else {
                SubscriptionStatus::Inactive
            };
        }

        let (channel_type, channel_config) = encode_channel(&current.channel);
        let (gate_enabled, gate_prompt, gate_threshold, gate_audit, gate_failover_policy) =
            encode_gate(&current.gate);

        sqlx::query(
            "UPDATE subscriptions SET pattern = $2, channel_type = $3, channel_config = $4, \
             gate_enabled = $5, gate_prompt = $6, gate_threshold = $7, gate_audit = $8, \
             gate_failover_policy = $9, disposable = $10, active = $11, status = $12 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(&current.pattern)
        .bind(channel_type)
        .bind(channel_config)
        .bind(gate_enabled)
        .bind(gate_prompt)
        .bind(gate_threshold)
        .bind(gate_audit)
        .bind(gate_failover_policy)
        .bind(current.disposable)
        .bind(current.active)
        .bind(encode_status(current.status))
        .execute(&self.pool)
        .await?;

        Ok(Some(current))
    }

    /// Disposable-subscription self-deactivation after a dispatch:
    /// atomically `used = true, active = false, status = 'used'`.
    pub async fn mark_used_and_deactivate(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE subscriptions SET used = true, active = false, status = 'used' WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

const SELECT_COLUMNS: &str = "SELECT id, subscriber_id, description, pattern, channel_type, \
     channel_config, gate_enabled, gate_prompt, gate_threshold, gate_audit, gate_failover_policy, \
     disposable, active, used, status, created_at FROM subscriptions";
const SELECT_COLUMNS_WHERE_ID: &str = "SELECT id, subscriber_id, description, pattern, channel_type, \
     channel_config, gate_enabled, gate_prompt, gate_threshold, gate_audit, gate_failover_policy, \
     disposable, active, used, status, created_at FROM subscriptions WHERE id = $1";

fn encode_channel(channel: &ChannelConfig) -> (&'static str, serde_json::Value) {
    match channel {
        ChannelConfig::Webhook { url } => ("webhook", serde_json::json!({ "url": url })),
        ChannelConfig::None => ("none", serde_json::json!({})),
    }
}

fn decode_channel(channel_type: &str, channel_config: &serde_json::Value) -> ChannelConfig {
    match channel_type {
        "webhook" => ChannelConfig::Webhook {
            url: channel_config
                .get("url")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        },
        _ => ChannelConfig::None,
    }
}

fn encode_gate(gate: &Gate) -> (bool, Option<String>, Option<f64>, Option<bool>, Option<&'static str>) {
    match gate {
        Gate::Disabled => (false, None, None, None, None),
        Gate::Enabled {
            prompt,
            threshold,
            audit,
            failover_policy,
        } => (
            true,
            Some(prompt.clone()),
            Some(*threshold),
            Some(*audit),
            Some(match failover_policy {
                FailoverPolicy::FailOpen => "fail_open",
                FailoverPolicy::FailClosed => "fail_closed",
            }),
        ),
    }
}

fn decode_gate(
    enabled: bool,
    prompt: Option<String>,
    threshold: Option<f64>,
    audit: Option<bool>,
    failover_policy: Option<String>,
) -> Gate {
    if !enabled {
        return Gate::Disabled;
    }
    Gate::Enabled {
        prompt: prompt.unwrap_or_default(),
        threshold: threshold.unwrap_or(0.5),
        audit: audit.unwrap_or(false),
        failover_policy: match failover_policy.as_deref() {
            Some("fail_closed") => FailoverPolicy::FailClosed,
            _ => FailoverPolicy::FailOpen,
        },
    }
}

fn encode_status(status: SubscriptionStatus) -> &'static str {
    match status {
        SubscriptionStatus::Pending => "pending",
        SubscriptionStatus::Active => "active",
        SubscriptionStatus::Used => "used",
        SubscriptionStatus::Inactive => "inactive",
        SubscriptionStatus::Deleted => "deleted",
    }
}

fn decode_status(status: &str) -> SubscriptionStatus {
    match status {
        "active" => SubscriptionStatus::Active,
        "used" => SubscriptionStatus::Used,
        "inactive" => SubscriptionStatus::Inactive,
        "deleted" => SubscriptionStatus::Deleted,
        _ => SubscriptionStatus::Pending,
    }
}

fn row_to_subscription(row: &sqlx::postgres::PgRow) -> Result<Subscription, StoreError> {
    let channel_type: String = row.try_get("channel_type")?;
    let channel_config: serde_json::Value = row.try_get("channel_config")?;
    Ok(Subscription {
        id: row.try_get("id")?,
        subscriber_id: row.try_get("subscriber_id")?,
        description: row.try_get("description")?,
        pattern: row.try_get("pattern")?,
        channel: decode_channel(&channel_type, &channel_config),
        gate: decode_gate(
            row.try_get("gate_enabled")?,
            row.try_get("gate_prompt")?,
            row.try_get("gate_threshold")?,
            row.try_get("gate_audit")?,
            row.try_get("gate_failover_policy")?,
        ),
        disposable: row.try_get("disposable")?,
        active: row.try_get("active")?,
        used: row.try_get("used")?,
        status: decode_status(&row.try_get::<String, _>("status")?),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_roundtrips_through_encode_decode() {
        let gate = Gate::Enabled {
            prompt: "only approvals".to_string(),
            threshold: 0.8,
            audit: true,
            failover_policy: FailoverPolicy::FailClosed,
        };
        let (enabled, prompt, threshold, audit, failover) = encode_gate(&gate);
        let decoded = decode_gate(enabled, prompt, threshold, audit, failover.map(str::to_string));
        assert_eq!(decoded, gate);
    }

    #[test]
    fn disabled_gate_roundtrips() {
        let (enabled, prompt, threshold, audit, failover) = encode_gate(&Gate::Disabled);
        let decoded = decode_gate(enabled, prompt, threshold, audit, failover.map(str::to_string));
        assert_eq!(decoded, Gate::Disabled);
    }

    #[test]
    fn webhook_channel_roundtrips() {
        let channel = ChannelConfig::Webhook {
            url: "https://example.com/hook".to_string(),
        };
        let (ty, cfg) = encode_channel(&channel);
        assert_eq!(decode_channel(ty, &cfg), channel);
    }
}
