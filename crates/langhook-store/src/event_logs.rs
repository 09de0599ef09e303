//! Event log persistence for `EventLog`/`SubscriptionEventLog` rows.
//!
//! Pagination is offset+size with a hard ceiling; rows are always ordered
//! newest-first.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use langhook_core::domain::{CanonicalEvent, EventLog, GatePassed, SubscriptionEventLog};

use crate::error::StoreError;

/// Hard ceiling on a page's `size`.
pub const MAX_PAGE_SIZE: u32 = 200;

pub struct EventLogRepository {
    pool: PgPool,
}

/// Gate filter for `GET /subscriptions/{id}/events`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateFilter {
    Allowed,
    Blocked,
    All,
}

impl EventLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append a canonical-event row, gated on `EVENT_LOGGING_ENABLED`.
    pub async fn append_event(&self, event: &CanonicalEvent, subject: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO event_logs (event_id, subject, publisher, resource_type, action, \
             payload, emitted_at) VALUES ($1,$2,$3,$4,$5,$6,$7) \
             ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(event.id)
        .bind(subject)
        .bind(&event.publisher)
        .bind(&event.resource.type_)
        .bind(&event.action)
        .bind(&event.payload)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_events(
        &self,
        page: u32,
        size: u32,
        resource_types: &[String],
    ) -> Result<Vec<EventLog>, StoreError> {
        let size = size.min(MAX_PAGE_SIZE);
        let offset = page.saturating_mul(size);

        let rows = if resource_types.is_empty() {
            sqlx::query(
                "SELECT event_id, subject, publisher, resource_type, action, payload, \
                 emitted_at, logged_at FROM event_logs ORDER BY logged_at DESC LIMIT $1 OFFSET $2",
            )
            .bind(size as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT event_id, subject, publisher, resource_type, action, payload, \
                 emitted_at, logged_at FROM event_logs WHERE resource_type = ANY($1) \
                 ORDER BY logged_at DESC LIMIT $2 OFFSET $3",
            )
            .bind(resource_types)
            .bind(size as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?
        };

        rows.iter().map(row_to_event_log).collect()
    }

    /// Append a (subscription, event) observation row.
    #[allow(clippy::too_many_arguments)]
    pub async fn append_subscription_event(
        &self,
        log: &SubscriptionEventLog,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO subscription_event_logs \
             (subscription_id, event_id, subject, payload, gate_passed, gate_reason, \
              webhook_sent, webhook_response_status, observed_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
        )
        .bind(log.subscription_id)
        .bind(log.event_id)
        .bind(&log.subject)
        .bind(&log.payload)
        .bind(encode_gate_passed(log.gate_passed))
        .bind(&log.gate_reason)
        .bind(log.webhook_sent)
        .bind(log.webhook_response_status.map(|s| s as i16))
        .bind(log.observed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_subscription_events(
        &self,
        subscription_id: Uuid,
        page: u32,
        size: u32,
        gate: GateFilter,
    ) -> Result<Vec<SubscriptionEventLog>, StoreError> {
        let size = size.min(MAX_PAGE_SIZE);
        let offset = page.saturating_mul(size);

        let rows = match gate {
            GateFilter::All => sqlx::query(SUB_EVENT_COLUMNS_BY_SUBSCRIPTION)
                .bind(subscription_id)
                .bind(size as i64)
                .bind(offset as i64)
                .fetch_all(&self.pool)
                .await?,
            GateFilter::Allowed => sqlx::query(&format!(
                "{SUB_EVENT_COLUMNS_BY_SUBSCRIPTION_PREFIX} AND gate_passed != 'blocked' \
                 ORDER BY observed_at DESC LIMIT $2 OFFSET $3"
            ))
            .bind(subscription_id)
            .bind(size as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?,
            GateFilter::Blocked => sqlx::query(&format!(
                "{SUB_EVENT_COLUMNS_BY_SUBSCRIPTION_PREFIX} AND gate_passed = 'blocked' \
                 ORDER BY observed_at DESC LIMIT $2 OFFSET $3"
            ))
            .bind(subscription_id)
            .bind(size as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?,
        };

        rows.iter().map(row_to_subscription_event_log).collect()
    }
}

const SUB_EVENT_COLUMNS_BY_SUBSCRIPTION_PREFIX: &str = "SELECT subscription_id, event_id, \
     subject, payload, gate_passed, gate_reason, webhook_sent, webhook_response_status, \
     observed_at FROM subscription_event_logs WHERE subscription_id = $1";
const SUB_EVENT_COLUMNS_BY_SUBSCRIPTION: &str = "SELECT subscription_id, event_id, subject, \
     payload, gate_passed, gate_reason, webhook_sent, webhook_response_status, observed_at \
     FROM subscription_event_logs WHERE subscription_id = $1 ORDER BY observed_at DESC LIMIT $2 OFFSET $3";

fn encode_gate_passed(value: GatePassed) -> &'static str {
    match value {
        GatePassed::NotEvaluated => "not_evaluated",
        GatePassed::Passed => "passed",
        GatePassed::Blocked => "blocked",
    }
}

fn decode_gate_passed(value: &str) -> GatePassed {
    match value {
        "passed" => GatePassed::Passed,
        "blocked" => GatePassed::Blocked,
        _ => GatePassed::NotEvaluated,
    }
}

fn row_to_event_log(row: &sqlx::postgres::PgRow) -> Result<EventLog, StoreError> {
    Ok(EventLog {
        event_id: row.try_get("event_id")?,
        subject: row.try_get("subject")?,
        triple: langhook_core::domain::SchemaTriple {
            publisher: row.try_get("publisher")?,
            resource_type: row.try_get("resource_type")?,
            action: row.try_get("action")?,
        },
        payload: row.try_get("payload")?,
        emitted_at: row.try_get::<DateTime<Utc>, _>("emitted_at")?,
        logged_at: row.try_get::<DateTime<Utc>, _>("logged_at")?,
    })
}

fn row_to_subscription_event_log(
    row: &sqlx::postgres::PgRow,
) -> Result<SubscriptionEventLog, StoreError> {
    let gate_passed: String = row.try_get("gate_passed")?;
    Ok(SubscriptionEventLog {
        subscription_id: row.try_get("subscription_id")?,
        event_id: row.try_get("event_id")?,
        subject: row.try_get("subject")?,
        payload: row.try_get("payload")?,
        gate_passed: decode_gate_passed(&gate_passed),
        gate_reason: row.try_get("gate_reason")?,
        webhook_sent: row.try_get("webhook_sent")?,
        webhook_response_status: row.try_get::<Option<i16>, _>("webhook_response_status")?.map(|s| s as u16),
        observed_at: row.try_get::<DateTime<Utc>, _>("observed_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_passed_roundtrips() {
        for value in [GatePassed::NotEvaluated, GatePassed::Passed, GatePassed::Blocked] {
            assert_eq!(decode_gate_passed(encode_gate_passed(value)), value);
        }
    }

    #[test]
    fn page_size_is_capped() {
        assert_eq!(MAX_PAGE_SIZE, 200);
    }
}
