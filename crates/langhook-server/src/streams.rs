//! Stream and consumer naming conventions.
//!
//! Three streams cover the whole subject space: raw ingest, canonical
//! events, and the two DLQ families. Keeping them separate means a
//! slow/backed-up DLQ never competes for retention budget with the hot
//! canonical-event path.

pub const RAW_STREAM: &str = "LANGHOOK_RAW";
pub const RAW_SUBJECTS: &str = "raw.>";

pub const CANONICAL_STREAM: &str = "LANGHOOK_CANONICAL";
pub const CANONICAL_SUBJECTS: &str = "langhook.events.>";

pub const DLQ_STREAM: &str = "LANGHOOK_DLQ";
pub const DLQ_SUBJECTS: &str = "dlq.>";

pub const MAP_WORKER_DURABLE: &str = "langhook-map-worker";

/// Durable consumer name for a subscription's matcher. Consumers reference
/// subscriptions only by id, never by value.
pub fn subscription_durable_name(subscription_id: uuid::Uuid) -> String {
    format!("langhook-sub-{subscription_id}")
}
