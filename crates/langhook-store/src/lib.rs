//! # LangHook Registry Store
//!
//! Relational persistence for the pieces of state the pipeline can't afford
//! to lose across a restart: ingest mappings, the schema registry,
//! subscriptions, and the two event log tables. Built on `sqlx` against
//! Postgres; every write helper is idempotent on its natural key.

#![deny(unsafe_code)]

pub mod error;
pub mod event_logs;
pub mod mappings;
pub mod migrations;
pub mod pool;
pub mod schema;
pub mod subscriptions;

pub use error::StoreError;
pub use event_logs::{EventLogRepository, GateFilter};
pub use mappings::MappingRepository;
pub use schema::{SchemaRepository, SchemaSummary};
pub use subscriptions::SubscriptionRepository;

use sqlx::PgPool;

/// Handle to every Registry Store repository, constructed once from a
/// shared pool and cloned (cheaply — `PgPool` is an `Arc` internally) into
/// each component that needs it.
#[derive(Clone)]
pub struct Store {
    pub mappings: std::sync::Arc<MappingRepository>,
    pub schema: std::sync::Arc<SchemaRepository>,
    pub subscriptions: std::sync::Arc<SubscriptionRepository>,
    pub event_logs: std::sync::Arc<EventLogRepository>,
}

impl Store {
    pub async fn connect(dsn: &str) -> Result<Self, StoreError> {
        let pool = pool::connect(dsn).await?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            mappings: std::sync::Arc::new(MappingRepository::new(pool.clone())),
            schema: std::sync::Arc::new(SchemaRepository::new(pool.clone())),
            subscriptions: std::sync::Arc::new(SubscriptionRepository::new(pool.clone())),
            event_logs: std::sync::Arc::new(EventLogRepository::new(pool)),
        }
    }
}
