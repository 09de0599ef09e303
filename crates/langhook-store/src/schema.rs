//! Schema registry persistence.

use sqlx::{PgPool, Row};

use langhook_core::domain::SchemaTriple;

use crate::error::StoreError;

pub struct SchemaRepository {
    pool: PgPool,
}

impl SchemaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// "Insert if absent, update `last_seen_at`". Called by the map worker
    /// after every canonical-event publish.
    pub async fn upsert(&self, triple: &SchemaTriple) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO schema_registry (publisher, resource_type, action) VALUES ($1, $2, $3) \
             ON CONFLICT (publisher, resource_type, action) DO UPDATE SET last_seen_at = now()",
        )
        .bind(&triple.publisher)
        .bind(&triple.resource_type)
        .bind(&triple.action)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `true` if every token of `triple` that isn't a wildcard is present in
    /// the registry — used to validate a subscription pattern.
    pub async fn contains(&self, publisher: &str, resource_type: &str, action: &str) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT 1 FROM schema_registry WHERE publisher = $1 AND resource_type = $2 AND action = $3",
        )
        .bind(publisher)
        .bind(resource_type)
        .bind(action)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    pub async fn known_triples(&self) -> Result<Vec<SchemaTriple>, StoreError> {
        let rows = sqlx::query("SELECT publisher, resource_type, action FROM schema_registry")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| SchemaTriple {
                publisher: row.get("publisher"),
                resource_type: row.get("resource_type"),
                action: row.get("action"),
            })
            .collect())
    }

    /// `GET /schema` shape: publishers, resource types per publisher, and
    /// the distinct set of actions.
    pub async fn summary(&self) -> Result<SchemaSummary, StoreError> {
        let triples = self.known_triples().await?;
        let mut publishers: Vec<String> = Vec::new();
        let mut resource_types: std::collections::BTreeMap<String, Vec<String>> =
            std::collections::BTreeMap::new();
        let mut actions: Vec<String> = Vec::new();

        for triple in &triples {
            if !publishers.contains(&triple.publisher) {
                publishers.push(triple.publisher.clone());
            }
            let entry = resource_types.entry(triple.publisher.clone()).or_default();
            if !entry.contains(&triple.resource_type) {
                entry.push(triple.resource_type.clone());
            }
            if !actions.contains(&triple.action) {
                actions.push(triple.action.clone());
            }
        }
        publishers.sort();
        actions.sort();
        for types in resource_types.values_mut() {
            types.sort();
        }

        Ok(SchemaSummary {
            publishers,
            resource_types,
            actions,
        })
    }

    /// `DELETE /schema/publishers/{p}` and its narrower forms. Cascades only
    /// over the registry; stored events are untouched.
    pub async fn delete(
        &self,
        publisher: &str,
        resource_type: Option<&str>,
        action: Option<&str>,
    ) -> Result<u64, StoreError> {
        let result = match (resource_type, action) {
            (Some(rtype), Some(act)) => {
                sqlx::query(
                    "DELETE FROM schema_registry WHERE publisher = $1 AND resource_type = $2 AND action = $3",
                )
                .bind(publisher)
                .bind(rtype)
                .bind(act)
                .execute(&self.pool)
                .await?
            }
            (Some(rtype), None) => {
                sqlx::query("DELETE FROM schema_registry WHERE publisher = $1 AND resource_type = $2")
                    .bind(publisher)
                    .bind(rtype)
                    .execute(&self.pool)
                    .await?
            }
            (None, _) => {
                sqlx::query("DELETE FROM schema_registry WHERE publisher = $1")
                    .bind(publisher)
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SchemaSummary {
    pub publishers: Vec<String>,
    pub resource_types: std::collections::BTreeMap<String, Vec<String>>,
    pub actions: Vec<String>,
}
