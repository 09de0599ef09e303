//! Migration runner.
//!
//! Tracks applied versions in a `schema_migrations` table rather than
//! `sqlx::migrate!`'s own `_sqlx_migrations` bookkeeping table, since that
//! name isn't configurable and operators expect a stable one to query.
//! Migrations are plain `.sql` files embedded at compile time and applied
//! inside a single transaction each, in ascending version order.

use sqlx::{PgPool, Row};

use crate::error::StoreError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "init",
    sql: include_str!("../migrations/0001_init.sql"),
}];

/// Ensure the `schema_migrations` table exists and apply any migration whose
/// version isn't yet recorded there.
pub async fn run(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
            version BIGINT PRIMARY KEY, \
            name TEXT NOT NULL, \
            applied_at TIMESTAMPTZ NOT NULL DEFAULT now())",
    )
    .execute(pool)
    .await?;

    let applied: Vec<i64> = sqlx::query("SELECT version FROM schema_migrations")
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|row| row.get::<i64, _>("version"))
        .collect();

    let max_known = MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0);
    if let Some(&unknown) = applied.iter().find(|v| **v > max_known) {
        return Err(StoreError::UnsupportedMigrationVersion(unknown));
    }

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }
        tracing::info!(version = migration.version, name = migration.name, "applying migration");
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(migration.sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO schema_migrations (version, name) VALUES ($1, $2)")
            .bind(migration.version)
            .bind(migration.name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    Ok(())
}
