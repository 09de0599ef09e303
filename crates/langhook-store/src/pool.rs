//! Connection pool construction.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::StoreError;

/// Open a connection pool and run pending migrations.
pub async fn connect(dsn: &str) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(dsn)
        .await?;
    crate::migrations::run(&pool).await?;
    Ok(pool)
}
