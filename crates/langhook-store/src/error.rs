//! Store-local error type, converted to [`langhook_core::error::Error`] at
//! the crate boundary so callers never see a raw `sqlx::Error`, and never
//! conflate a connectivity error with a validation error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Startup-fatal: the `schema_migrations` table names a version newer
    /// than any migration this binary knows how to run.
    #[error("database schema is at version {0}, newer than this binary supports")]
    UnsupportedMigrationVersion(i64),
}

impl From<StoreError> for langhook_core::error::Error {
    fn from(err: StoreError) -> Self {
        langhook_core::error::Error::StoreUnavailable(err.to_string())
    }
}
