//! Cache abstraction over the external cache store.
//!
//! Only a narrow slice of what a general-purpose cache crate offers is
//! needed here (the rate limiter talks to Redis directly, since its sliding
//! window needs sorted-set semantics this trait doesn't expose) — this
//! module exists so other call sites (e.g. mapping-engine lookups that want
//! a shared cache later) have a seam to test against without a live Redis.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;

/// Errors from a cache backend.
#[derive(Debug, Clone)]
pub enum CacheError {
    Connection(String),
    Serialization(String),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::Connection(msg) => write!(f, "cache connection error: {msg}"),
            CacheError::Serialization(msg) => write!(f, "cache serialization error: {msg}"),
        }
    }
}

impl std::error::Error for CacheError {}

/// A cache backend that can store and retrieve JSON-serializable values.
pub trait Cache: Send + Sync {
    fn get<T: DeserializeOwned + Send>(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Option<T>> + Send + '_>>;

    fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;
}

struct Entry {
    json: String,
    expires_at: Option<std::time::Instant>,
}

/// In-process cache used by tests and by local development when no cache
/// store is configured.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cache for MemoryCache {
    fn get<T: DeserializeOwned + Send>(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Option<T>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let entries = self.entries.read();
            let entry = entries.get(&key)?;
            if let Some(expires_at) = entry.expires_at {
                if std::time::Instant::now() >= expires_at {
                    return None;
                }
            }
            serde_json::from_str(&entry.json).ok()
        })
    }

    fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let key = key.to_string();
        let json = serde_json::to_string(value).unwrap_or_default();
        Box::pin(async move {
            let expires_at = ttl.map(|d| std::time::Instant::now() + d);
            self.entries.write().insert(key, Entry { json, expires_at });
        })
    }

    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move { self.entries.write().remove(&key).is_some() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let cache = MemoryCache::new();
        cache.set("k", &42i32, None).await;
        assert_eq!(cache.get::<i32>("k").await, Some(42));
    }

    #[tokio::test]
    async fn expired_entries_are_not_returned() {
        let cache = MemoryCache::new();
        cache
            .set("k", &42i32, Some(Duration::from_millis(1)))
            .await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.get::<i32>("k").await, None);
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = MemoryCache::new();
        cache.set("k", &1i32, None).await;
        assert!(cache.delete("k").await);
        assert_eq!(cache.get::<i32>("k").await, None);
    }
}
