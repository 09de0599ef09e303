//! Process-wide shared state.
//!
//! A subscription and its bound consumer would otherwise reference each
//! other cyclically ("subscription owns a consumer; consumer references
//! subscription"). This is resolved with a registry map keyed by
//! subscription id, with the running consumer task holding only the id and
//! looking the subscription up again on (re)bind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use langhook_core::config::Config;
use langhook_core::llm::LlmBroker;
use langhook_core::mapping::MappingEngine;
use langhook_core::metrics::Metrics;
use langhook_core::rate_limit::RateLimiter;
use langhook_core::shutdown::GracefulShutdown;
use langhook_store::{MappingRepository, Store};
use uuid::Uuid;

use langhook_broker::StreamClient;

/// A subscription's live consumer task, referenced only by id from the
/// subscription row it serves.
pub struct SubscriptionHandle {
    /// Signalled to stop pulling new deliveries without aborting work on a
    /// message already in flight.
    pub cancel: Arc<tokio::sync::Notify>,
    pub task: tokio::task::JoinHandle<()>,
}

/// Reachability of the three external dependencies, probed once at startup
/// and cached, then re-probed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Up,
    Degraded,
    Down,
}

pub struct HealthCache {
    broker_ok: AtomicBool,
    store_ok: AtomicBool,
    cache_ok: AtomicBool,
}

impl HealthCache {
    fn new() -> Self {
        Self {
            broker_ok: AtomicBool::new(false),
            store_ok: AtomicBool::new(false),
            cache_ok: AtomicBool::new(false),
        }
    }

    pub fn set(&self, broker_ok: bool, store_ok: bool, cache_ok: bool) {
        self.broker_ok.store(broker_ok, Ordering::Release);
        self.store_ok.store(store_ok, Ordering::Release);
        self.cache_ok.store(cache_ok, Ordering::Release);
    }

    pub fn status(&self) -> HealthStatus {
        let broker = self.broker_ok.load(Ordering::Acquire);
        let store = self.store_ok.load(Ordering::Acquire);
        let cache = self.cache_ok.load(Ordering::Acquire);
        if broker && store && cache {
            HealthStatus::Up
        } else if broker && store {
            // Cache (rate limiter) outages are designed to fail open, so
            // they degrade rather than take the service down.
            HealthStatus::Degraded
        } else {
            HealthStatus::Down
        }
    }
}

pub type Engine = MappingEngine<MappingRepository, LlmBroker>;

/// Everything the ingest path, background workers, and HTTP handlers need,
/// constructed once in [`crate::run`] and cloned (cheaply — everything
/// inside is an `Arc` or already `Clone`) into each of them.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
    pub broker: StreamClient,
    pub llm: Arc<LlmBroker>,
    pub mapping_engine: Arc<Engine>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics: Arc<Metrics>,
    pub http_client: reqwest::Client,
    pub shutdown: Arc<GracefulShutdown>,
    pub subscriptions: Arc<DashMap<Uuid, SubscriptionHandle>>,
    pub health: Arc<HealthCache>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        store: Store,
        broker: StreamClient,
        llm: LlmBroker,
        rate_limiter: RateLimiter,
        metrics: Arc<Metrics>,
        shutdown: Arc<GracefulShutdown>,
    ) -> Self {
        let llm = Arc::new(llm);
        let mapping_engine = Arc::new(MappingEngine::new(store.mappings.clone(), llm.clone()));
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("valid reqwest client");

        Self {
            config: Arc::new(config),
            store,
            broker,
            llm,
            mapping_engine,
            rate_limiter: Arc::new(rate_limiter),
            metrics,
            http_client,
            shutdown,
            subscriptions: Arc::new(DashMap::new()),
            health: Arc::new(HealthCache::new()),
        }
    }
}
