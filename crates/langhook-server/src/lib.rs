//! # LangHook Server
//!
//! The control plane: wires the schema/mapping store, stream client, LLM
//! broker and rate limiter together, binds a matcher consumer per active
//! subscription, starts the map worker and the HTTP surface, and drains
//! everything on shutdown.

#![deny(unsafe_code)]

pub mod dispatch;
pub mod http;
pub mod state;
pub mod streams;
pub mod workers;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use langhook_core::config::Config;
use langhook_core::llm::LlmBroker;
use langhook_core::rate_limit::RateLimiter;
use langhook_core::shutdown::GracefulShutdown;
use langhook_store::Store;

use langhook_broker::StreamClient;

use state::AppState;
use streams::{CANONICAL_STREAM, CANONICAL_SUBJECTS, DLQ_STREAM, DLQ_SUBJECTS, RAW_STREAM, RAW_SUBJECTS};

pub async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!("connecting to registry store");
    let store = Store::connect(&config.store_dsn)
        .await
        .context("failed to connect to registry store")?;

    tracing::info!("connecting to stream broker");
    let broker = StreamClient::connect(&config.broker_url)
        .await
        .context("failed to connect to stream broker")?;
    broker
        .ensure_stream(RAW_STREAM, vec![RAW_SUBJECTS.to_string()])
        .await
        .context("failed to ensure raw stream")?;
    broker
        .ensure_stream(CANONICAL_STREAM, vec![CANONICAL_SUBJECTS.to_string()])
        .await
        .context("failed to ensure canonical stream")?;
    broker
        .ensure_stream(DLQ_STREAM, vec![DLQ_SUBJECTS.to_string()])
        .await
        .context("failed to ensure dlq stream")?;

    tracing::info!("connecting to rate limit cache");
    let rate_limiter = RateLimiter::connect(&config.cache_url)
        .await
        .context("failed to connect to rate limit cache")?;

    let metrics = Arc::new(langhook_core::metrics::Metrics::new());
    let llm = LlmBroker::new(config.llm.clone(), metrics.clone())
        .context("failed to build llm broker")?;

    let shutdown = Arc::new(GracefulShutdown::builder().timeout(config.shutdown_grace).build());
    let shutdown_grace = config.shutdown_grace;

    let state = AppState::new(config, store, broker, llm, rate_limiter, metrics, shutdown.clone());
    // Every external dependency above was just dialed successfully; seed the
    // health cache optimistically rather than re-probing immediately.
    state.health.set(true, true, true);

    let active_subscriptions = state
        .store
        .subscriptions
        .list_active()
        .await
        .context("failed to list active subscriptions")?;
    tracing::info!(count = active_subscriptions.len(), "binding matcher consumers");
    for subscription in &active_subscriptions {
        let handle = workers::spawn_matcher(&state, subscription.id);
        state.subscriptions.insert(subscription.id, handle);
    }
    state
        .metrics
        .active_subscriptions
        .set(active_subscriptions.len() as i64);

    let map_worker_state = state.clone();
    let map_worker_task = tokio::spawn(async move {
        workers::map_worker::run(map_worker_state).await;
    });

    let http_state = state.clone();
    let http_task = tokio::spawn(async move {
        if let Err(err) = http::serve(http_state).await {
            tracing::error!(error = %err, "http server exited with error");
        }
    });

    let signal = shutdown.wait().await;
    tracing::info!(%signal, "shutdown requested, draining");

    drain(map_worker_task, http_task, &state, shutdown_grace).await;
    tracing::info!("shutdown complete");
    Ok(())
}

/// Wait for the map worker, HTTP server, and every bound subscription
/// matcher to finish, up to `grace`. Tasks that are still running past the
/// deadline are abandoned (their process is about to exit anyway).
async fn drain(
    map_worker_task: tokio::task::JoinHandle<()>,
    http_task: tokio::task::JoinHandle<()>,
    state: &AppState,
    grace: Duration,
) {
    let subscription_ids: Vec<_> = state.subscriptions.iter().map(|entry| *entry.key()).collect();
    let mut matcher_tasks = Vec::with_capacity(subscription_ids.len());
    for id in subscription_ids {
        if let Some((_, handle)) = state.subscriptions.remove(&id) {
            handle.cancel.notify_one();
            matcher_tasks.push(handle.task);
        }
    }

    let deadline = tokio::time::Instant::now() + grace;
    let _ = tokio::time::timeout_at(deadline, map_worker_task).await;
    let _ = tokio::time::timeout_at(deadline, http_task).await;
    let _ = tokio::time::timeout_at(deadline, futures::future::join_all(matcher_tasks)).await;
}
