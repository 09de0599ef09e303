//! # LangHook Core
//!
//! Cross-cutting concerns shared by every LangHook service process: the
//! canonical domain model, configuration, the error taxonomy, the mapping
//! engine, the LLM broker, signature verification, rate limiting, caching,
//! subject derivation, graceful shutdown and telemetry bootstrap.
//!
//! This crate knows nothing about HTTP, the message broker wire protocol, or
//! the relational schema — those live in `langhook-server`, `langhook-broker`
//! and `langhook-store` respectively.

#![deny(unsafe_code)]

/// Configuration loaded from the process environment.
pub mod config;

/// The canonical domain model (`RawEvent`, `CanonicalEvent`, `IngestMapping`, ...).
pub mod domain;

/// The error taxonomy shared across the pipeline.
pub mod error;

/// Cache abstraction over the external cache store.
pub mod cache;

/// Per-source-IP sliding window rate limiting.
pub mod rate_limit;

/// HMAC-based webhook signature verification.
pub mod signature;

/// The mapping engine: fingerprinting and transform evaluation.
pub mod mapping;

/// The LLM broker: prompted synthesis and gate evaluation.
pub mod llm;

/// Subject derivation and subject-filter matching, shared by the broker,
/// map worker, and subscription matcher.
pub mod subject;

/// Graceful shutdown coordination.
pub mod shutdown;

/// Tracing/logging bootstrap.
pub mod telemetry;

/// Process-wide metrics registry, exposed at `/metrics`.
pub mod metrics;

/// Commonly used imports for LangHook binaries.
pub mod prelude {
    pub use crate::cache::{Cache, CacheError};
    pub use crate::config::Config;
    pub use crate::domain::{
        CanonicalEvent, EventLog, IngestMapping, RawEvent, Resource, SchemaTriple, Subscription,
        SubscriptionEventLog,
    };
    pub use crate::error::Error;
    pub use crate::llm::{GateOutcome, LlmBroker};
    pub use crate::mapping::MappingEngine;
    pub use crate::rate_limit::RateLimiter;
    pub use crate::shutdown::{GracefulShutdown, ShutdownToken};
    pub use crate::signature::SignatureVerifier;
}

#[cfg(test)]
mod tests {
    #[test]
    fn crate_compiles() {
        assert!(true);
    }
}
