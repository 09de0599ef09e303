//! The error taxonomy shared across the pipeline.
//!
//! Connectivity errors (`*Unavailable`) are kept distinct from validation
//! errors rather than folded into one catch-all: a caller that only wants to
//! know "should I retry" never has to pattern-match on a string.

use thiserror::Error;

/// A pipeline-wide error kind.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid json: {0}")]
    InvalidJson(String),

    #[error("body exceeds maximum of {max_bytes} bytes")]
    BodyTooLarge { max_bytes: usize },

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("no mapping found for fingerprint {0}")]
    MappingMissing(String),

    #[error("mapping-yielded-invalid-canonical: {0}")]
    MappingYieldedInvalidCanonical(String),

    #[error("llm mapping synthesis failed: {0}")]
    LlmSynthesisFailed(String),

    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("budget-exhausted")]
    BudgetExhausted,

    #[error("subscription pattern references unknown schema: {0}")]
    SubscriptionPatternUnknownSchema(String),

    #[error("channel delivery failed: {0}")]
    ChannelDeliveryFailed(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// The HTTP status code this error kind surfaces as, where applicable.
    /// Kinds that never reach the HTTP layer (e.g.
    /// `MappingMissing`, which is only ever handled by the map worker) still
    /// return a sensible status for completeness.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidJson(_) => 400,
            Error::BodyTooLarge { .. } => 413,
            Error::RateLimited { .. } => 429,
            Error::InvalidSignature(_) => 401,
            Error::MappingMissing(_)
            | Error::MappingYieldedInvalidCanonical(_)
            | Error::LlmSynthesisFailed(_) => 202,
            Error::BrokerUnavailable(_) | Error::StoreUnavailable(_) | Error::CacheUnavailable(_) => {
                503
            }
            Error::BudgetExhausted => 503,
            Error::SubscriptionPatternUnknownSchema(_) => 400,
            Error::ChannelDeliveryFailed(_) => 502,
            Error::Config(_) => 500,
        }
    }

    /// `true` for transient connectivity errors that a worker should `nak`
    /// (redeliver) rather than drop to the DLQ.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::BrokerUnavailable(_) | Error::StoreUnavailable(_) | Error::CacheUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_map_to_503() {
        let err = Error::StoreUnavailable("connection reset".into());
        assert_eq!(err.http_status(), 503);
        assert!(err.is_transient());
    }

    #[test]
    fn validation_errors_are_not_transient() {
        assert!(!Error::InvalidJson("eof".into()).is_transient());
        assert!(!Error::InvalidSignature("mismatch".into()).is_transient());
    }

    #[test]
    fn mapping_failures_never_surface_to_producer() {
        // Ingest already returned 202 before these can occur.
        assert_eq!(Error::MappingMissing("abc".into()).http_status(), 202);
        assert_eq!(
            Error::LlmSynthesisFailed("timeout".into()).http_status(),
            202
        );
    }
}
