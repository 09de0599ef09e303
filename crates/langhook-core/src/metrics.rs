//! Prometheus metrics exposition.
//!
//! Counters/gauges/histograms are created once, registered against one
//! `Registry`, and cloned into whichever component increments them.

use prometheus::{Encoder, Histogram, HistogramVec, IntCounterVec, IntGauge, Registry, TextEncoder};

/// All pipeline-wide counters and gauges, grouped behind one handle so
/// `langhook-server` can construct it once and hand clones to the ingest,
/// map, and matcher paths.
///
/// Covers the minimum operational set (`events_processed_total`,
/// `events_mapped_total`, `events_failed_total{stage}`,
/// `llm_invocations_total{kind}`, `gate_decisions_total{outcome}`,
/// `llm_cost_today_usd`, `map_latency_seconds`, `gate_latency_seconds`) plus
/// a few finer-grained counters the pipeline's own dashboards find useful.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub ingest_requests_total: IntCounterVec,
    pub ingest_rejected_total: IntCounterVec,
    pub events_processed_total: IntCounterVec,
    pub events_mapped_total: IntCounterVec,
    pub events_failed_total: IntCounterVec,
    pub canonical_events_total: IntCounterVec,
    pub mapping_synthesis_total: IntCounterVec,
    pub llm_invocations_total: IntCounterVec,
    pub gate_decisions_total: IntCounterVec,
    pub webhook_dispatch_total: IntCounterVec,
    pub webhook_dispatch_latency_ms: HistogramVec,
    pub map_latency_seconds: Histogram,
    pub gate_latency_seconds: Histogram,
    pub active_subscriptions: IntGauge,
    pub llm_spend_today_usd_x1000: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let ingest_requests_total = IntCounterVec::new(
            prometheus::Opts::new("langhook_ingest_requests_total", "Ingest requests by source"),
            &["source"],
        )
        .expect("valid metric");
        let ingest_rejected_total = IntCounterVec::new(
            prometheus::Opts::new(
                "langhook_ingest_rejected_total",
                "Rejected ingest requests by source and reason",
            ),
            &["source", "reason"],
        )
        .expect("valid metric");
        let events_processed_total = IntCounterVec::new(
            prometheus::Opts::new(
                "langhook_events_processed_total",
                "Raw events pulled off the raw stream by source",
            ),
            &["source"],
        )
        .expect("valid metric");
        let events_mapped_total = IntCounterVec::new(
            prometheus::Opts::new(
                "langhook_events_mapped_total",
                "Raw events successfully mapped to a canonical event, by publisher",
            ),
            &["publisher"],
        )
        .expect("valid metric");
        let events_failed_total = IntCounterVec::new(
            prometheus::Opts::new(
                "langhook_events_failed_total",
                "Events that failed processing, by pipeline stage",
            ),
            &["stage"],
        )
        .expect("valid metric");
        let canonical_events_total = IntCounterVec::new(
            prometheus::Opts::new(
                "langhook_canonical_events_total",
                "Canonical events emitted by publisher",
            ),
            &["publisher"],
        )
        .expect("valid metric");
        let mapping_synthesis_total = IntCounterVec::new(
            prometheus::Opts::new(
                "langhook_mapping_synthesis_total",
                "Mapping synthesis attempts by outcome",
            ),
            &["outcome"],
        )
        .expect("valid metric");
        let llm_invocations_total = IntCounterVec::new(
            prometheus::Opts::new(
                "langhook_llm_invocations_total",
                "LLM calls by prompt kind (mapping, subject_filter, gate)",
            ),
            &["kind"],
        )
        .expect("valid metric");
        let gate_decisions_total = IntCounterVec::new(
            prometheus::Opts::new(
                "langhook_gate_decisions_total",
                "Gate evaluations by outcome (allowed, blocked, failover_open, failover_closed)",
            ),
            &["outcome"],
        )
        .expect("valid metric");
        let webhook_dispatch_total = IntCounterVec::new(
            prometheus::Opts::new(
                "langhook_webhook_dispatch_total",
                "Webhook dispatches by outcome",
            ),
            &["outcome"],
        )
        .expect("valid metric");
        let webhook_dispatch_latency_ms = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "langhook_webhook_dispatch_latency_ms",
                "Webhook dispatch latency in milliseconds",
            ),
            &["outcome"],
        )
        .expect("valid metric");
        let map_latency_seconds = Histogram::with_opts(prometheus::HistogramOpts::new(
            "langhook_map_latency_seconds",
            "Time from raw event pull to canonical publish",
        ))
        .expect("valid metric");
        let gate_latency_seconds = Histogram::with_opts(prometheus::HistogramOpts::new(
            "langhook_gate_latency_seconds",
            "Time spent evaluating a subscription's gate",
        ))
        .expect("valid metric");
        let active_subscriptions = IntGauge::new(
            "langhook_active_subscriptions",
            "Currently active subscriptions",
        )
        .expect("valid metric");
        let llm_spend_today_usd_x1000 = IntGauge::new(
            "langhook_llm_spend_today_usd_x1000",
            "Estimated LLM spend today in thousandths of a dollar",
        )
        .expect("valid metric");

        for collector in [
            Box::new(ingest_requests_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(ingest_rejected_total.clone()),
            Box::new(events_processed_total.clone()),
            Box::new(events_mapped_total.clone()),
            Box::new(events_failed_total.clone()),
            Box::new(canonical_events_total.clone()),
            Box::new(mapping_synthesis_total.clone()),
            Box::new(llm_invocations_total.clone()),
            Box::new(gate_decisions_total.clone()),
            Box::new(webhook_dispatch_total.clone()),
            Box::new(webhook_dispatch_latency_ms.clone()),
            Box::new(map_latency_seconds.clone()),
            Box::new(gate_latency_seconds.clone()),
            Box::new(active_subscriptions.clone()),
            Box::new(llm_spend_today_usd_x1000.clone()),
        ] {
            registry.register(collector).expect("register metric");
        }

        Self {
            registry,
            ingest_requests_total,
            ingest_rejected_total,
            events_processed_total,
            events_mapped_total,
            events_failed_total,
            canonical_events_total,
            mapping_synthesis_total,
            llm_invocations_total,
            gate_decisions_total,
            webhook_dispatch_total,
            webhook_dispatch_latency_ms,
            map_latency_seconds,
            gate_latency_seconds,
            active_subscriptions,
            llm_spend_today_usd_x1000,
        }
    }

    /// Render in the Prometheus text exposition format, for the `/metrics`
    /// endpoint.
    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_without_error_when_empty() {
        let metrics = Metrics::new();
        assert!(metrics.encode().is_ok());
    }

    #[test]
    fn counters_are_queryable_after_increment() {
        let metrics = Metrics::new();
        metrics.ingest_requests_total.with_label_values(&["github"]).inc();
        let encoded = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(encoded.contains("langhook_ingest_requests_total"));
    }
}
