//! Map worker: `raw.>` → canonical events, schema registration, and the
//! optional event log.

use langhook_core::domain::{RawEvent, SchemaTriple};
use langhook_core::error::Error;
use langhook_core::subject;

use crate::state::AppState;
use crate::streams::{MAP_WORKER_DURABLE, RAW_STREAM, RAW_SUBJECTS};

/// Run the map worker until `state.shutdown` fires. Acks happen after schema
/// registration/logging are attempted; transient failures nak for
/// redelivery instead.
pub async fn run(state: AppState) {
    loop {
        let mut subscription = match state
            .broker
            .subscribe(RAW_STREAM, RAW_SUBJECTS, MAP_WORKER_DURABLE)
            .await
        {
            Ok(sub) => sub,
            Err(err) => {
                tracing::warn!(error = %err, "map worker failed to bind raw consumer, retrying");
                tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                continue;
            }
        };

        let mut token = state.shutdown.token();
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                delivery = subscription.next() => {
                    match delivery {
                        Some(Ok(delivery)) => process_one(&state, &delivery).await,
                        Some(Err(err)) => {
                            tracing::warn!(error = %err, "map worker lost connection, rebinding");
                            break;
                        }
                        None => {
                            tracing::warn!("map worker consumer stream closed, rebinding");
                            break;
                        }
                    }
                }
            }
        }
    }
}

async fn process_one(state: &AppState, delivery: &langhook_broker::Delivery) {
    let raw: RawEvent = match serde_json::from_slice(delivery.payload()) {
        Ok(raw) => raw,
        Err(err) => {
            // Not a recoverable condition: the message on `raw.*` is
            // malformed, never transient. Drop it rather than loop forever.
            tracing::error!(error = %err, "map worker received unparseable raw event, dropping");
            state
                .metrics
                .events_failed_total
                .with_label_values(&["parse"])
                .inc();
            let _ = delivery.ack().await;
            return;
        }
    };
    state
        .metrics
        .events_processed_total
        .with_label_values(&[&raw.source])
        .inc();

    let timer = std::time::Instant::now();
    let mapped = state
        .mapping_engine
        .map(&raw.source, raw.id, raw.received_at, &raw.payload)
        .await;
    state.metrics.map_latency_seconds.observe(timer.elapsed().as_secs_f64());

    match mapped {
        Ok(event) => {
            let canonical_subject = subject::derive(&event);
            let body = match serde_json::to_vec(&event) {
                Ok(body) => body,
                Err(err) => {
                    tracing::error!(error = %err, "canonical event failed to serialize, dropping");
                    let _ = delivery.ack().await;
                    return;
                }
            };

            if let Err(err) = state.broker.publish(&canonical_subject, body).await {
                tracing::warn!(error = %err, "canonical publish failed, nak for redelivery");
                let _ = delivery.nak().await;
                return;
            }
            state
                .metrics
                .canonical_events_total
                .with_label_values(&[&event.publisher])
                .inc();
            state
                .metrics
                .events_mapped_total
                .with_label_values(&[&event.publisher])
                .inc();

            let triple = SchemaTriple::new(
                event.publisher.clone(),
                event.resource.type_.clone(),
                event.action.clone(),
            );
            // A registry failure only logs; it never fails the message,
            // since schema lag is already bounded to one hop regardless.
            if let Err(err) = state.store.schema.upsert(&triple).await {
                tracing::warn!(error = %err, "schema registry upsert failed");
            }

            if state.config.event_logging_enabled {
                if let Err(err) = state
                    .store
                    .event_logs
                    .append_event(&event, &canonical_subject)
                    .await
                {
                    tracing::warn!(error = %err, "event log append failed");
                }
            }

            let _ = delivery.ack().await;
        }
        Err(err) if err.is_transient() => {
            tracing::warn!(error = %err, source = %raw.source, "transient mapping failure, nak for redelivery");
            let _ = delivery.nak().await;
        }
        Err(err) => {
            tracing::warn!(error = %err, source = %raw.source, "mapping failed, routing to dlq");
            send_to_dlq(state, &raw, &err).await;
            state
                .metrics
                .mapping_synthesis_total
                .with_label_values(&["failed"])
                .inc();
            state
                .metrics
                .events_failed_total
                .with_label_values(&["map"])
                .inc();
            let _ = delivery.ack().await;
        }
    }
}

async fn send_to_dlq(state: &AppState, raw: &RawEvent, err: &Error) {
    let envelope = serde_json::json!({
        "raw_event": raw,
        "error": err.to_string(),
    });
    let Ok(body) = serde_json::to_vec(&envelope) else {
        return;
    };
    let dlq_subject = subject::map_dlq_subject(&raw.source);
    if let Err(publish_err) = state.broker.publish(&dlq_subject, body).await {
        tracing::error!(error = %publish_err, subject = %dlq_subject, "failed to write to map dlq");
    }
}
