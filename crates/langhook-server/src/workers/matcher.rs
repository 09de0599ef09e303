//! Subscription matcher: one durable consumer per active subscription,
//! bound to its `pattern` on the canonical stream.
//!
//! This task never owns a `Subscription` value across iterations — it
//! re-fetches the row on every delivery, so a channel or gate edit (which
//! doesn't change `pattern`) takes effect without the control plane having
//! to rebind the consumer. Only a `pattern` edit forces a rebind, and
//! that's the control plane's job: it replaces this task wholesale.

use std::sync::Arc;

use langhook_core::domain::{
    CanonicalEvent, ChannelConfig, Gate, GatePassed, Subscription, SubscriptionEventLog,
};
use langhook_core::llm::GateOutcome;
use uuid::Uuid;

use crate::dispatch::dispatch_webhook;
use crate::state::AppState;
use crate::streams::{subscription_durable_name, CANONICAL_STREAM};

/// Run a single subscription's consumer until shutdown, cancellation, or
/// the subscription becomes inactive, disposed of, or self-unbinds after a
/// disposable dispatch.
pub async fn run(state: AppState, subscription_id: Uuid, cancel: Arc<tokio::sync::Notify>) {
    let Ok(Some(subscription)) = state.store.subscriptions.get(subscription_id).await else {
        tracing::warn!(%subscription_id, "matcher started for an unknown subscription, exiting");
        return;
    };

    let durable_name = subscription_durable_name(subscription_id);
    let mut consumer = match state
        .broker
        .subscribe(CANONICAL_STREAM, &subscription.pattern, &durable_name)
        .await
    {
        Ok(consumer) => consumer,
        Err(err) => {
            tracing::error!(%subscription_id, error = %err, "matcher failed to bind consumer");
            return;
        }
    };

    let mut shutdown = state.shutdown.token();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = cancel.notified() => return,
            delivery = consumer.next() => {
                let Some(delivery) = delivery else {
                    tracing::warn!(%subscription_id, "matcher consumer stream closed, exiting");
                    return;
                };
                let delivery = match delivery {
                    Ok(delivery) => delivery,
                    Err(err) => {
                        tracing::warn!(%subscription_id, error = %err, "matcher lost connection, exiting");
                        return;
                    }
                };

                let Ok(Some(subscription)) = state.store.subscriptions.get(subscription_id).await else {
                    // Deleted out from under us: ack so it doesn't redeliver
                    // forever and stop.
                    let _ = delivery.ack().await;
                    return;
                };
                if !subscription.active {
                    let _ = delivery.ack().await;
                    return;
                }

                let unbind = process_one(&state, &subscription, &delivery).await;
                if unbind {
                    return;
                }
            }
        }
    }
}

/// Returns `true` if this subscription should stop matching (a disposable
/// subscription just dispatched successfully).
async fn process_one(
    state: &AppState,
    subscription: &Subscription,
    delivery: &langhook_broker::Delivery,
) -> bool {
    let subject = delivery.subject().to_string();
    let event: CanonicalEvent = match serde_json::from_slice(delivery.payload()) {
        Ok(event) => event,
        Err(err) => {
            tracing::error!(error = %err, "matcher received an unparseable canonical event, dropping");
            let _ = delivery.ack().await;
            return false;
        }
    };

    let (gate_passed, gate_reason) = evaluate_gate(state, subscription, &event).await;
    let dispatched = !matches!(gate_passed, GatePassed::Blocked);

    let (webhook_sent, webhook_response_status) = if dispatched {
        match &subscription.channel {
            ChannelConfig::Webhook { url } => {
                // Spec §4.9 step 3: POST the canonical event JSON, not the
                // original upstream payload it was derived from.
                let body = serde_json::to_value(&event).unwrap_or_default();
                let timer = std::time::Instant::now();
                let outcome = dispatch_webhook(&state.http_client, url, &body).await;
                let outcome_label = if outcome.sent { "sent" } else { "failed" };
                state
                    .metrics
                    .webhook_dispatch_latency_ms
                    .with_label_values(&[outcome_label])
                    .observe(timer.elapsed().as_secs_f64() * 1000.0);
                state
                    .metrics
                    .webhook_dispatch_total
                    .with_label_values(&[outcome_label])
                    .inc();
                (outcome.sent, outcome.last_status)
            }
            // Polling subscriptions have nowhere to push to; the log row
            // below is the only record of the match.
            ChannelConfig::None => (false, None),
        }
    } else {
        (false, None)
    };

    let log = SubscriptionEventLog {
        subscription_id: subscription.id,
        event_id: event.id,
        subject,
        payload: event.payload.clone(),
        gate_passed,
        gate_reason,
        webhook_sent,
        webhook_response_status,
        observed_at: chrono::Utc::now(),
    };
    if let Err(err) = state.store.event_logs.append_subscription_event(&log).await {
        tracing::warn!(error = %err, subscription_id = %subscription.id, "subscription event log append failed");
    }

    let mut unbind = false;
    if dispatched && subscription.disposable {
        match state
            .store
            .subscriptions
            .mark_used_and_deactivate(subscription.id)
            .await
        {
            Ok(()) => unbind = true,
            Err(err) => {
                tracing::warn!(error = %err, subscription_id = %subscription.id, "failed to deactivate disposable subscription");
            }
        }
    }

    let _ = delivery.ack().await;
    unbind
}

/// Evaluate the subscription's gate, if any. A disabled gate always passes
/// without an LLM call. An LLM failure (unreachable, budget exhausted,
/// malformed response) applies the subscription's `failover_policy` rather
/// than propagating the error.
async fn evaluate_gate(
    state: &AppState,
    subscription: &Subscription,
    event: &CanonicalEvent,
) -> (GatePassed, Option<String>) {
    let Gate::Enabled {
        prompt,
        threshold,
        failover_policy,
        ..
    } = &subscription.gate
    else {
        return (GatePassed::NotEvaluated, None);
    };

    let event_json = serde_json::to_string(event).unwrap_or_default();
    let timer = std::time::Instant::now();
    let outcome = match state.llm.evaluate_gate(prompt, &event_json).await {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::warn!(
                error = %err,
                subscription_id = %subscription.id,
                "gate evaluation failed, applying failover policy"
            );
            GateOutcome::failover(*failover_policy)
        }
    };
    state.metrics.gate_latency_seconds.observe(timer.elapsed().as_secs_f64());
    state.metrics.llm_invocations_total.with_label_values(&["gate"]).inc();

    // A confident "no" and a low-confidence "yes" are both blocks (spec
    // §4.6: "if confidence is below threshold, treat as block").
    let allowed = outcome.decision && (outcome.confidence as f64) >= *threshold;
    state
        .metrics
        .gate_decisions_total
        .with_label_values(&[if allowed { "allowed" } else { "blocked" }])
        .inc();

    if allowed {
        (GatePassed::Passed, Some(outcome.reasoning))
    } else {
        (GatePassed::Blocked, Some(outcome.reasoning))
    }
}
