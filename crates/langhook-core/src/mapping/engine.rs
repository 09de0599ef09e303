//! The mapping engine proper: fingerprint, look up, evaluate, or fall
//! through to synthesis.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::domain::{CanonicalEvent, IngestMapping, Resource, ResourceId};
use crate::error::Error;

use super::expression::Transform;
use super::fingerprint::{extended_fingerprint, structural_fingerprint};

/// Storage seam the mapping engine needs from the schema/mapping store.
/// Implemented by `langhook-store`; kept here so `langhook-core` doesn't
/// depend on it.
#[async_trait::async_trait]
pub trait MappingStore: Send + Sync {
    async fn get_mapping(
        &self,
        publisher: &str,
        fingerprint: &str,
    ) -> Result<Option<IngestMapping>, Error>;

    async fn upsert_mapping(&self, mapping: &IngestMapping) -> Result<(), Error>;
}

/// Synthesis seam the mapping engine needs from the LLM broker.
#[async_trait::async_trait]
pub trait MappingSynthesizer: Send + Sync {
    /// Produce a transform expression (as a [`Transform`] source string)
    /// for a never-before-seen payload shape, given a sample payload.
    async fn synthesize_mapping(
        &self,
        publisher: &str,
        sample_payload: &Value,
    ) -> Result<String, Error>;
}

/// Turns raw JSON payloads into [`CanonicalEvent`]s.
pub struct MappingEngine<S, L> {
    store: Arc<S>,
    synthesizer: Arc<L>,
    /// One in-flight synthesis per fingerprint, process-wide. An occupied
    /// entry means a synthesis is running; waiters subscribe to the
    /// broadcast channel rather than starting a redundant LLM call.
    in_flight: DashMap<String, broadcast::Sender<Result<IngestMapping, String>>>,
}

impl<S, L> MappingEngine<S, L>
where
    S: MappingStore,
    L: MappingSynthesizer,
{
    pub fn new(store: Arc<S>, synthesizer: Arc<L>) -> Self {
        Self {
            store,
            synthesizer,
            in_flight: DashMap::new(),
        }
    }

    /// Map a raw payload for `publisher` into a [`CanonicalEvent`] bearing
    /// `id`/`timestamp` inherited from the originating `RawEvent`.
    pub async fn map(
        &self,
        publisher: &str,
        id: uuid::Uuid,
        timestamp: chrono::DateTime<Utc>,
        payload: &Value,
    ) -> Result<CanonicalEvent, Error> {
        let structural = structural_fingerprint(payload);
        let mapping = match self.store.get_mapping(publisher, &structural).await? {
            Some(mapping) => self.resolve_extended(publisher, &structural, &mapping, payload).await?,
            None => self.synthesize(publisher, &structural, payload).await?,
        };

        self.evaluate(&mapping, id, timestamp, publisher, payload)
    }

    /// If the structural mapping declares event-field expressions, compute
    /// the extended fingerprint and prefer a mapping stored under that key,
    /// falling back to the structural mapping.
    async fn resolve_extended(
        &self,
        publisher: &str,
        structural: &str,
        mapping: &IngestMapping,
        payload: &Value,
    ) -> Result<IngestMapping, Error> {
        if mapping.event_field_expressions.is_empty() {
            return Ok(mapping.clone());
        }

        let mut values = Vec::with_capacity(mapping.event_field_expressions.len());
        for raw_expr in &mapping.event_field_expressions {
            let expr = super::expression::FieldExpr::parse(raw_expr)
                .map_err(|e| Error::MappingYieldedInvalidCanonical(e.to_string()))?;
            values.push(
                expr.evaluate_to_string(payload)
                    .unwrap_or_else(|_| String::new()),
            );
        }
        let extended = extended_fingerprint(structural, &values);

        match self.store.get_mapping(publisher, &extended).await? {
            Some(extended_mapping) => Ok(extended_mapping),
            None => Ok(mapping.clone()),
        }
    }

    /// Single-flight synthesis: concurrent lookups for the same fingerprint
    /// coalesce onto one LLM call.
    async fn synthesize(
        &self,
        publisher: &str,
        fingerprint: &str,
        payload: &Value,
    ) -> Result<IngestMapping, Error> {
        let flight_key = format!("{publisher}:{fingerprint}");

        // Fast path: someone else is already synthesizing this fingerprint.
        if let Some(sender) = self.in_flight.get(&flight_key).map(|e| e.clone()) {
            let mut receiver = sender.subscribe();
            drop(sender);
            return match receiver.recv().await {
                Ok(Ok(mapping)) => Ok(mapping),
                Ok(Err(reason)) => Err(Error::LlmSynthesisFailed(reason)),
                Err(_) => Err(Error::LlmSynthesisFailed(
                    "synthesis coalescing channel closed".to_string(),
                )),
            };
        }

        let (sender, _) = broadcast::channel(1);
        // If another task raced us to insert, defer to it instead.
        match self.in_flight.entry(flight_key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                let mut receiver = existing.get().subscribe();
                drop(existing);
                return match receiver.recv().await {
                    Ok(Ok(mapping)) => Ok(mapping),
                    Ok(Err(reason)) => Err(Error::LlmSynthesisFailed(reason)),
                    Err(_) => Err(Error::LlmSynthesisFailed(
                        "synthesis coalescing channel closed".to_string(),
                    )),
                };
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(sender.clone());
            }
        }

        let result = self.run_synthesis(publisher, fingerprint, payload).await;
        self.in_flight.remove(&flight_key);

        match result {
            Ok(mapping) => {
                let _ = sender.send(Ok(mapping.clone()));
                Ok(mapping)
            }
            Err(err) => {
                // A failed synthesis is not cached; the next arrival retries.
                let _ = sender.send(Err(err.to_string()));
                Err(err)
            }
        }
    }

    async fn run_synthesis(
        &self,
        publisher: &str,
        fingerprint: &str,
        payload: &Value,
    ) -> Result<IngestMapping, Error> {
        let expression = self
            .synthesizer
            .synthesize_mapping(publisher, payload)
            .await?;

        // Round-trip validation: the synthesized transform must actually
        // evaluate against the sample that produced it.
        let transform = Transform::parse(&expression)
            .map_err(|e| Error::LlmSynthesisFailed(format!("invalid transform: {e}")))?;
        validate_transform(&transform, payload)
            .map_err(|e| Error::LlmSynthesisFailed(format!("round-trip failed: {e}")))?;

        let mapping = IngestMapping::synthesized(publisher, fingerprint, expression, Vec::new());
        self.store.upsert_mapping(&mapping).await?;
        Ok(mapping)
    }

    fn evaluate(
        &self,
        mapping: &IngestMapping,
        id: uuid::Uuid,
        timestamp: chrono::DateTime<Utc>,
        publisher: &str,
        payload: &Value,
    ) -> Result<CanonicalEvent, Error> {
        let transform = Transform::parse(&mapping.expression)
            .map_err(|e| Error::MappingYieldedInvalidCanonical(e.to_string()))?;
        build_canonical_event(&transform, id, timestamp, publisher, payload)
    }
}

fn validate_transform(transform: &Transform, sample: &Value) -> Result<(), Error> {
    build_canonical_event(transform, uuid::Uuid::nil(), Utc::now(), "validation", sample).map(|_| ())
}

fn build_canonical_event(
    transform: &Transform,
    id: uuid::Uuid,
    timestamp: chrono::DateTime<Utc>,
    fallback_publisher: &str,
    payload: &Value,
) -> Result<CanonicalEvent, Error> {
    let publisher = eval_required_string(transform, "publisher", payload)
        .unwrap_or_else(|_| fallback_publisher.to_string());
    let resource_type = eval_required_string(transform, "resource.type", payload)?;
    let resource_id = eval_required_resource_id(transform, payload)?;
    let action = eval_required_string(transform, "action", payload)?;
    let summary = transform
        .field("summary")
        .and_then(|expr| expr.evaluate_to_string(payload).ok());

    let event = CanonicalEvent {
        id,
        timestamp,
        publisher,
        resource: Resource {
            type_: resource_type,
            id: resource_id,
        },
        action,
        summary,
        payload: payload.clone(),
    };

    if !event.has_valid_tokens() {
        return Err(Error::MappingYieldedInvalidCanonical(
            "publisher/resource.type/action must be non-empty lowercase tokens without '.'"
                .to_string(),
        ));
    }

    Ok(event)
}

fn eval_required_string(
    transform: &Transform,
    field: &str,
    payload: &Value,
) -> Result<String, Error> {
    let expr = transform
        .field(field)
        .ok_or_else(|| Error::MappingYieldedInvalidCanonical(format!("missing field: {field}")))?;
    expr.evaluate_to_string(payload)
        .map_err(|e| Error::MappingYieldedInvalidCanonical(format!("{field}: {e}")))
}

fn eval_required_resource_id(transform: &Transform, payload: &Value) -> Result<ResourceId, Error> {
    let expr = transform.field("resource.id").ok_or_else(|| {
        Error::MappingYieldedInvalidCanonical("missing field: resource.id".to_string())
    })?;
    match expr
        .evaluate(payload)
        .map_err(|e| Error::MappingYieldedInvalidCanonical(format!("resource.id: {e}")))?
    {
        Value::Number(n) => n
            .as_i64()
            .map(ResourceId::Number)
            .ok_or_else(|| Error::MappingYieldedInvalidCanonical("resource.id out of range".into())),
        Value::String(s) => Ok(ResourceId::Text(s)),
        other => Err(Error::MappingYieldedInvalidCanonical(format!(
            "resource.id must be a string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MappingSource;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeStore {
        mappings: Mutex<HashMap<(String, String), IngestMapping>>,
    }

    #[async_trait::async_trait]
    impl MappingStore for FakeStore {
        async fn get_mapping(
            &self,
            publisher: &str,
            fingerprint: &str,
        ) -> Result<Option<IngestMapping>, Error> {
            Ok(self
                .mappings
                .lock()
                .get(&(publisher.to_string(), fingerprint.to_string()))
                .cloned())
        }

        async fn upsert_mapping(&self, mapping: &IngestMapping) -> Result<(), Error> {
            self.mappings.lock().insert(
                (mapping.publisher.clone(), mapping.fingerprint.clone()),
                mapping.clone(),
            );
            Ok(())
        }
    }

    struct FakeSynthesizer {
        expression: String,
    }

    #[async_trait::async_trait]
    impl MappingSynthesizer for FakeSynthesizer {
        async fn synthesize_mapping(
            &self,
            _publisher: &str,
            _sample_payload: &Value,
        ) -> Result<String, Error> {
            Ok(self.expression.clone())
        }
    }

    fn github_transform_source() -> String {
        Transform::parse("{}").unwrap(); // sanity: empty transform parses
        serde_json::json!({
            "publisher": "literal:github",
            "resource.type": "literal:pull_request",
            "resource.id": "$.pull_request.number",
            "action": "literal:create",
        })
        .to_string()
    }

    #[tokio::test]
    async fn maps_payload_via_stored_mapping() {
        let store = Arc::new(FakeStore::default());
        let payload = json!({"pull_request": {"number": 1374}});
        let fingerprint = structural_fingerprint(&payload);
        store
            .upsert_mapping(&IngestMapping::builtin(
                "github",
                fingerprint,
                github_transform_source(),
            ))
            .await
            .unwrap();

        let engine = MappingEngine::new(
            store,
            Arc::new(FakeSynthesizer {
                expression: String::new(),
            }),
        );
        let event = engine
            .map("github", uuid::Uuid::new_v4(), Utc::now(), &payload)
            .await
            .unwrap();
        assert_eq!(event.publisher, "github");
        assert_eq!(event.resource.type_, "pull_request");
        assert_eq!(event.action, "create");
    }

    #[tokio::test]
    async fn reprocessing_the_same_raw_event_yields_a_byte_identical_canonical_event() {
        let store = Arc::new(FakeStore::default());
        let payload = json!({"pull_request": {"number": 1374}});
        let fingerprint = structural_fingerprint(&payload);
        store
            .upsert_mapping(&IngestMapping::builtin(
                "github",
                fingerprint,
                github_transform_source(),
            ))
            .await
            .unwrap();

        let engine = MappingEngine::new(
            store,
            Arc::new(FakeSynthesizer {
                expression: String::new(),
            }),
        );
        let id = uuid::Uuid::new_v4();
        let timestamp = Utc::now();
        let first = engine.map("github", id, timestamp, &payload).await.unwrap();
        let redelivered = engine.map("github", id, timestamp, &payload).await.unwrap();
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&redelivered).unwrap()
        );
        assert_eq!(first.id, redelivered.id);
    }

    #[tokio::test]
    async fn synthesizes_and_persists_mapping_on_first_encounter() {
        let store = Arc::new(FakeStore::default());
        let synthesizer = Arc::new(FakeSynthesizer {
            expression: github_transform_source(),
        });
        let engine = MappingEngine::new(store.clone(), synthesizer);

        let payload = json!({"pull_request": {"number": 42}});
        let event = engine
            .map("github", uuid::Uuid::new_v4(), Utc::now(), &payload)
            .await
            .unwrap();
        assert_eq!(event.resource.id, ResourceId::Number(42));

        let fingerprint = structural_fingerprint(&payload);
        let stored = store.get_mapping("github", &fingerprint).await.unwrap();
        assert!(stored.is_some());
        assert_eq!(stored.unwrap().source, MappingSource::Synthesized);
    }

    #[tokio::test]
    async fn invalid_canonical_event_is_rejected() {
        let store = Arc::new(FakeStore::default());
        let payload = json!({"pull_request": {"number": 1}});
        let fingerprint = structural_fingerprint(&payload);
        let bad_expression = serde_json::json!({
            "publisher": "literal:GitHub",
            "resource.type": "literal:pull_request",
            "resource.id": "$.pull_request.number",
            "action": "literal:create",
        })
        .to_string();
        store
            .upsert_mapping(&IngestMapping::builtin("github", fingerprint, bad_expression))
            .await
            .unwrap();

        let engine = MappingEngine::new(
            store,
            Arc::new(FakeSynthesizer {
                expression: String::new(),
            }),
        );
        let result = engine.map("github", uuid::Uuid::new_v4(), Utc::now(), &payload).await;
        assert!(matches!(
            result,
            Err(Error::MappingYieldedInvalidCanonical(_))
        ));
    }
}
