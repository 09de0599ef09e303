//! Subject derivation for canonical events.
//!
//! Subjects are the dotted broker address a canonical event publishes on:
//! `langhook.events.{publisher}.{resource.type}.{resource.id}.{action}`.
//! Every token is lowercased and any `.` inside a token is replaced with
//! `_` so a stray dot can never fragment the subject into more segments
//! than the matcher expects.

use crate::domain::CanonicalEvent;

fn sanitize_token(token: &str) -> String {
    token.to_lowercase().replace('.', "_")
}

/// Derive the publish subject for a canonical event.
pub fn derive(event: &CanonicalEvent) -> String {
    format!(
        "langhook.events.{}.{}.{}.{}",
        sanitize_token(&event.publisher),
        sanitize_token(&event.resource.type_),
        sanitize_token(&event.resource.id.to_string()),
        sanitize_token(&event.action),
    )
}

/// The DLQ subject a publisher's raw events fall onto when ingestion can't
/// produce a canonical event.
pub fn ingest_dlq_subject(source: &str) -> String {
    format!("dlq.ingest.{}", sanitize_token(source))
}

/// The DLQ subject a raw event falls onto when the mapping engine fails to
/// canonicalize it.
pub fn map_dlq_subject(source: &str) -> String {
    format!("dlq.map.{}", sanitize_token(source))
}

/// The raw-event ingest subject a source publishes onto.
pub fn raw_subject(source: &str) -> String {
    format!("raw.{}", sanitize_token(source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Resource, ResourceId};
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn event(publisher: &str, rtype: &str, id: ResourceId, action: &str) -> CanonicalEvent {
        CanonicalEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            publisher: publisher.to_string(),
            resource: Resource { type_: rtype.to_string(), id },
            action: action.to_string(),
            summary: None,
            payload: json!({}),
        }
    }

    #[test]
    fn derives_subject_for_numeric_resource_id() {
        let event = event("github", "pull_request", ResourceId::Number(1374), "create");
        assert_eq!(derive(&event), "langhook.events.github.pull_request.1374.create");
    }

    #[test]
    fn derives_subject_for_text_resource_id() {
        let event = event("stripe", "invoice", ResourceId::Text("in_123".into()), "update");
        assert_eq!(derive(&event), "langhook.events.stripe.invoice.in_123.update");
    }

    #[test]
    fn sanitizes_dots_and_case_in_tokens() {
        let event = event("My.Pub", "Res.Type", ResourceId::Text("id.with.dots".into()), "Act");
        assert_eq!(
            derive(&event),
            "langhook.events.my_pub.res_type.id_with_dots.act"
        );
    }

    #[test]
    fn dlq_subjects_are_namespaced() {
        assert_eq!(ingest_dlq_subject("github"), "dlq.ingest.github");
        assert_eq!(map_dlq_subject("github"), "dlq.map.github");
        assert_eq!(raw_subject("github"), "raw.github");
    }
}
