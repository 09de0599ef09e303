use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `resource.id` is either an integer or a string in the source payload;
/// both are carried through unchanged rather than coerced to one shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceId::Number(n) => write!(f, "{n}"),
            ResourceId::Text(s) => write!(f, "{s}"),
        }
    }
}

/// The resource a canonical event is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub type_: String,
    pub id: ResourceId,
}

/// The uniform event shape produced by the mapping engine and published by
/// the map worker onto the canonical subject.
///
/// Invariant: `publisher`, `resource.type_` and `action` are non-empty
/// lowercase tokens free of `.`; [`crate::subject::derive`] depends on this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEvent {
    /// Inherited from the [`crate::domain::RawEvent`] it was derived from.
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub publisher: String,
    pub resource: Resource,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// The original JSON payload, carried through unmodified.
    pub payload: serde_json::Value,
}

impl CanonicalEvent {
    /// `true` if `publisher`, `resource.type_` and `action` are all
    /// non-empty lowercase tokens containing no `.`.
    pub fn has_valid_tokens(&self) -> bool {
        [
            self.publisher.as_str(),
            self.resource.type_.as_str(),
            self.action.as_str(),
        ]
        .iter()
        .all(|t| is_valid_token(t))
    }
}

fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && !token.contains('.')
        && token.chars().all(|c| !c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(publisher: &str, rtype: &str, action: &str) -> CanonicalEvent {
        CanonicalEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            publisher: publisher.to_string(),
            resource: Resource {
                type_: rtype.to_string(),
                id: ResourceId::Number(1),
            },
            action: action.to_string(),
            summary: None,
            payload: json!({}),
        }
    }

    #[test]
    fn rejects_dotted_tokens() {
        assert!(!event("git.hub", "pull_request", "create").has_valid_tokens());
    }

    #[test]
    fn rejects_uppercase_tokens() {
        assert!(!event("GitHub", "pull_request", "create").has_valid_tokens());
    }

    #[test]
    fn accepts_clean_tokens() {
        assert!(event("github", "pull_request", "create").has_valid_tokens());
    }

    #[test]
    fn resource_id_roundtrips_both_variants() {
        let number = serde_json::to_value(ResourceId::Number(1374)).unwrap();
        assert_eq!(number, json!(1374));
        let text: ResourceId = serde_json::from_value(json!("abc-123")).unwrap();
        assert_eq!(text, ResourceId::Text("abc-123".into()));
    }
}
