use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an [`IngestMapping`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSource {
    Builtin,
    Synthesized,
}

/// A stored structural-fingerprint-keyed transform.
///
/// Uniqueness: `fingerprint` is the natural key. Mutated only when the
/// stored `expression` fails to evaluate against a later payload and
/// resynthesis succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestMapping {
    /// Structural fingerprint, or extended fingerprint when
    /// `event_field_expressions` is non-empty.
    pub fingerprint: String,
    pub publisher: String,
    /// The path-rewrite transform expression (see [`crate::mapping::expression`]).
    pub expression: String,
    /// JSON-path expressions whose evaluated values extend the fingerprint.
    /// May be empty.
    pub event_field_expressions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub source: MappingSource,
}

impl IngestMapping {
    pub fn builtin(
        publisher: impl Into<String>,
        fingerprint: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            fingerprint: fingerprint.into(),
            publisher: publisher.into(),
            expression: expression.into(),
            event_field_expressions: Vec::new(),
            created_at: now,
            updated_at: now,
            source: MappingSource::Builtin,
        }
    }

    pub fn synthesized(
        publisher: impl Into<String>,
        fingerprint: impl Into<String>,
        expression: impl Into<String>,
        event_field_expressions: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            fingerprint: fingerprint.into(),
            publisher: publisher.into(),
            expression: expression.into(),
            event_field_expressions,
            created_at: now,
            updated_at: now,
            source: MappingSource::Synthesized,
        }
    }
}
