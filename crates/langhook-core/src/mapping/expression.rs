//! A small, purely-functional JSON path-rewrite expression language.
//!
//! The grammar is intentionally minimal: a transform is a `.`-separated
//! dotted path into the source document (`$` for the whole document), with
//! one extension — a `literal:` prefix for a fixed string that doesn't come
//! from the payload at all (useful for publishers whose action is implicit,
//! e.g. "this webhook is always a create").
//!
//! `IngestMapping::expression` holds a JSON object whose values are such
//! path expressions, one per canonical-event field:
//! `{"publisher": "literal:github", "resource.type": "$.pull_request ? literal:pull_request : literal:unknown", ...}`
//! is more than this language needs; in practice each value is a single
//! path or literal, evaluated independently per field.

use serde_json::Value;

/// A single field expression: either a literal string or a dotted path
/// into the payload (relative to `$`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldExpr {
    Literal(String),
    Path(Vec<PathSegment>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("empty expression")]
    Empty,
    #[error("path segment not found: {0}")]
    NotFound(String),
    #[error("expression did not resolve to a scalar value")]
    NotScalar,
}

impl FieldExpr {
    /// Parse a field expression string.
    ///
    /// `literal:<value>` is a constant. Anything else is a dotted path,
    /// optionally prefixed with `$.`; array indices are written `[N]`.
    pub fn parse(raw: &str) -> Result<Self, ExpressionError> {
        if raw.is_empty() {
            return Err(ExpressionError::Empty);
        }
        if let Some(literal) = raw.strip_prefix("literal:") {
            return Ok(FieldExpr::Literal(literal.to_string()));
        }

        let trimmed = raw.strip_prefix("$.").unwrap_or(raw.strip_prefix('$').unwrap_or(raw));
        if trimmed.is_empty() {
            return Ok(FieldExpr::Path(Vec::new()));
        }

        let mut segments = Vec::new();
        for part in trimmed.split('.') {
            let mut rest = part;
            while let Some(open) = rest.find('[') {
                let key = &rest[..open];
                if !key.is_empty() {
                    segments.push(PathSegment::Key(key.to_string()));
                }
                let close = rest[open..]
                    .find(']')
                    .map(|i| open + i)
                    .ok_or_else(|| ExpressionError::NotFound(raw.to_string()))?;
                let index: usize = rest[open + 1..close]
                    .parse()
                    .map_err(|_| ExpressionError::NotFound(raw.to_string()))?;
                segments.push(PathSegment::Index(index));
                rest = &rest[close + 1..];
            }
            if !rest.is_empty() {
                segments.push(PathSegment::Key(rest.to_string()));
            }
        }
        Ok(FieldExpr::Path(segments))
    }

    /// Evaluate against a payload, returning the resolved JSON value.
    pub fn evaluate<'a>(&self, payload: &'a Value) -> Result<Value, ExpressionError> {
        match self {
            FieldExpr::Literal(s) => Ok(Value::String(s.clone())),
            FieldExpr::Path(segments) => {
                let mut current = payload;
                for segment in segments {
                    current = match segment {
                        PathSegment::Key(key) => current
                            .get(key)
                            .ok_or_else(|| ExpressionError::NotFound(key.clone()))?,
                        PathSegment::Index(idx) => current
                            .get(idx)
                            .ok_or_else(|| ExpressionError::NotFound(format!("[{idx}]")))?,
                    };
                }
                Ok(current.clone())
            }
        }
    }

    /// Evaluate and coerce the result to a string, for use as an
    /// event-field-expression value contributing to the extended
    /// fingerprint.
    pub fn evaluate_to_string(&self, payload: &Value) -> Result<String, ExpressionError> {
        match self.evaluate(payload)? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Null => Ok("null".to_string()),
            Value::Array(_) | Value::Object(_) => Err(ExpressionError::NotScalar),
        }
    }

    /// The raw source form this expression was parsed from, reconstructed
    /// for serialization (not byte-identical to arbitrary input, but
    /// round-trips through `parse`).
    pub fn to_source(&self) -> String {
        match self {
            FieldExpr::Literal(s) => format!("literal:{s}"),
            FieldExpr::Path(segments) => {
                let mut out = String::from("$");
                for segment in segments {
                    match segment {
                        PathSegment::Key(key) => {
                            out.push('.');
                            out.push_str(key);
                        }
                        PathSegment::Index(idx) => {
                            out.push('[');
                            out.push_str(&idx.to_string());
                            out.push(']');
                        }
                    }
                }
                out
            }
        }
    }
}

/// The full transform stored in [`crate::domain::IngestMapping::expression`]:
/// a JSON object mapping canonical-event field names (`publisher`,
/// `resource.type`, `resource.id`, `action`, `summary`) to field expression
/// source strings. Serialized as a JSON string so it fits the single
/// `expression: String` column.
#[derive(Debug, Clone)]
pub struct Transform {
    fields: std::collections::BTreeMap<String, FieldExpr>,
}

impl Transform {
    pub fn new(fields: std::collections::BTreeMap<String, FieldExpr>) -> Self {
        Self { fields }
    }

    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let raw: std::collections::BTreeMap<String, String> =
            serde_json::from_str(source).map_err(|_| ExpressionError::Empty)?;
        let mut fields = std::collections::BTreeMap::new();
        for (field, expr_source) in raw {
            fields.insert(field, FieldExpr::parse(&expr_source)?);
        }
        Ok(Self { fields })
    }

    pub fn to_source(&self) -> String {
        let raw: std::collections::BTreeMap<String, String> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_source()))
            .collect();
        serde_json::to_string(&raw).unwrap_or_default()
    }

    pub fn field(&self, name: &str) -> Option<&FieldExpr> {
        self.fields.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transform_round_trips_through_source() {
        let mut fields = std::collections::BTreeMap::new();
        fields.insert("publisher".to_string(), FieldExpr::parse("literal:github").unwrap());
        fields.insert(
            "resource.id".to_string(),
            FieldExpr::parse("$.pull_request.number").unwrap(),
        );
        let transform = Transform::new(fields);
        let reparsed = Transform::parse(&transform.to_source()).unwrap();
        assert_eq!(
            reparsed.field("publisher").unwrap().to_source(),
            "literal:github"
        );
    }

    #[test]
    fn parses_and_evaluates_dotted_path() {
        let expr = FieldExpr::parse("$.pull_request.number").unwrap();
        let payload = json!({"pull_request": {"number": 1374}});
        assert_eq!(expr.evaluate(&payload).unwrap(), json!(1374));
    }

    #[test]
    fn parses_and_evaluates_array_index() {
        let expr = FieldExpr::parse("$.items[0].id").unwrap();
        let payload = json!({"items": [{"id": "a"}, {"id": "b"}]});
        assert_eq!(expr.evaluate(&payload).unwrap(), json!("a"));
    }

    #[test]
    fn literal_expression_ignores_payload() {
        let expr = FieldExpr::parse("literal:github").unwrap();
        assert_eq!(expr.evaluate(&json!({})).unwrap(), json!("github"));
    }

    #[test]
    fn missing_path_errors() {
        let expr = FieldExpr::parse("$.missing.field").unwrap();
        assert!(expr.evaluate(&json!({})).is_err());
    }

    #[test]
    fn round_trips_through_source() {
        for raw in ["$.pull_request.number", "literal:create", "$.items[2].name"] {
            let expr = FieldExpr::parse(raw).unwrap();
            let reparsed = FieldExpr::parse(&expr.to_source()).unwrap();
            assert_eq!(expr, reparsed);
        }
    }

    #[test]
    fn evaluate_to_string_coerces_numbers() {
        let expr = FieldExpr::parse("$.pull_request.number").unwrap();
        let payload = json!({"pull_request": {"number": 1374}});
        assert_eq!(expr.evaluate_to_string(&payload).unwrap(), "1374");
    }
}
