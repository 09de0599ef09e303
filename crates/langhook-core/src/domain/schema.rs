use serde::{Deserialize, Serialize};

/// One discovered (publisher, resource_type, action) triple in the schema
/// registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaTriple {
    pub publisher: String,
    pub resource_type: String,
    pub action: String,
}

impl SchemaTriple {
    pub fn new(
        publisher: impl Into<String>,
        resource_type: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            publisher: publisher.into(),
            resource_type: resource_type.into(),
            action: action.into(),
        }
    }
}
