//! Content filters.
//!
//! A content filter is an ordered JSON object selecting which discovery
//! content belongs to a catalog. Field order is part of its canonical form.

mod hash;
mod schema;

pub use hash::{content_filter_hash, CONTENT_FILTER_HASH_LEN};
pub use schema::{FieldShape, CONTENT_FILTER_FIELD_TYPES};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, ValidationError};

/// An ordered mapping from filter-field name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentFilter(Map<String, Value>);

impl ContentFilter {
    /// Create an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, keeping insertion order.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Parse a filter from JSON text. The top level must be an object.
    pub fn from_json_str(text: &str) -> Result<Self, Error> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| Error::Deserialization(e.to_string()))?;
        Self::from_value(value)
    }

    /// Build a filter from an arbitrary JSON value.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ValidationError::new(
                "content_filter",
                format!("Content filter must be a JSON object, got {}", json_type_name(&other)),
            )
            .into()),
        }
    }

    /// Look up a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Field names in order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the filter has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The canonical JSON text the hash is computed over.
    pub fn canonical_json(&self) -> String {
        // Serializing a map of JSON values cannot fail.
        serde_json::to_string(&self.0).unwrap_or_default()
    }

    /// Deterministic digest of this filter.
    pub fn hash(&self) -> String {
        content_filter_hash(self)
    }

    /// Check known fields against their declared shapes.
    pub fn validate(&self) -> Result<(), ValidationError> {
        schema::validate_fields(&self.0)
    }

    /// The underlying field map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for ContentFilter {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_preserves_order() {
        let filter = ContentFilter::from_json_str(r#"{"zeta": 1, "alpha": 2, "mid": 3}"#).unwrap();
        let fields: Vec<_> = filter.fields().collect();
        assert_eq!(fields, vec!["zeta", "alpha", "mid"]);
        assert_eq!(filter.canonical_json(), r#"{"zeta":1,"alpha":2,"mid":3}"#);
    }

    #[test]
    fn test_rejects_non_object() {
        let err = ContentFilter::from_value(json!(["key"])).unwrap_err();
        match err {
            Error::Validation(v) => assert_eq!(v.field, "content_filter"),
            other => panic!("Expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_builder() {
        let filter = ContentFilter::new()
            .with("content_type", json!(["course"]))
            .with("partner", "edx");
        assert_eq!(filter.len(), 2);
        assert_eq!(filter.get("partner"), Some(&json!("edx")));
    }
}
