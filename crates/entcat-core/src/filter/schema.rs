//! Declared shapes for well-known content filter fields.

use serde_json::{Map, Value};

use super::json_type_name;
use crate::error::ValidationError;

/// Expected shape of a filter field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    /// A single string.
    Str,
    /// A list whose items are all strings.
    StrList,
}

impl FieldShape {
    fn outer_type(self) -> &'static str {
        match self {
            FieldShape::Str => "str",
            FieldShape::StrList => "list",
        }
    }
}

/// Known filter fields and their shapes. Fields not listed here are not checked.
pub const CONTENT_FILTER_FIELD_TYPES: &[(&str, FieldShape)] = &[
    ("key", FieldShape::StrList),
    ("first_enrollable_paid_seat_price__lte", FieldShape::Str),
    ("aggregation_key", FieldShape::StrList),
    ("content_type", FieldShape::StrList),
    ("level_type", FieldShape::StrList),
    ("availability", FieldShape::StrList),
    ("status", FieldShape::StrList),
    ("org", FieldShape::Str),
    ("partner", FieldShape::Str),
];

pub(super) fn validate_fields(fields: &Map<String, Value>) -> Result<(), ValidationError> {
    for (name, shape) in CONTENT_FILTER_FIELD_TYPES {
        let Some(value) = fields.get(*name) else {
            continue;
        };

        let outer_ok = match shape {
            FieldShape::Str => value.is_string(),
            FieldShape::StrList => value.is_array(),
        };
        if !outer_ok {
            return Err(ValidationError::new(
                *name,
                format!(
                    "Content filter '{}' must be of type {}, got {}",
                    name,
                    shape.outer_type(),
                    json_type_name(value)
                ),
            ));
        }

        if let (FieldShape::StrList, Value::Array(items)) = (shape, value) {
            if !items.iter().all(Value::is_string) {
                return Err(ValidationError::new(
                    *name,
                    format!("Content filter '{}' must contain values of type str", name),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::filter::ContentFilter;
    use serde_json::json;

    #[test]
    fn test_valid_filter() {
        let filter = ContentFilter::new()
            .with("content_type", json!(["course"]))
            .with("partner", "edx")
            .with("unknown_field", json!({"anything": [1, 2]}));
        assert!(filter.validate().is_ok());
    }

    #[test]
    fn test_wrong_outer_type() {
        let filter = ContentFilter::new().with("content_type", "course");
        let err = filter.validate().unwrap_err();
        assert_eq!(err.field, "content_type");
        assert!(err.message.contains("must be of type list"));
    }

    #[test]
    fn test_wrong_item_type() {
        let filter = ContentFilter::new().with("key", json!(["edX+DemoX", 42]));
        let err = filter.validate().unwrap_err();
        assert_eq!(err.field, "key");
        assert!(err.message.contains("values of type str"));
    }

    #[test]
    fn test_string_field_rejects_list() {
        let filter = ContentFilter::new().with("partner", json!(["edx"]));
        let err = filter.validate().unwrap_err();
        assert_eq!(err.field, "partner");
    }
}
