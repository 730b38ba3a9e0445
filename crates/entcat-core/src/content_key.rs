//! Content key helpers.

use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};

use crate::model::ContentType;

const COURSE_RUN_KEY_PREFIX: &str = "course-v1:";

/// Derive the course key from a course run key.
///
/// `course-v1:edX+DemoX+Demo_Course` becomes `edX+DemoX`. Keys that are not
/// in the `course-v1` format have no derivable parent.
pub fn course_key_for_run(run_key: &str) -> Option<String> {
    let body = run_key.strip_prefix(COURSE_RUN_KEY_PREFIX)?;
    let mut parts = body.split('+');
    let org = parts.next().filter(|p| !p.is_empty())?;
    let number = parts.next().filter(|p| !p.is_empty())?;
    parts.next().filter(|p| !p.is_empty())?;
    if parts.next().is_some() {
        return None;
    }
    Some(format!("{org}+{number}"))
}

/// The key a discovery payload is stored under: `key`, else `uuid`.
pub fn metadata_content_key(metadata: &Map<String, Value>) -> Option<String> {
    ["key", "uuid"]
        .iter()
        .filter_map(|field| metadata.get(*field).and_then(Value::as_str))
        .find(|key| !key.is_empty())
        .map(str::to_string)
}

/// The parent key of a payload; only course runs have one.
pub fn parent_content_key(
    content_type: ContentType,
    metadata: &Map<String, Value>,
) -> Option<String> {
    if content_type != ContentType::CourseRun {
        return None;
    }
    metadata
        .get("key")
        .and_then(Value::as_str)
        .and_then(course_key_for_run)
        .or_else(|| metadata.get("course").and_then(Value::as_str).map(str::to_string))
}

/// Undo query-string decoding damage on a content key.
///
/// `+` in a course key arrives as a space after form decoding; it is restored
/// before any remaining percent escapes are decoded.
pub fn decode_content_key(raw: &str) -> String {
    let restored = raw.replace(' ', "+");
    percent_decode_str(&restored).decode_utf8_lossy().into_owned()
}
