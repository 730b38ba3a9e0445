//! Course run enrollability.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Availability value of a run that can no longer be taken.
const ARCHIVED: &str = "archived";

fn parse_date(run: &Value, field: &str) -> Option<DateTime<Utc>> {
    let raw = run.get(field)?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

/// Whether a course run is still enrollable at `now`.
///
/// A run is out once it is archived, or once its `end` or `enrollment_end`
/// date has passed. Missing or unparseable dates never end a run. Entries
/// that are not objects are never active.
pub fn is_course_run_active(run: &Value, now: DateTime<Utc>) -> bool {
    if !run.is_object() {
        return false;
    }

    let archived = run
        .get("availability")
        .and_then(Value::as_str)
        .is_some_and(|availability| availability.eq_ignore_ascii_case(ARCHIVED));
    if archived {
        return false;
    }

    ["end", "enrollment_end"]
        .iter()
        .filter_map(|field| parse_date(run, field))
        .all(|date| date > now)
}

/// True iff any run is active; false for no runs.
pub fn is_any_course_run_active(runs: &[Value], now: DateTime<Utc>) -> bool {
    runs.iter().any(|run| is_course_run_active(run, now))
}
