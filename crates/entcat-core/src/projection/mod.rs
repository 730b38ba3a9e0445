//! Read-time projection of stored content metadata.
//!
//! The projector turns a stored [`ContentMetadata`] row into the mapping
//! served to clients for one catalog of one enterprise. It never writes.

mod course_run;
mod links;
mod utm;

pub use course_run::{is_any_course_run_active, is_course_run_active};
pub use links::CatalogLinks;
pub use utm::{enterprise_utm_context, slugify, update_query_parameters, UTM_MEDIUM};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{info_span, trace, Span};

use crate::config::CatalogConfig;
use crate::content_key::parent_content_key;
use crate::model::{ContentMetadata, ContentType, EnterpriseCatalog, EnterpriseContext};

/// Whether a serving layer may accept writes for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    ReadOnly,
    ReadWrite,
}

/// Projects content metadata into its client-facing form.
pub struct ContentMetadataProjector {
    lms_base_url: String,
    span: Span,
}

impl ContentMetadataProjector {
    /// Projected metadata is served read-only; write paths must reject it.
    pub const MUTABILITY: Mutability = Mutability::ReadOnly;

    /// Projector building links under `config.lms_base_url`.
    pub fn new(config: &CatalogConfig) -> Self {
        Self {
            lms_base_url: config.lms_base_url.clone(),
            span: info_span!("content_metadata_projector"),
        }
    }

    /// Record events under the given span instead of the default one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Project a row as of now.
    pub fn project(
        &self,
        record: &ContentMetadata,
        catalog: &EnterpriseCatalog,
        enterprise: &EnterpriseContext,
    ) -> Map<String, Value> {
        self.project_at(record, catalog, enterprise, Utc::now())
    }

    /// Project a row, judging course run activity at `now`.
    pub fn project_at(
        &self,
        record: &ContentMetadata,
        catalog: &EnterpriseCatalog,
        enterprise: &EnterpriseContext,
        now: DateTime<Utc>,
    ) -> Map<String, Value> {
        let _enter = self.span.enter();
        let links = CatalogLinks::new(&self.lms_base_url, catalog, enterprise);
        let mut json = record.json_metadata.clone();

        // Enrollment URLs depend on the catalog and the enterprise too, so all
        // three timestamps count towards freshness.
        let last_modified = [
            Some(record.modified),
            Some(catalog.modified),
            enterprise.last_modified_date,
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(record.modified);
        json.insert(
            "content_last_modified".to_string(),
            Value::String(last_modified.to_rfc3339()),
        );

        if let Some(marketing_url) = json
            .get("marketing_url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
        {
            let tagged =
                update_query_parameters(marketing_url, &enterprise_utm_context(&enterprise.name));
            json.insert("marketing_url".to_string(), Value::String(tagged));
        }

        let content_key = json.get("key").and_then(Value::as_str).map(str::to_string);
        let parent_key = parent_content_key(record.content_type, &json)
            .or_else(|| record.parent_content_key.clone());

        match record.content_type {
            ContentType::Course | ContentType::CourseRun => {
                let enrollment_url =
                    links.enrollment_url(content_key.as_deref(), parent_key.as_deref());
                json.insert("enrollment_url".to_string(), Value::String(enrollment_url));
                let activity_id = links
                    .xapi_activity_id(record.content_type, content_key.as_deref())
                    .map_or(Value::Null, Value::String);
                json.insert("xapi_activity_id".to_string(), activity_id);

                if record.content_type == ContentType::Course {
                    let active = json
                        .get("course_runs")
                        .and_then(Value::as_array)
                        .is_some_and(|runs| is_any_course_run_active(runs, now));
                    if let Some(Value::Array(runs)) = json.get_mut("course_runs") {
                        for run in runs.iter_mut().filter_map(Value::as_object_mut) {
                            let run_key =
                                run.get("key").and_then(Value::as_str).map(str::to_string);
                            let url =
                                links.enrollment_url(run_key.as_deref(), content_key.as_deref());
                            run.insert("enrollment_url".to_string(), Value::String(url));
                        }
                    }
                    json.insert("active".to_string(), Value::Bool(active));
                }
            }
            ContentType::Program => {
                // Program payloads carry no `key` to build a URL from.
                json.insert("enrollment_url".to_string(), Value::String(String::new()));
            }
        }

        trace!(
            content_key = %record.content_key,
            content_type = %record.content_type,
            "projected content metadata"
        );
        json
    }
}
