//! Catalog data model.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::Error;
use crate::filter::ContentFilter;

/// Enrollment modes shown to learners when a catalog does not specify its own.
pub const DEFAULT_COURSE_MODES: &[&str] =
    &["verified", "professional", "no-id-professional", "audit"];

/// A deduplicated, reusable content filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogQuery {
    /// Stable identifier.
    pub uuid: Uuid,
    /// The filter applied against discovery.
    pub content_filter: ContentFilter,
    /// Canonical hash of `content_filter`; unique across all queries.
    pub content_filter_hash: String,
    /// Optional title.
    pub title: Option<String>,
}

impl CatalogQuery {
    /// Create a query, deriving its hash from the filter.
    pub fn new(uuid: Uuid, content_filter: ContentFilter, title: Option<String>) -> Self {
        let content_filter_hash = content_filter.hash();
        Self {
            uuid,
            content_filter,
            content_filter_hash,
            title,
        }
    }

    /// Replace filter and title, recomputing the hash.
    pub fn set_content_filter(&mut self, content_filter: ContentFilter, title: Option<String>) {
        self.content_filter_hash = content_filter.hash();
        self.content_filter = content_filter;
        self.title = title;
    }
}

impl fmt::Display for CatalogQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<CatalogQuery with content filter hash '{}'>",
            self.content_filter_hash
        )
    }
}

/// A catalog belonging to one enterprise customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnterpriseCatalog {
    pub uuid: Uuid,
    pub title: String,
    pub enterprise_uuid: Uuid,
    /// Shared query; cleared rather than cascaded when the query goes away.
    pub catalog_query: Option<Uuid>,
    /// Ordered enrollment modes.
    pub enabled_course_modes: Vec<String>,
    pub publish_audit_enrollment_urls: bool,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl EnterpriseCatalog {
    /// Create a catalog with default course modes.
    pub fn new(uuid: Uuid, title: impl Into<String>, enterprise_uuid: Uuid) -> Self {
        let now = Utc::now();
        Self {
            uuid,
            title: title.into(),
            enterprise_uuid,
            catalog_query: None,
            enabled_course_modes: DEFAULT_COURSE_MODES.iter().map(|m| m.to_string()).collect(),
            publish_audit_enrollment_urls: false,
            created: now,
            modified: now,
        }
    }

    /// Point the catalog at a query.
    pub fn with_catalog_query(mut self, query: Uuid) -> Self {
        self.catalog_query = Some(query);
        self
    }

    /// Set the enrollment modes.
    pub fn with_course_modes(mut self, modes: Vec<String>) -> Self {
        self.enabled_course_modes = modes;
        self
    }

    /// Set whether audit enrollment URLs are published.
    pub fn with_audit_enrollment_urls(mut self, publish: bool) -> Self {
        self.publish_audit_enrollment_urls = publish;
        self
    }
}

impl fmt::Display for EnterpriseCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<EnterpriseCatalog with UUID '{}' for EnterpriseCustomer '{}'>",
            self.uuid, self.enterprise_uuid
        )
    }
}

/// Kind of content a metadata row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Course,
    #[serde(alias = "course_run")]
    CourseRun,
    Program,
}

impl ContentType {
    /// Wire name of the content type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Course => "course",
            ContentType::CourseRun => "courserun",
            ContentType::Program => "program",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "course" => Ok(ContentType::Course),
            "courserun" | "course_run" => Ok(ContentType::CourseRun),
            "program" => Ok(ContentType::Program),
            other => Err(Error::InvalidData(format!("unknown content type '{other}'"))),
        }
    }
}

/// Stored metadata for one course, course run, or program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentMetadata {
    /// Unique content key.
    pub content_key: String,
    pub content_type: ContentType,
    pub parent_content_key: Option<String>,
    /// Raw discovery payload, field order preserved.
    pub json_metadata: Map<String, Value>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl fmt::Display for ContentMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<ContentMetadata for '{}'>", self.content_key)
    }
}

/// Read-only view of an enterprise customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnterpriseContext {
    pub uuid: Uuid,
    pub name: String,
    pub last_modified_date: Option<DateTime<Utc>>,
}

impl EnterpriseContext {
    /// Context with no modification time.
    pub fn new(uuid: Uuid, name: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
            last_modified_date: None,
        }
    }

    /// Set the customer's last modification time.
    pub fn with_last_modified(mut self, at: DateTime<Utc>) -> Self {
        self.last_modified_date = Some(at);
        self
    }
}

/// Source of enterprise customer details.
pub trait EnterpriseContextProvider {
    /// Look up an enterprise by identifier.
    fn enterprise_context(&self, enterprise_uuid: Uuid) -> Result<EnterpriseContext, Error>;
}

/// Provider backed by a fixed set of enterprises.
#[derive(Debug, Clone, Default)]
pub struct StaticEnterpriseContexts {
    contexts: HashMap<Uuid, EnterpriseContext>,
}

impl StaticEnterpriseContexts {
    /// Empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a context, builder style.
    pub fn with(mut self, context: EnterpriseContext) -> Self {
        self.insert(context);
        self
    }

    /// Add or replace a context.
    pub fn insert(&mut self, context: EnterpriseContext) {
        self.contexts.insert(context.uuid, context);
    }
}

impl FromIterator<EnterpriseContext> for StaticEnterpriseContexts {
    fn from_iter<I: IntoIterator<Item = EnterpriseContext>>(iter: I) -> Self {
        Self {
            contexts: iter.into_iter().map(|c| (c.uuid, c)).collect(),
        }
    }
}

impl EnterpriseContextProvider for StaticEnterpriseContexts {
    fn enterprise_context(&self, enterprise_uuid: Uuid) -> Result<EnterpriseContext, Error> {
        self.contexts
            .get(&enterprise_uuid)
            .cloned()
            .ok_or_else(|| Error::not_found("enterprise customer", enterprise_uuid))
    }
}
