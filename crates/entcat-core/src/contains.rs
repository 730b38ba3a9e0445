//! Catalog content coverage checks.

use std::collections::HashSet;

use tracing::{debug, info_span, Span};

use crate::content_key::{course_key_for_run, decode_content_key};
use crate::error::Error;
use crate::model::EnterpriseCatalog;
use crate::storage::CatalogStore;

/// Request parameter carrying course run keys.
pub const COURSE_RUN_IDS_PARAM: &str = "course_run_ids";

/// Request parameter carrying program identifiers.
pub const PROGRAM_UUIDS_PARAM: &str = "program_uuids";

/// Identifiers a client asks a catalog about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainsQuery {
    course_run_ids: Vec<String>,
    program_uuids: Vec<String>,
}

impl ContainsQuery {
    /// Build a request from raw query-string values.
    ///
    /// Course run keys are decoded with [`decode_content_key`]. At least one
    /// of the two lists must be non-empty.
    pub fn new(course_run_ids: Vec<String>, program_uuids: Vec<String>) -> Result<Self, Error> {
        if course_run_ids.is_empty() && program_uuids.is_empty() {
            return Err(Error::MissingParameters(vec![
                COURSE_RUN_IDS_PARAM,
                PROGRAM_UUIDS_PARAM,
            ]));
        }
        Ok(Self {
            course_run_ids: course_run_ids.iter().map(|id| decode_content_key(id)).collect(),
            program_uuids,
        })
    }

    /// Course run keys, already decoded.
    pub fn course_run_ids(&self) -> &[String] {
        &self.course_run_ids
    }

    /// Program identifiers as given.
    pub fn program_uuids(&self) -> &[String] {
        &self.program_uuids
    }

    /// All requested identifiers, course runs first.
    pub fn content_keys(&self) -> Vec<String> {
        self.course_run_ids
            .iter()
            .chain(&self.program_uuids)
            .cloned()
            .collect()
    }
}

/// Answers whether a catalog covers a set of content identifiers.
pub struct CatalogContentChecker<'a> {
    store: &'a CatalogStore,
    span: Span,
}

impl<'a> CatalogContentChecker<'a> {
    /// Checker reading content from `store`.
    pub fn new(store: &'a CatalogStore) -> Self {
        Self {
            store,
            span: info_span!("catalog_content_checker"),
        }
    }

    /// Record events under the given span instead of the default one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// True iff every key in `content_keys` is covered by the catalog.
    ///
    /// A key is covered when it is one of the catalog's content keys, the
    /// parent of one of them, or a course run whose course is in the catalog.
    /// A catalog without a query covers nothing.
    pub fn contains(
        &self,
        catalog: &EnterpriseCatalog,
        content_keys: &[String],
    ) -> Result<bool, Error> {
        let _enter = self.span.enter();
        let Some(query) = catalog.catalog_query else {
            debug!(catalog_uuid = %catalog.uuid, "catalog has no query, nothing is covered");
            return Ok(false);
        };

        let rows = self.store.metadata_for_query(query)?;
        let mut covered: HashSet<String> = HashSet::with_capacity(rows.len() * 2);
        for row in rows {
            if let Some(parent) = row.parent_content_key {
                covered.insert(parent);
            }
            covered.insert(row.content_key);
        }

        let missing = content_keys
            .iter()
            .filter(|key| !is_covered(&covered, key))
            .count();
        debug!(
            catalog_uuid = %catalog.uuid,
            requested = content_keys.len(),
            missing,
            "checked catalog coverage"
        );
        Ok(missing == 0)
    }
}

fn is_covered(covered: &HashSet<String>, key: &str) -> bool {
    covered.contains(key)
        || course_key_for_run(key).is_some_and(|course| covered.contains(&course))
}
