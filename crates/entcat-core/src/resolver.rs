//! Catalog query resolution.
//!
//! Reconciles a requested content filter (and optionally a query identifier
//! and title) with the persisted catalog queries, so that catalogs share one
//! query row per canonical filter.

use tracing::{debug, error, info_span, warn, Span};
use uuid::Uuid;

use crate::error::{ConstraintError, Error, ValidationError};
use crate::filter::ContentFilter;
use crate::model::CatalogQuery;
use crate::storage::CatalogStore;

/// Field name reported on a hash conflict.
pub const CATALOG_QUERY_FIELD: &str = "catalog_query";

/// Find-or-create / update reconciliation of catalog queries.
pub struct CatalogQueryResolver<'a> {
    store: &'a CatalogStore,
    span: Span,
}

impl<'a> CatalogQueryResolver<'a> {
    /// Resolver over `store`.
    pub fn new(store: &'a CatalogStore) -> Self {
        Self {
            store,
            span: info_span!("catalog_query_resolver"),
        }
    }

    /// Record events under the given span instead of the default one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Resolve a content filter to a catalog query.
    ///
    /// - With `uuid` naming an existing query, that query is overwritten with
    ///   the filter and title. If another query already owns the new hash a
    ///   [`ValidationError`] on `catalog_query` is returned and nothing is
    ///   written.
    /// - With `uuid` naming no query, the query owning the filter's hash is
    ///   returned, or one is created with that `uuid`.
    /// - Without `uuid`, the query owning the filter's hash is returned, or
    ///   one is created with a fresh identifier.
    ///
    /// Creation defaults never overwrite a matched row.
    pub fn resolve(
        &self,
        content_filter: &ContentFilter,
        uuid: Option<Uuid>,
        title: Option<&str>,
    ) -> Result<CatalogQuery, Error> {
        let _enter = self.span.enter();
        content_filter.validate()?;
        let title = title.map(str::to_string);

        let result = match uuid {
            Some(uuid) => match self.store.get_query(uuid)? {
                Some(existing) => self.overwrite(existing, content_filter, title.clone()),
                None => self.find_or_create(content_filter, uuid, title.clone()),
            },
            None => self.find_or_create(content_filter, Uuid::new_v4(), title.clone()),
        };

        result.map_err(|err| {
            if !err.is_client_error() {
                error!(
                    error = %err,
                    content_filter = %content_filter.canonical_json(),
                    catalog_query_uuid = ?uuid,
                    query_title = ?title,
                    "failed to resolve catalog query"
                );
            }
            err
        })
    }

    fn overwrite(
        &self,
        mut query: CatalogQuery,
        content_filter: &ContentFilter,
        title: Option<String>,
    ) -> Result<CatalogQuery, Error> {
        query.set_content_filter(content_filter.clone(), title);

        match self.store.update_query(&query) {
            Ok(()) => {
                debug!(
                    query_uuid = %query.uuid,
                    hash = %query.content_filter_hash,
                    "overwrote catalog query"
                );
                Ok(query)
            }
            Err(Error::Constraint(ConstraintError::UniqueViolation { fields, constraint, .. })) => {
                let column = fields.join(", ");
                warn!(
                    query_uuid = %query.uuid,
                    constraint = %constraint,
                    hash = %query.content_filter_hash,
                    "error occurred while saving catalog query"
                );
                let message = format!("{column} is not unique");
                Err(ValidationError::new(CATALOG_QUERY_FIELD, message).into())
            }
            Err(err) => Err(err),
        }
    }

    fn find_or_create(
        &self,
        content_filter: &ContentFilter,
        uuid: Uuid,
        title: Option<String>,
    ) -> Result<CatalogQuery, Error> {
        let defaults = CatalogQuery::new(uuid, content_filter.clone(), title);
        let (query, created) = self.store.get_or_create_query(defaults)?;
        debug!(query_uuid = %query.uuid, created, "resolved catalog query by hash");
        Ok(query)
    }
}
