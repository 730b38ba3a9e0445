//! Enterprise catalog lifecycle.
//!
//! [`CatalogService`] owns the store and ties the components together the way
//! a request handler would: catalogs are created and edited through the query
//! resolver, content is refreshed by discovery sync, and reads go through the
//! projector and the coverage checker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info, info_span, Span};
use uuid::Uuid;

use crate::config::CatalogConfig;
use crate::contains::{CatalogContentChecker, ContainsQuery};
use crate::error::{Error, ValidationError};
use crate::filter::ContentFilter;
use crate::model::{CatalogQuery, EnterpriseCatalog, EnterpriseContextProvider};
use crate::projection::ContentMetadataProjector;
use crate::resolver::CatalogQueryResolver;
use crate::storage::{AuditEntry, CatalogStore};
use crate::sync::{DiscoveryClient, DiscoverySync, SyncReport};

/// Request to create an enterprise catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDefinition {
    /// Identifier to create the catalog under; generated when absent.
    #[serde(default)]
    pub uuid: Option<Uuid>,
    pub title: String,
    pub enterprise_uuid: Uuid,
    pub content_filter: ContentFilter,
    #[serde(default)]
    pub catalog_query_uuid: Option<Uuid>,
    #[serde(default)]
    pub query_title: Option<String>,
    /// Falls back to the configured default modes.
    #[serde(default)]
    pub enabled_course_modes: Option<Vec<String>>,
    #[serde(default)]
    pub publish_audit_enrollment_urls: bool,
}

impl CatalogDefinition {
    /// Definition with no explicit identifiers and default course modes.
    pub fn new(
        title: impl Into<String>,
        enterprise_uuid: Uuid,
        content_filter: ContentFilter,
    ) -> Self {
        Self {
            uuid: None,
            title: title.into(),
            enterprise_uuid,
            content_filter,
            catalog_query_uuid: None,
            query_title: None,
            enabled_course_modes: None,
            publish_audit_enrollment_urls: false,
        }
    }

    /// Create the catalog under this identifier.
    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = Some(uuid);
        self
    }

    /// Overwrite or create the query with this identifier.
    pub fn with_catalog_query_uuid(mut self, uuid: Uuid) -> Self {
        self.catalog_query_uuid = Some(uuid);
        self
    }

    /// Title for the resolved query.
    pub fn with_query_title(mut self, title: impl Into<String>) -> Self {
        self.query_title = Some(title.into());
        self
    }

    /// Enrollment modes instead of the configured defaults.
    pub fn with_course_modes(mut self, modes: Vec<String>) -> Self {
        self.enabled_course_modes = Some(modes);
        self
    }

    /// Publish audit enrollment URLs.
    pub fn with_audit_enrollment_urls(mut self, publish: bool) -> Self {
        self.publish_audit_enrollment_urls = publish;
        self
    }
}

/// Partial edit of an enterprise catalog. Absent fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content_filter: Option<ContentFilter>,
    #[serde(default)]
    pub catalog_query_uuid: Option<Uuid>,
    #[serde(default)]
    pub query_title: Option<String>,
    #[serde(default)]
    pub enabled_course_modes: Option<Vec<String>>,
    #[serde(default)]
    pub publish_audit_enrollment_urls: Option<bool>,
}

/// Enterprise catalog operations over one store.
pub struct CatalogService {
    store: CatalogStore,
    config: CatalogConfig,
    span: Span,
}

impl CatalogService {
    /// Open the store named by `config`.
    pub fn open(config: CatalogConfig) -> Result<Self, Error> {
        let store = CatalogStore::open(&config.storage)?;
        Ok(Self::with_store(store, config))
    }

    /// Wrap an already opened store.
    pub fn with_store(store: CatalogStore, config: CatalogConfig) -> Self {
        Self {
            store,
            config,
            span: info_span!("catalog_service"),
        }
    }

    /// Record events under the given span instead of the default one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    /// Configuration the service was opened with.
    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    fn resolver(&self) -> CatalogQueryResolver<'_> {
        CatalogQueryResolver::new(&self.store)
            .with_span(info_span!(parent: &self.span, "catalog_query_resolver"))
    }

    /// Resolve a content filter to a shared catalog query.
    pub fn resolve_query(
        &self,
        content_filter: &ContentFilter,
        uuid: Option<Uuid>,
        title: Option<&str>,
    ) -> Result<CatalogQuery, Error> {
        self.resolver().resolve(content_filter, uuid, title)
    }

    /// Create a catalog, resolving its content filter first.
    ///
    /// The query is resolved (and possibly created) before the catalog insert.
    /// If the enterprise already has a catalog for that query the violation is
    /// logged and returned unchanged.
    pub fn create_catalog(
        &self,
        definition: CatalogDefinition,
    ) -> Result<EnterpriseCatalog, Error> {
        let _enter = self.span.enter();
        let query = self.resolver().resolve(
            &definition.content_filter,
            definition.catalog_query_uuid,
            definition.query_title.as_deref(),
        )?;

        let catalog = EnterpriseCatalog::new(
            definition.uuid.unwrap_or_else(Uuid::new_v4),
            definition.title.clone(),
            definition.enterprise_uuid,
        )
        .with_catalog_query(query.uuid)
        .with_course_modes(
            definition
                .enabled_course_modes
                .clone()
                .unwrap_or_else(|| self.config.default_course_modes.clone()),
        )
        .with_audit_enrollment_urls(definition.publish_audit_enrollment_urls);

        if let Err(err) = self.store.create_catalog(&catalog) {
            if err.unique_violation().is_some() {
                error!(
                    error = %err,
                    content_filter = %definition.content_filter.canonical_json(),
                    catalog_query_uuid = %query.uuid,
                    definition = ?definition,
                    "failed to create enterprise catalog"
                );
            }
            return Err(err);
        }

        info!(
            catalog_uuid = %catalog.uuid,
            enterprise_uuid = %catalog.enterprise_uuid,
            query_uuid = %query.uuid,
            "created enterprise catalog"
        );
        Ok(catalog)
    }

    /// Edit a catalog.
    ///
    /// Filter, query title and query identifier default to those of the
    /// catalog's current query; the query is then re-resolved and the catalog
    /// saved against the result.
    pub fn update_catalog(
        &self,
        uuid: Uuid,
        update: CatalogUpdate,
    ) -> Result<EnterpriseCatalog, Error> {
        let _enter = self.span.enter();
        let mut catalog = self.get_catalog(uuid)?;
        let current = match catalog.catalog_query {
            Some(query) => self.store.get_query(query)?,
            None => None,
        };

        let content_filter = update
            .content_filter
            .clone()
            .or_else(|| current.as_ref().map(|q| q.content_filter.clone()))
            .ok_or_else(|| ValidationError::new("content_filter", "This field is required."))?;
        let query_title = update
            .query_title
            .clone()
            .or_else(|| current.as_ref().and_then(|q| q.title.clone()));
        let query_uuid = update
            .catalog_query_uuid
            .or_else(|| current.as_ref().map(|q| q.uuid));

        let query = self
            .resolver()
            .resolve(&content_filter, query_uuid, query_title.as_deref())?;

        catalog.catalog_query = Some(query.uuid);
        if let Some(title) = update.title.clone() {
            catalog.title = title;
        }
        if let Some(modes) = update.enabled_course_modes.clone() {
            catalog.enabled_course_modes = modes;
        }
        if let Some(publish) = update.publish_audit_enrollment_urls {
            catalog.publish_audit_enrollment_urls = publish;
        }

        match self.store.update_catalog(&catalog) {
            Ok(updated) => {
                info!(catalog_uuid = %uuid, query_uuid = %query.uuid, "updated enterprise catalog");
                Ok(updated)
            }
            Err(err) => {
                if err.unique_violation().is_some() {
                    error!(
                        error = %err,
                        content_filter = %content_filter.canonical_json(),
                        catalog_query_uuid = %query.uuid,
                        update = ?update,
                        "failed to update enterprise catalog"
                    );
                }
                Err(err)
            }
        }
    }

    /// Delete a catalog; its query is kept for other catalogs.
    pub fn delete_catalog(&self, uuid: Uuid) -> Result<EnterpriseCatalog, Error> {
        let _enter = self.span.enter();
        let catalog = self.store.delete_catalog(uuid)?;
        info!(catalog_uuid = %uuid, "deleted enterprise catalog");
        Ok(catalog)
    }

    /// Delete a catalog query. Catalogs that used it are kept with no query.
    pub fn delete_query(&self, uuid: Uuid) -> Result<CatalogQuery, Error> {
        let _enter = self.span.enter();
        let query = self.store.delete_query(uuid)?;
        info!(query_uuid = %uuid, "deleted catalog query");
        Ok(query)
    }

    /// Load a catalog, failing with [`Error::NotFound`] when it is absent.
    pub fn get_catalog(&self, uuid: Uuid) -> Result<EnterpriseCatalog, Error> {
        self.store
            .get_catalog(uuid)?
            .ok_or_else(|| Error::not_found("enterprise catalog", uuid))
    }

    /// Every catalog in the store.
    pub fn list_catalogs(&self) -> Result<Vec<EnterpriseCatalog>, Error> {
        self.store.list_catalogs()
    }

    /// Latest modification time over the catalog's content.
    pub fn content_last_modified(&self, uuid: Uuid) -> Result<Option<DateTime<Utc>>, Error> {
        let catalog = self.get_catalog(uuid)?;
        let Some(query) = catalog.catalog_query else {
            return Ok(None);
        };
        Ok(self
            .store
            .metadata_for_query(query)?
            .into_iter()
            .map(|row| row.modified)
            .max())
    }

    /// Project every content item of a catalog for its enterprise.
    pub fn project_catalog_content(
        &self,
        uuid: Uuid,
        enterprises: &dyn EnterpriseContextProvider,
    ) -> Result<Vec<Map<String, Value>>, Error> {
        let catalog = self.get_catalog(uuid)?;
        let Some(query) = catalog.catalog_query else {
            return Ok(Vec::new());
        };
        let enterprise = enterprises.enterprise_context(catalog.enterprise_uuid)?;
        let projector = ContentMetadataProjector::new(&self.config)
            .with_span(info_span!(parent: &self.span, "content_metadata_projector"));

        Ok(self
            .store
            .metadata_for_query(query)?
            .iter()
            .map(|row| projector.project(row, &catalog, &enterprise))
            .collect())
    }

    /// Whether the catalog covers every identifier in `request`.
    pub fn contains_content_items(
        &self,
        uuid: Uuid,
        request: &ContainsQuery,
    ) -> Result<bool, Error> {
        let catalog = self.get_catalog(uuid)?;
        CatalogContentChecker::new(&self.store)
            .with_span(info_span!(parent: &self.span, "catalog_content_checker"))
            .contains(&catalog, &request.content_keys())
    }

    /// Refresh a catalog's content from discovery.
    pub fn sync_catalog<C: DiscoveryClient>(
        &self,
        uuid: Uuid,
        client: &C,
    ) -> Result<SyncReport, Error> {
        DiscoverySync::new(&self.store, client)
            .with_span(info_span!(parent: &self.span, "discovery_sync"))
            .sync(uuid)
    }

    /// Audit history of a catalog or query.
    pub fn history(&self, entity_id: Uuid) -> Result<Vec<AuditEntry>, Error> {
        self.store.history(entity_id)
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.store.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConstraintError;
    use crate::model::{EnterpriseContext, StaticEnterpriseContexts};
    use crate::storage::{MutationOp, CATALOG_ENTERPRISE_QUERY_CONSTRAINT};
    use crate::sync::StaticDiscoveryClient;
    use serde_json::json;

    fn service() -> CatalogService {
        let config = CatalogConfig::temporary().with_lms_base_url("https://lms.example.com");
        CatalogService::open(config).unwrap()
    }

    fn assert_enterprise_query_violation(err: &Error) {
        let Some(ConstraintError::UniqueViolation { constraint, .. }) = err.unique_violation()
        else {
            panic!("Expected unique violation, got {err:?}");
        };
        assert_eq!(constraint, CATALOG_ENTERPRISE_QUERY_CONSTRAINT);
    }

    fn filter(partner: &str) -> ContentFilter {
        ContentFilter::new()
            .with("content_type", json!(["course"]))
            .with("partner", partner)
    }

    fn discovery(value: Value) -> StaticDiscoveryClient {
        StaticDiscoveryClient::from_response(&json!({ "results": value })).unwrap()
    }

    #[test]
    fn test_catalogs_share_query() {
        let service = service();
        let a = service
            .create_catalog(CatalogDefinition::new("A", Uuid::new_v4(), filter("edx")))
            .unwrap();
        let b = service
            .create_catalog(CatalogDefinition::new("B", Uuid::new_v4(), filter("edx")))
            .unwrap();

        assert_eq!(a.catalog_query, b.catalog_query);
        assert_eq!(service.store().list_queries().unwrap().len(), 1);
        assert_eq!(a.enabled_course_modes, service.config().default_course_modes);
    }

    #[test]
    fn test_same_enterprise_same_filter_rejected() {
        let service = service();
        let enterprise = Uuid::new_v4();
        service
            .create_catalog(CatalogDefinition::new("A", enterprise, filter("edx")))
            .unwrap();

        let err = service
            .create_catalog(CatalogDefinition::new("B", enterprise, filter("edx")))
            .unwrap_err();
        assert_enterprise_query_violation(&err);
        assert_eq!(service.list_catalogs().unwrap().len(), 1);
    }

    #[test]
    fn test_update_onto_taken_enterprise_query_rejected() {
        let service = service();
        let enterprise = Uuid::new_v4();
        let first = service
            .create_catalog(CatalogDefinition::new("A", enterprise, filter("edx")))
            .unwrap();
        let second = service
            .create_catalog(CatalogDefinition::new("B", enterprise, filter("mitx")))
            .unwrap();

        let err = service
            .update_catalog(
                second.uuid,
                CatalogUpdate {
                    content_filter: Some(filter("edx")),
                    catalog_query_uuid: Some(Uuid::new_v4()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_enterprise_query_violation(&err);

        let stored = service.get_catalog(second.uuid).unwrap();
        assert_eq!(stored.catalog_query, second.catalog_query);
        assert_ne!(stored.catalog_query, first.catalog_query);

        // Both pairs are still claimed.
        for partner in ["edx", "mitx"] {
            let err = service
                .create_catalog(CatalogDefinition::new("C", enterprise, filter(partner)))
                .unwrap_err();
            assert_enterprise_query_violation(&err);
        }

        let renamed = service
            .update_catalog(
                second.uuid,
                CatalogUpdate {
                    title: Some("Renamed".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(renamed.catalog_query, second.catalog_query);
        assert_eq!(service.list_catalogs().unwrap().len(), 2);
    }

    #[test]
    fn test_update_keeps_query_when_filter_absent() {
        let service = service();
        let catalog = service
            .create_catalog(
                CatalogDefinition::new("A", Uuid::new_v4(), filter("edx")).with_query_title("Edx"),
            )
            .unwrap();

        let updated = service
            .update_catalog(
                catalog.uuid,
                CatalogUpdate {
                    title: Some("Renamed".into()),
                    publish_audit_enrollment_urls: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.title, "Renamed");
        assert!(updated.publish_audit_enrollment_urls);
        assert_eq!(updated.catalog_query, catalog.catalog_query);
        let query = service
            .store()
            .get_query(catalog.catalog_query.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(query.title.as_deref(), Some("Edx"));
        assert!(updated.modified >= catalog.modified);
    }

    #[test]
    fn test_update_with_new_filter_edits_shared_query() {
        let service = service();
        let catalog = service
            .create_catalog(CatalogDefinition::new("A", Uuid::new_v4(), filter("edx")))
            .unwrap();

        let updated = service
            .update_catalog(
                catalog.uuid,
                CatalogUpdate {
                    content_filter: Some(filter("mitx")),
                    ..Default::default()
                },
            )
            .unwrap();

        // The current query uuid is carried over, so the row is edited in place.
        assert_eq!(updated.catalog_query, catalog.catalog_query);
        let query = service
            .store()
            .get_query(catalog.catalog_query.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(query.content_filter, filter("mitx"));
    }

    #[test]
    fn test_update_without_any_filter_is_rejected() {
        let service = service();
        let catalog = EnterpriseCatalog::new(Uuid::new_v4(), "Bare", Uuid::new_v4());
        service.store().create_catalog(&catalog).unwrap();

        let err = service
            .update_catalog(catalog.uuid, CatalogUpdate::default())
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ref v) if v.field == "content_filter"));
    }

    #[test]
    fn test_delete_catalog_keeps_query() {
        let service = service();
        let catalog = service
            .create_catalog(CatalogDefinition::new("A", Uuid::new_v4(), filter("edx")))
            .unwrap();

        service.delete_catalog(catalog.uuid).unwrap();
        assert!(matches!(service.get_catalog(catalog.uuid), Err(Error::NotFound { .. })));
        assert!(service.store().get_query(catalog.catalog_query.unwrap()).unwrap().is_some());

        let ops: Vec<_> = service
            .history(catalog.uuid)
            .unwrap()
            .into_iter()
            .map(|e| e.operation)
            .collect();
        assert_eq!(ops, vec![MutationOp::Insert, MutationOp::Delete]);
    }

    #[test]
    fn test_delete_query_detaches_catalog() {
        let service = service();
        let catalog = service
            .create_catalog(CatalogDefinition::new("A", Uuid::new_v4(), filter("edx")))
            .unwrap();
        let query = catalog.catalog_query.unwrap();

        service.delete_query(query).unwrap();
        assert_eq!(service.get_catalog(catalog.uuid).unwrap().catalog_query, None);
        assert!(matches!(service.delete_query(query), Err(Error::NotFound { .. })));

        // The freed hash and pair can be claimed again.
        let again = service
            .create_catalog(CatalogDefinition::new("B", catalog.enterprise_uuid, filter("edx")))
            .unwrap();
        assert_ne!(again.catalog_query, Some(query));
    }

    #[test]
    fn test_sync_project_and_contains() {
        let service = service();
        let enterprise = EnterpriseContext::new(Uuid::new_v4(), "Acme");
        let catalog = service
            .create_catalog(CatalogDefinition::new("A", enterprise.uuid, filter("edx")))
            .unwrap();
        assert_eq!(service.content_last_modified(catalog.uuid).unwrap(), None);

        let client = discovery(json!([
            {
                "key": "edX+DemoX",
                "content_type": "course",
                "marketing_url": "https://example.com/demo"
            },
            {"key": "course-v1:edX+DemoX+2024", "content_type": "courserun"}
        ]));
        let report = service.sync_catalog(catalog.uuid, &client).unwrap();
        assert_eq!(report.created, 2);
        assert!(service.content_last_modified(catalog.uuid).unwrap().is_some());

        let enterprises = StaticEnterpriseContexts::new().with(enterprise);
        let projected = service.project_catalog_content(catalog.uuid, &enterprises).unwrap();
        assert_eq!(projected.len(), 2);
        let course = projected.iter().find(|m| m["key"] == json!("edX+DemoX")).unwrap();
        assert_eq!(
            course["marketing_url"],
            json!("https://example.com/demo?utm_medium=enterprise&utm_source=acme")
        );

        let request =
            ContainsQuery::new(vec!["course-v1:edX DemoX 2024".into()], Vec::new()).unwrap();
        assert!(service.contains_content_items(catalog.uuid, &request).unwrap());
        let request = ContainsQuery::new(Vec::new(), vec!["unknown-program".into()]).unwrap();
        assert!(!service.contains_content_items(catalog.uuid, &request).unwrap());
    }

    #[test]
    fn test_project_unknown_enterprise() {
        let service = service();
        let catalog = service
            .create_catalog(CatalogDefinition::new("A", Uuid::new_v4(), filter("edx")))
            .unwrap();

        let err = service
            .project_catalog_content(catalog.uuid, &StaticEnterpriseContexts::new())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "enterprise customer", .. }));
    }
}
