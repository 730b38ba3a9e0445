//! Integration tests for the catalog lifecycle over an on-disk store.

use entcat_core::storage::QUERY_HASH_CONSTRAINT;
use entcat_core::{
    CatalogConfig, CatalogDefinition, CatalogService, CatalogUpdate, ContainsQuery, ContentFilter,
    EnterpriseContext, Error, MutationOp, StaticDiscoveryClient, StaticEnterpriseContexts,
    StorageConfig,
};
use serde_json::{json, Value};
use uuid::Uuid;

struct TestContext {
    service: CatalogService,
    storage_dir: tempfile::TempDir,
}

impl TestContext {
    fn new() -> Self {
        let storage_dir = tempfile::tempdir().unwrap();
        let service = Self::open(&storage_dir);
        Self { service, storage_dir }
    }

    fn open(dir: &tempfile::TempDir) -> CatalogService {
        let config = CatalogConfig::new(StorageConfig::new(dir.path()))
            .with_lms_base_url("https://lms.example.com");
        CatalogService::open(config).unwrap()
    }

    /// Close and reopen the store from disk.
    fn reopen(self) -> Self {
        self.service.flush().unwrap();
        let TestContext { service, storage_dir } = self;
        drop(service);
        let service = Self::open(&storage_dir);
        Self { service, storage_dir }
    }
}

fn filter(partner: &str) -> ContentFilter {
    ContentFilter::new()
        .with("content_type", json!(["course", "courserun"]))
        .with("partner", partner)
}

fn discovery(results: Value) -> StaticDiscoveryClient {
    StaticDiscoveryClient::from_response(&json!({ "results": results })).unwrap()
}

#[test]
fn test_catalog_survives_reopen() {
    let ctx = TestContext::new();
    let enterprise = EnterpriseContext::new(Uuid::new_v4(), "Acme Learning");
    let catalog = ctx
        .service
        .create_catalog(
            CatalogDefinition::new("Acme", enterprise.uuid, filter("edx")).with_query_title("Edx"),
        )
        .unwrap();
    ctx.service
        .sync_catalog(
            catalog.uuid,
            &discovery(json!([
                {
                    "key": "edX+DemoX",
                    "content_type": "course",
                    "course_runs": [{"key": "course-v1:edX+DemoX+2024"}]
                },
                {"key": "course-v1:edX+DemoX+2024", "content_type": "courserun"}
            ])),
        )
        .unwrap();

    let ctx = ctx.reopen();
    let reloaded = ctx.service.get_catalog(catalog.uuid).unwrap();
    assert_eq!(reloaded, catalog);

    let query = ctx
        .service
        .store()
        .find_query_by_hash(&filter("edx").hash())
        .unwrap()
        .unwrap();
    assert_eq!(Some(query.uuid), catalog.catalog_query);

    let enterprises = StaticEnterpriseContexts::new().with(enterprise.clone());
    let projected = ctx
        .service
        .project_catalog_content(catalog.uuid, &enterprises)
        .unwrap();
    assert_eq!(projected.len(), 2);
    let course = projected.iter().find(|m| m["key"] == json!("edX+DemoX")).unwrap();
    assert_eq!(course["active"], json!(true));
    let run_url = course["course_runs"][0]["enrollment_url"].as_str().unwrap();
    assert!(run_url.starts_with(&format!(
        "https://lms.example.com/enterprise/{}/course/edX+DemoX/enroll/",
        enterprise.uuid
    )));
    assert!(run_url.contains("utm_source=acme-learning"));
}

#[test]
fn test_explicit_query_uuid_claims_and_conflicts() {
    let ctx = TestContext::new();
    let wanted = Uuid::new_v4();
    let first = ctx
        .service
        .create_catalog(
            CatalogDefinition::new("One", Uuid::new_v4(), filter("edx"))
                .with_catalog_query_uuid(wanted),
        )
        .unwrap();
    assert_eq!(first.catalog_query, Some(wanted));

    let second = ctx
        .service
        .create_catalog(CatalogDefinition::new("Two", Uuid::new_v4(), filter("mitx")))
        .unwrap();

    // Pointing the second catalog's query at the first filter collides on the hash.
    let err = ctx
        .service
        .update_catalog(
            second.uuid,
            CatalogUpdate {
                content_filter: Some(filter("edx")),
                ..Default::default()
            },
        )
        .unwrap_err();
    match err {
        Error::Validation(v) => {
            assert_eq!(v.field, "catalog_query");
            assert_eq!(v.message, "content_filter_hash is not unique");
        }
        other => panic!("Expected validation error, got {other:?}"),
    }

    let untouched = ctx.service.store().get_query(second.catalog_query.unwrap()).unwrap().unwrap();
    assert_eq!(untouched.content_filter, filter("mitx"));
    assert!(ctx
        .service
        .store()
        .find_query_by_hash(&filter("edx").hash())
        .unwrap()
        .is_some_and(|q| q.uuid == wanted));
}

#[test]
fn test_raw_duplicate_hash_is_constraint_error() {
    let ctx = TestContext::new();
    let a = ctx.service.resolve_query(&filter("edx"), None, None).unwrap();

    let duplicate = entcat_core::CatalogQuery::new(Uuid::new_v4(), filter("edx"), None);
    let err = ctx.service.store().create_query(&duplicate).unwrap_err();
    let Some(entcat_core::ConstraintError::UniqueViolation { constraint, .. }) =
        err.unique_violation()
    else {
        panic!("Expected unique violation, got {err:?}");
    };
    assert_eq!(constraint, QUERY_HASH_CONSTRAINT);
    assert_eq!(ctx.service.store().list_queries().unwrap(), vec![a]);
}

#[test]
fn test_contains_after_sync() {
    let ctx = TestContext::new();
    let catalog = ctx
        .service
        .create_catalog(CatalogDefinition::new("One", Uuid::new_v4(), filter("edx")))
        .unwrap();
    ctx.service
        .sync_catalog(
            catalog.uuid,
            &discovery(json!([
                {"key": "cr-1", "content_type": "courserun"},
                {"uuid": "prog-1", "content_type": "program"}
            ])),
        )
        .unwrap();

    let both = ContainsQuery::new(vec!["cr-1".into(), "cr-2".into()], Vec::new()).unwrap();
    assert!(!ctx.service.contains_content_items(catalog.uuid, &both).unwrap());

    let one = ContainsQuery::new(vec!["cr-1".into()], vec!["prog-1".into()]).unwrap();
    assert!(ctx.service.contains_content_items(catalog.uuid, &one).unwrap());
}

#[test]
fn test_history_records_every_mutation() {
    let ctx = TestContext::new();
    let catalog = ctx
        .service
        .create_catalog(CatalogDefinition::new("One", Uuid::new_v4(), filter("edx")))
        .unwrap();
    ctx.service
        .update_catalog(
            catalog.uuid,
            CatalogUpdate {
                title: Some("Renamed".into()),
                ..Default::default()
            },
        )
        .unwrap();

    let ctx = ctx.reopen();
    let history = ctx.service.history(catalog.uuid).unwrap();
    let ops: Vec<_> = history.iter().map(|e| e.operation).collect();
    assert_eq!(ops, vec![MutationOp::Insert, MutationOp::Update]);
    assert!(history[0].seq < history[1].seq);
    assert_eq!(history[1].snapshot["title"], json!("Renamed"));

    // Re-resolving the unchanged query during the update wrote a query entry too.
    let query_history = ctx.service.history(catalog.catalog_query.unwrap()).unwrap();
    assert_eq!(query_history.first().map(|e| e.operation), Some(MutationOp::Insert));
}
