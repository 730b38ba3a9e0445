//! Refreshing catalog content from the discovery service.

use std::error::Error as StdError;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, info_span, warn, Span};
use uuid::Uuid;

use crate::content_key::{metadata_content_key, parent_content_key};
use crate::error::Error;
use crate::filter::ContentFilter;
use crate::model::{ContentMetadata, ContentType};
use crate::storage::{CatalogStore, UpsertOutcome};

/// Error type returned by discovery clients.
pub type DiscoveryError = Box<dyn StdError + Send + Sync>;

/// Source of fresh content metadata.
pub trait DiscoveryClient {
    /// Every metadata entry matching `content_filter`.
    fn fetch(
        &self,
        content_filter: &ContentFilter,
    ) -> Result<Vec<Map<String, Value>>, DiscoveryError>;
}

/// Discovery client answering every filter with the same entries.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscoveryClient {
    results: Vec<Map<String, Value>>,
}

impl StaticDiscoveryClient {
    /// Client serving `results` for every filter.
    pub fn new(results: Vec<Map<String, Value>>) -> Self {
        Self { results }
    }

    /// Build from a discovery response body, `{"results": [...]}`.
    pub fn from_response(body: &Value) -> Result<Self, Error> {
        let results = body
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::InvalidData("discovery response has no 'results' list".into()))?;

        let results = results
            .iter()
            .map(|entry| match entry {
                Value::Object(map) => Ok(map.clone()),
                other => Err(Error::InvalidData(format!(
                    "discovery result must be an object, got {other}"
                ))),
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { results })
    }
}

impl DiscoveryClient for StaticDiscoveryClient {
    fn fetch(
        &self,
        _content_filter: &ContentFilter,
    ) -> Result<Vec<Map<String, Value>>, DiscoveryError> {
        Ok(self.results.clone())
    }
}

/// Counts from one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries stored as new rows.
    pub created: usize,
    /// Entries whose identical payload was already stored.
    pub matched: usize,
    /// Entries without a usable key or content type.
    pub skipped: usize,
}

impl SyncReport {
    /// Number of entries seen.
    pub fn total(&self) -> usize {
        self.created + self.matched + self.skipped
    }
}

/// Pulls discovery metadata for a catalog and upserts it locally.
pub struct DiscoverySync<'a, C> {
    store: &'a CatalogStore,
    client: &'a C,
    span: Span,
}

impl<'a, C: DiscoveryClient> DiscoverySync<'a, C> {
    /// Sync writing into `store` from `client`.
    pub fn new(store: &'a CatalogStore, client: &'a C) -> Self {
        Self {
            store,
            client,
            span: info_span!("discovery_sync"),
        }
    }

    /// Record events under the given span instead of the default one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Refresh the content of one catalog.
    ///
    /// Each entry is matched on its full payload, not on its content key. An
    /// entry whose payload changed upstream is therefore inserted as a new row
    /// and rejected by the unique content key; that error ends the run.
    /// Discovery failures propagate as [`Error::Discovery`] without retry.
    pub fn sync(&self, catalog_uuid: Uuid) -> Result<SyncReport, Error> {
        let _enter = self.span.enter();
        let catalog = self
            .store
            .get_catalog(catalog_uuid)?
            .ok_or_else(|| Error::not_found("enterprise catalog", catalog_uuid))?;
        let query_uuid = catalog
            .catalog_query
            .ok_or(Error::MissingCatalogQuery(catalog_uuid))?;
        let query = self
            .store
            .get_query(query_uuid)?
            .ok_or_else(|| Error::not_found("catalog query", query_uuid))?;

        let entries = self.client.fetch(&query.content_filter).map_err(Error::Discovery)?;
        debug!(catalog_uuid = %catalog_uuid, entries = entries.len(), "fetched discovery metadata");

        let mut report = SyncReport::default();
        for entry in entries {
            let Some(row) = self.to_row(entry) else {
                report.skipped += 1;
                continue;
            };
            match self.store.upsert_metadata_by_payload(&row, query.uuid)? {
                UpsertOutcome::Created => report.created += 1,
                UpsertOutcome::Matched => report.matched += 1,
            }
        }

        info!(
            catalog_uuid = %catalog_uuid,
            query_uuid = %query.uuid,
            created = report.created,
            matched = report.matched,
            skipped = report.skipped,
            "synced catalog content"
        );
        Ok(report)
    }

    fn to_row(&self, entry: Map<String, Value>) -> Option<ContentMetadata> {
        let Some(content_key) = metadata_content_key(&entry) else {
            warn!("skipping discovery entry without a content key");
            return None;
        };
        let content_type = match entry
            .get("content_type")
            .and_then(Value::as_str)
            .map(str::parse::<ContentType>)
        {
            Some(Ok(content_type)) => content_type,
            _ => {
                warn!(
                    content_key = %content_key,
                    "skipping discovery entry without a known content type"
                );
                return None;
            }
        };

        let now = Utc::now();
        Some(ContentMetadata {
            parent_content_key: parent_content_key(content_type, &entry),
            content_key,
            content_type,
            json_metadata: entry,
            created: now,
            modified: now,
        })
    }
}
