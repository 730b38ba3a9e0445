//! Catalog store implementation.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree,
};
use sled::{Db, Transactional, Tree};
use tracing::debug;
use uuid::Uuid;

use super::audit::{AuditEntity, AuditEntry, AuditLog, MutationOp};
use super::unique_index::UniqueIndex;
use super::StorageConfig;
use crate::error::{ConstraintError, Error};
use crate::model::{CatalogQuery, ContentMetadata, EnterpriseCatalog};

/// Tree name for catalog queries, keyed by query uuid.
const QUERY_TREE: &str = "catalog_query";

/// Tree name for enterprise catalogs, keyed by catalog uuid.
const CATALOG_TREE: &str = "enterprise_catalog";

/// Tree name for content metadata, keyed by content key.
const METADATA_TREE: &str = "content_metadata";

/// Tree name for the content metadata / catalog query association.
const ASSOCIATION_TREE: &str = "content_metadata_catalog_queries";

/// Unique constraint on `CatalogQuery.content_filter_hash`.
pub const QUERY_HASH_CONSTRAINT: &str = "catalog_query_content_filter_hash";

/// Unique constraint on `CatalogQuery.uuid`.
pub const QUERY_PKEY_CONSTRAINT: &str = "catalog_query_pkey";

/// Unique constraint on `(EnterpriseCatalog.enterprise_uuid, EnterpriseCatalog.catalog_query)`.
pub const CATALOG_ENTERPRISE_QUERY_CONSTRAINT: &str =
    "enterprise_catalog_enterprise_uuid_catalog_query";

/// Unique constraint on `EnterpriseCatalog.uuid`.
pub const CATALOG_PKEY_CONSTRAINT: &str = "enterprise_catalog_pkey";

/// Unique constraint on `ContentMetadata.content_key`.
pub const METADATA_KEY_CONSTRAINT: &str = "content_metadata_content_key";

/// Match key used when upserting metadata: the digest of the full payload.
const METADATA_PAYLOAD_CONSTRAINT: &str = "content_metadata_json_metadata";

/// Result of a metadata upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row had an identical payload; a new row was inserted.
    Created,
    /// A row with an identical payload existed and was refreshed.
    Matched,
}

/// The catalog store wrapping sled.
///
/// Every multi-row invariant (hash uniqueness, one query per enterprise,
/// unique content keys) is enforced by claims in the unique index made inside
/// the same transaction as the row write.
pub struct CatalogStore {
    /// The underlying sled database.
    db: Db,
    queries: Tree,
    catalogs: Tree,
    metadata: Tree,
    /// `[query uuid (16 bytes)][content key]` -> empty
    associations: Tree,
    unique: UniqueIndex,
    audit: AuditLog,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, Error> {
    serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
}

fn snapshot<T: Serialize>(value: &T) -> Result<Value, Error> {
    serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))
}

fn abort<T>(err: Error) -> ConflictableTransactionResult<T, Error> {
    Err(ConflictableTransactionError::Abort(err))
}

fn decode_tx<T: DeserializeOwned>(bytes: &[u8]) -> ConflictableTransactionResult<T, Error> {
    decode(bytes).map_err(ConflictableTransactionError::Abort)
}

fn pkey_violation(constraint: &str, field: &str, value: impl ToString) -> Error {
    Error::Constraint(ConstraintError::UniqueViolation {
        constraint: constraint.to_string(),
        fields: vec![field.to_string()],
        value: value.to_string(),
    })
}

fn association_key(query: Uuid, content_key: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + content_key.len());
    key.extend_from_slice(query.as_bytes());
    key.extend_from_slice(content_key.as_bytes());
    key
}

/// Digest of a metadata payload, used as its upsert match key.
pub fn payload_digest(json_metadata: &Map<String, Value>) -> Result<String, Error> {
    let bytes = encode(json_metadata)?;
    Ok(hex::encode(blake3::hash(&bytes).as_bytes()))
}

impl CatalogStore {
    /// Open or create a store with the given configuration.
    pub fn open(config: &StorageConfig) -> Result<Self, Error> {
        let db = config.to_sled_config().open()?;
        Self::from_db(db)
    }

    /// Open a throwaway in-memory store.
    pub fn temporary() -> Result<Self, Error> {
        Self::open(&StorageConfig::temporary())
    }

    fn from_db(db: Db) -> Result<Self, Error> {
        Ok(Self {
            queries: db.open_tree(QUERY_TREE)?,
            catalogs: db.open_tree(CATALOG_TREE)?,
            metadata: db.open_tree(METADATA_TREE)?,
            associations: db.open_tree(ASSOCIATION_TREE)?,
            unique: UniqueIndex::open(&db)?,
            audit: AuditLog::open(&db)?,
            db,
        })
    }

    /// Check if the database was recovered from a previous crash.
    pub fn was_recovered(&self) -> bool {
        self.db.was_recovered()
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }

    fn next_seq(&self) -> Result<u64, Error> {
        Ok(self.db.generate_id()?)
    }

    // ========== Catalog queries ==========

    /// Find a query by identifier.
    pub fn get_query(&self, uuid: Uuid) -> Result<Option<CatalogQuery>, Error> {
        self.queries
            .get(uuid.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Find a query by its content filter hash.
    pub fn find_query_by_hash(&self, hash: &str) -> Result<Option<CatalogQuery>, Error> {
        match self.unique.lookup(QUERY_HASH_CONSTRAINT, &[hash])? {
            Some(owner) => {
                let uuid = Uuid::from_slice(&owner).map_err(|_| Error::InvalidData(format!(
                    "corrupt owner for content filter hash {hash}"
                )))?;
                self.get_query(uuid)
            }
            None => Ok(None),
        }
    }

    /// Insert a new query.
    ///
    /// Fails with a unique violation if its identifier or hash is taken.
    pub fn create_query(&self, query: &CatalogQuery) -> Result<(), Error> {
        let bytes = encode(query)?;
        let entry = AuditEntry::new(
            self.next_seq()?,
            AuditEntity::CatalogQuery,
            query.uuid,
            MutationOp::Insert,
            snapshot(query)?,
        );

        (&self.queries, self.unique.tree(), self.audit.tree())
            .transaction(|(queries, unique, audit)| {
                if queries.get(query.uuid.as_bytes())?.is_some() {
                    return abort(pkey_violation(QUERY_PKEY_CONSTRAINT, "uuid", query.uuid));
                }
                UniqueIndex::claim(
                    unique,
                    QUERY_HASH_CONSTRAINT,
                    &["content_filter_hash"],
                    &[&query.content_filter_hash],
                    query.uuid.as_bytes(),
                )?;
                queries.insert(&query.uuid.as_bytes()[..], bytes.clone())?;
                AuditLog::append(audit, &entry)?;
                Ok(())
            })?;

        debug!(
            query_uuid = %query.uuid,
            hash = %query.content_filter_hash,
            "created catalog query"
        );
        Ok(())
    }

    /// Persist changes to an existing query.
    ///
    /// A changed hash is re-claimed; if another query owns it the update is
    /// rejected and nothing is written.
    pub fn update_query(&self, query: &CatalogQuery) -> Result<(), Error> {
        let bytes = encode(query)?;
        let entry = AuditEntry::new(
            self.next_seq()?,
            AuditEntity::CatalogQuery,
            query.uuid,
            MutationOp::Update,
            snapshot(query)?,
        );

        (&self.queries, self.unique.tree(), self.audit.tree())
            .transaction(|(queries, unique, audit)| {
                let Some(existing) = queries.get(query.uuid.as_bytes())? else {
                    return abort(Error::not_found("catalog query", query.uuid));
                };
                let existing: CatalogQuery = decode_tx(&existing)?;

                if existing.content_filter_hash != query.content_filter_hash {
                    UniqueIndex::claim(
                        unique,
                        QUERY_HASH_CONSTRAINT,
                        &["content_filter_hash"],
                        &[&query.content_filter_hash],
                        query.uuid.as_bytes(),
                    )?;
                    UniqueIndex::release(
                        unique,
                        QUERY_HASH_CONSTRAINT,
                        &[&existing.content_filter_hash],
                    )?;
                }
                queries.insert(&query.uuid.as_bytes()[..], bytes.clone())?;
                AuditLog::append(audit, &entry)?;
                Ok(())
            })?;

        debug!(
            query_uuid = %query.uuid,
            hash = %query.content_filter_hash,
            "updated catalog query"
        );
        Ok(())
    }

    /// Return the query owning `defaults.content_filter_hash`, creating it from
    /// `defaults` if none exists.
    ///
    /// The defaults only apply on insert. The boolean is true when a row was
    /// created. Find and create are separate steps: a concurrent creator of the
    /// same hash makes this call fail with a unique violation.
    pub fn get_or_create_query(
        &self,
        defaults: CatalogQuery,
    ) -> Result<(CatalogQuery, bool), Error> {
        if let Some(existing) = self.find_query_by_hash(&defaults.content_filter_hash)? {
            return Ok((existing, false));
        }
        self.create_query(&defaults)?;
        Ok((defaults, true))
    }

    /// Delete a query. Catalogs referencing it keep existing with no query.
    pub fn delete_query(&self, uuid: Uuid) -> Result<CatalogQuery, Error> {
        let query = self
            .get_query(uuid)?
            .ok_or_else(|| Error::not_found("catalog query", uuid))?;
        let referencing = self.catalogs_for_query(uuid)?;

        let mut entries = vec![AuditEntry::new(
            self.next_seq()?,
            AuditEntity::CatalogQuery,
            uuid,
            MutationOp::Delete,
            snapshot(&query)?,
        )];
        let mut detached = Vec::with_capacity(referencing.len());
        for mut catalog in referencing {
            catalog.catalog_query = None;
            catalog.modified = Utc::now();
            entries.push(AuditEntry::new(
                self.next_seq()?,
                AuditEntity::EnterpriseCatalog,
                catalog.uuid,
                MutationOp::Update,
                snapshot(&catalog)?,
            ));
            detached.push((catalog.uuid, catalog.enterprise_uuid, encode(&catalog)?));
        }

        (&self.queries, &self.catalogs, self.unique.tree(), self.audit.tree())
            .transaction(|(queries, catalogs, unique, audit)| {
                queries.remove(&uuid.as_bytes()[..])?;
                UniqueIndex::release(unique, QUERY_HASH_CONSTRAINT, &[&query.content_filter_hash])?;
                let query_id = uuid.to_string();
                for (catalog_uuid, enterprise_uuid, bytes) in &detached {
                    UniqueIndex::release(
                        unique,
                        CATALOG_ENTERPRISE_QUERY_CONSTRAINT,
                        &[&enterprise_uuid.to_string(), &query_id],
                    )?;
                    catalogs.insert(&catalog_uuid.as_bytes()[..], bytes.clone())?;
                }
                for entry in &entries {
                    AuditLog::append(audit, entry)?;
                }
                Ok(())
            })?;

        debug!(query_uuid = %uuid, detached = detached.len(), "deleted catalog query");
        Ok(query)
    }

    /// List all queries.
    pub fn list_queries(&self) -> Result<Vec<CatalogQuery>, Error> {
        self.queries
            .iter()
            .map(|result| {
                let (_, bytes) = result?;
                decode(&bytes)
            })
            .collect()
    }

    // ========== Enterprise catalogs ==========

    /// Find a catalog by identifier.
    pub fn get_catalog(&self, uuid: Uuid) -> Result<Option<EnterpriseCatalog>, Error> {
        self.catalogs
            .get(uuid.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn claim_enterprise_query(
        unique: &TransactionalTree,
        catalog: &EnterpriseCatalog,
    ) -> ConflictableTransactionResult<(), Error> {
        if let Some(query) = catalog.catalog_query {
            UniqueIndex::claim(
                unique,
                CATALOG_ENTERPRISE_QUERY_CONSTRAINT,
                &["enterprise_uuid", "catalog_query"],
                &[&catalog.enterprise_uuid.to_string(), &query.to_string()],
                catalog.uuid.as_bytes(),
            )?;
        }
        Ok(())
    }

    fn release_enterprise_query(
        unique: &TransactionalTree,
        catalog: &EnterpriseCatalog,
    ) -> ConflictableTransactionResult<(), Error> {
        if let Some(query) = catalog.catalog_query {
            UniqueIndex::release(
                unique,
                CATALOG_ENTERPRISE_QUERY_CONSTRAINT,
                &[&catalog.enterprise_uuid.to_string(), &query.to_string()],
            )?;
        }
        Ok(())
    }

    /// Insert a new catalog.
    ///
    /// Fails with a unique violation if the enterprise already has a catalog
    /// for the same query.
    pub fn create_catalog(&self, catalog: &EnterpriseCatalog) -> Result<(), Error> {
        let bytes = encode(catalog)?;
        let entry = AuditEntry::new(
            self.next_seq()?,
            AuditEntity::EnterpriseCatalog,
            catalog.uuid,
            MutationOp::Insert,
            snapshot(catalog)?,
        );

        (&self.catalogs, &self.queries, self.unique.tree(), self.audit.tree())
            .transaction(|(catalogs, queries, unique, audit)| {
                if catalogs.get(catalog.uuid.as_bytes())?.is_some() {
                    return abort(pkey_violation(CATALOG_PKEY_CONSTRAINT, "uuid", catalog.uuid));
                }
                if let Some(query) = catalog.catalog_query {
                    if queries.get(query.as_bytes())?.is_none() {
                        return abort(Error::not_found("catalog query", query));
                    }
                }
                Self::claim_enterprise_query(unique, catalog)?;
                catalogs.insert(&catalog.uuid.as_bytes()[..], bytes.clone())?;
                AuditLog::append(audit, &entry)?;
                Ok(())
            })?;

        debug!(
            catalog_uuid = %catalog.uuid,
            enterprise_uuid = %catalog.enterprise_uuid,
            "created enterprise catalog"
        );
        Ok(())
    }

    /// Persist changes to an existing catalog, stamping its modified time.
    pub fn update_catalog(&self, catalog: &EnterpriseCatalog) -> Result<EnterpriseCatalog, Error> {
        let mut updated = catalog.clone();
        updated.modified = Utc::now();
        let bytes = encode(&updated)?;
        let entry = AuditEntry::new(
            self.next_seq()?,
            AuditEntity::EnterpriseCatalog,
            updated.uuid,
            MutationOp::Update,
            snapshot(&updated)?,
        );

        (&self.catalogs, &self.queries, self.unique.tree(), self.audit.tree())
            .transaction(|(catalogs, queries, unique, audit)| {
                let Some(existing) = catalogs.get(updated.uuid.as_bytes())? else {
                    return abort(Error::not_found("enterprise catalog", updated.uuid));
                };
                let existing: EnterpriseCatalog = decode_tx(&existing)?;
                if let Some(query) = updated.catalog_query {
                    if queries.get(query.as_bytes())?.is_none() {
                        return abort(Error::not_found("catalog query", query));
                    }
                }

                if (existing.enterprise_uuid, existing.catalog_query)
                    != (updated.enterprise_uuid, updated.catalog_query)
                {
                    Self::claim_enterprise_query(unique, &updated)?;
                    Self::release_enterprise_query(unique, &existing)?;
                }
                catalogs.insert(&updated.uuid.as_bytes()[..], bytes.clone())?;
                AuditLog::append(audit, &entry)?;
                Ok(())
            })?;

        debug!(catalog_uuid = %updated.uuid, "updated enterprise catalog");
        Ok(updated)
    }

    /// Delete a catalog. Its query row is left in place.
    pub fn delete_catalog(&self, uuid: Uuid) -> Result<EnterpriseCatalog, Error> {
        let catalog = self
            .get_catalog(uuid)?
            .ok_or_else(|| Error::not_found("enterprise catalog", uuid))?;
        let entry = AuditEntry::new(
            self.next_seq()?,
            AuditEntity::EnterpriseCatalog,
            uuid,
            MutationOp::Delete,
            snapshot(&catalog)?,
        );

        (&self.catalogs, self.unique.tree(), self.audit.tree())
            .transaction(|(catalogs, unique, audit)| {
                let Some(current) = catalogs.remove(&uuid.as_bytes()[..])? else {
                    return abort(Error::not_found("enterprise catalog", uuid));
                };
                let current: EnterpriseCatalog = decode_tx(&current)?;
                Self::release_enterprise_query(unique, &current)?;
                AuditLog::append(audit, &entry)?;
                Ok(())
            })?;

        debug!(catalog_uuid = %uuid, "deleted enterprise catalog");
        Ok(catalog)
    }

    /// List all catalogs.
    pub fn list_catalogs(&self) -> Result<Vec<EnterpriseCatalog>, Error> {
        self.catalogs
            .iter()
            .map(|result| {
                let (_, bytes) = result?;
                decode(&bytes)
            })
            .collect()
    }

    /// Catalogs referencing the given query.
    pub fn catalogs_for_query(&self, query: Uuid) -> Result<Vec<EnterpriseCatalog>, Error> {
        Ok(self
            .list_catalogs()?
            .into_iter()
            .filter(|catalog| catalog.catalog_query == Some(query))
            .collect())
    }

    // ========== Content metadata ==========

    /// Find metadata by content key.
    pub fn get_metadata(&self, content_key: &str) -> Result<Option<ContentMetadata>, Error> {
        self.metadata
            .get(content_key.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Upsert a metadata row matched on its full payload, and associate it
    /// with `query`.
    ///
    /// A row whose payload is byte-for-byte identical is refreshed from
    /// `incoming` (type, parent, modified time). Otherwise a new row is
    /// inserted, which fails with a unique violation when another row already
    /// holds the content key: a changed payload never updates a row in place.
    pub fn upsert_metadata_by_payload(
        &self,
        incoming: &ContentMetadata,
        query: Uuid,
    ) -> Result<UpsertOutcome, Error> {
        let digest = payload_digest(&incoming.json_metadata)?;
        let association = association_key(query, &incoming.content_key);

        let outcome = (&self.metadata, self.unique.tree(), &self.associations).transaction(
            |(metadata, unique, associations)| {
                let owner =
                    UniqueIndex::lookup_tx(unique, METADATA_PAYLOAD_CONSTRAINT, &[&digest])?;

                let outcome = match owner {
                    Some(owner_key) => {
                        let Some(bytes) = metadata.get(&owner_key)? else {
                            return abort(Error::InvalidData(format!(
                                "payload index points at missing content metadata {}",
                                String::from_utf8_lossy(&owner_key)
                            )));
                        };
                        let mut row: ContentMetadata = decode_tx(&bytes)?;
                        row.content_type = incoming.content_type;
                        row.parent_content_key = incoming.parent_content_key.clone();
                        row.modified = incoming.modified;
                        let encoded = encode(&row).map_err(ConflictableTransactionError::Abort)?;
                        metadata.insert(owner_key, encoded)?;
                        UpsertOutcome::Matched
                    }
                    None => {
                        if metadata.get(incoming.content_key.as_bytes())?.is_some() {
                            return abort(pkey_violation(
                                METADATA_KEY_CONSTRAINT,
                                "content_key",
                                &incoming.content_key,
                            ));
                        }
                        UniqueIndex::claim(
                            unique,
                            METADATA_PAYLOAD_CONSTRAINT,
                            &["json_metadata"],
                            &[&digest],
                            incoming.content_key.as_bytes(),
                        )?;
                        let encoded =
                            encode(incoming).map_err(ConflictableTransactionError::Abort)?;
                        metadata.insert(incoming.content_key.as_bytes(), encoded)?;
                        UpsertOutcome::Created
                    }
                };

                associations.insert(association.clone(), Vec::<u8>::new())?;
                Ok(outcome)
            },
        )?;

        debug!(content_key = %incoming.content_key, ?outcome, "upserted content metadata");
        Ok(outcome)
    }

    /// Content keys associated with a query.
    pub fn content_keys_for_query(&self, query: Uuid) -> Result<Vec<String>, Error> {
        self.associations
            .scan_prefix(query.as_bytes())
            .map(|result| {
                let (key, _) = result?;
                String::from_utf8(key[16..].to_vec())
                    .map_err(|e| Error::InvalidData(format!("content key is not utf-8: {e}")))
            })
            .collect()
    }

    /// Metadata rows associated with a query.
    pub fn metadata_for_query(&self, query: Uuid) -> Result<Vec<ContentMetadata>, Error> {
        let mut rows = Vec::new();
        for content_key in self.content_keys_for_query(query)? {
            if let Some(row) = self.get_metadata(&content_key)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    // ========== Audit ==========

    /// Audit history of one query or catalog, oldest first.
    pub fn history(&self, entity_id: Uuid) -> Result<Vec<AuditEntry>, Error> {
        self.audit.history(entity_id)
    }
}
