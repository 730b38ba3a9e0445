//! Append-only audit history.
//!
//! Every mutation of a catalog query or enterprise catalog writes one entry in
//! the same transaction as the mutation itself.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree,
};
use sled::Tree;
use uuid::Uuid;

use crate::error::Error;

/// Tree name for audit entries.
pub const AUDIT_TREE: &str = "audit:history";

/// Audited entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEntity {
    CatalogQuery,
    EnterpriseCatalog,
}

/// Mutation operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOp {
    /// Insert new row.
    Insert,
    /// Update existing row.
    Update,
    /// Delete row.
    Delete,
}

impl fmt::Display for MutationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationOp::Insert => write!(f, "insert"),
            MutationOp::Update => write!(f, "update"),
            MutationOp::Delete => write!(f, "delete"),
        }
    }
}

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic sequence number.
    pub seq: u64,
    pub entity: AuditEntity,
    pub entity_id: Uuid,
    pub operation: MutationOp,
    /// Row state after the mutation (before it, for deletes).
    pub snapshot: Value,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub(crate) fn new(
        seq: u64,
        entity: AuditEntity,
        entity_id: Uuid,
        operation: MutationOp,
        snapshot: Value,
    ) -> Self {
        Self {
            seq,
            entity,
            entity_id,
            operation,
            snapshot,
            recorded_at: Utc::now(),
        }
    }

    /// Key format: `[entity_id (16 bytes)][seq (8 bytes, big-endian)]`
    fn key(&self) -> [u8; 24] {
        let mut key = [0u8; 24];
        key[..16].copy_from_slice(self.entity_id.as_bytes());
        key[16..].copy_from_slice(&self.seq.to_be_bytes());
        key
    }
}

/// Audit history backed by a sled tree.
pub struct AuditLog {
    tree: Tree,
}

impl AuditLog {
    /// Open or create the audit tree.
    pub fn open(db: &sled::Db) -> Result<Self, Error> {
        let tree = db.open_tree(AUDIT_TREE)?;
        Ok(Self { tree })
    }

    pub(crate) fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Append an entry inside a transaction.
    pub(crate) fn append(
        tx: &TransactionalTree,
        entry: &AuditEntry,
    ) -> ConflictableTransactionResult<(), Error> {
        let bytes = serde_json::to_vec(entry)
            .map_err(|e| ConflictableTransactionError::Abort(Error::Serialization(e.to_string())))?;
        tx.insert(&entry.key()[..], bytes)?;
        Ok(())
    }

    /// All entries recorded for one entity, oldest first.
    pub fn history(&self, entity_id: Uuid) -> Result<Vec<AuditEntry>, Error> {
        self.tree
            .scan_prefix(entity_id.as_bytes())
            .map(|result| {
                let (_, bytes) = result?;
                serde_json::from_slice(&bytes).map_err(|e| Error::Deserialization(e.to_string()))
            })
            .collect()
    }

    /// Total number of recorded entries.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns true if no entries have been recorded.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sled::transaction::TransactionError;

    #[test]
    fn test_history_is_ordered_and_scoped() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let log = AuditLog::open(&db).unwrap();
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();

        for (seq, entity_id, op) in [
            (3, id, MutationOp::Update),
            (1, id, MutationOp::Insert),
            (2, other, MutationOp::Insert),
        ] {
            let entry = AuditEntry::new(seq, AuditEntity::CatalogQuery, entity_id, op, json!({}));
            let result: Result<(), TransactionError<Error>> =
                log.tree().transaction(|tx| AuditLog::append(tx, &entry));
            result.unwrap();
        }

        let history = log.history(id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].operation, MutationOp::Insert);
        assert_eq!(history[1].operation, MutationOp::Update);
        assert_eq!(log.len(), 3);
    }
}
