//! Secondary index for enforcing unique constraints.
//!
//! The UniqueIndex maintains a separate sled tree that maps unique values to
//! the key of the row owning them. Claims are made inside sled transactions so
//! the check and the write commit together with the row itself.

use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree,
};
use sled::Tree;

use crate::error::{ConstraintError, Error};

/// Tree name for the unique constraint index.
pub const UNIQUE_INDEX_TREE: &str = "index:unique";

/// Secondary index for enforcing unique constraints.
///
/// Key format: `constraint\0value1\0value2...` -> owner row key
pub struct UniqueIndex {
    tree: Tree,
}

impl UniqueIndex {
    /// Open or create the unique index from a sled database.
    pub fn open(db: &sled::Db) -> Result<Self, Error> {
        let tree = db.open_tree(UNIQUE_INDEX_TREE)?;
        Ok(Self { tree })
    }

    /// The backing tree, for use in multi-tree transactions.
    pub(crate) fn tree(&self) -> &Tree {
        &self.tree
    }

    fn build_key(constraint: &str, values: &[&str]) -> Vec<u8> {
        let mut key = Vec::new();
        key.extend_from_slice(constraint.as_bytes());
        for value in values {
            key.push(0);
            key.extend_from_slice(value.as_bytes());
        }
        key
    }

    /// Look up the owner of a unique value.
    pub fn lookup(&self, constraint: &str, values: &[&str]) -> Result<Option<Vec<u8>>, Error> {
        let key = Self::build_key(constraint, values);
        Ok(self.tree.get(key)?.map(|owner| owner.to_vec()))
    }

    /// Look up the owner of a unique value inside a transaction.
    pub(crate) fn lookup_tx(
        tx: &TransactionalTree,
        constraint: &str,
        values: &[&str],
    ) -> ConflictableTransactionResult<Option<Vec<u8>>, Error> {
        let key = Self::build_key(constraint, values);
        Ok(tx.get(key)?.map(|owner| owner.to_vec()))
    }

    /// Claim a unique value for `owner`.
    ///
    /// Aborts the transaction with a unique violation if another owner holds it.
    /// Re-claiming a value already held by `owner` is a no-op.
    pub(crate) fn claim(
        tx: &TransactionalTree,
        constraint: &str,
        fields: &[&str],
        values: &[&str],
        owner: &[u8],
    ) -> ConflictableTransactionResult<(), Error> {
        let key = Self::build_key(constraint, values);

        if let Some(existing) = tx.get(&key)? {
            if existing.as_ref() != owner {
                return Err(ConflictableTransactionError::Abort(Error::Constraint(
                    ConstraintError::UniqueViolation {
                        constraint: constraint.to_string(),
                        fields: fields.iter().map(|f| f.to_string()).collect(),
                        value: values.join(", "),
                    },
                )));
            }
            return Ok(());
        }

        tx.insert(key, owner)?;
        Ok(())
    }

    /// Release a unique value.
    pub(crate) fn release(
        tx: &TransactionalTree,
        constraint: &str,
        values: &[&str],
    ) -> ConflictableTransactionResult<(), Error> {
        let key = Self::build_key(constraint, values);
        tx.remove(key)?;
        Ok(())
    }

    /// Get the number of entries in the index.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}
