//! Collections
//!
//! A collection is one named B+Tree. Its root page is stored as the value of
//! `name` in the database's collections tree, and rewritten there whenever
//! the root moves.

use std::ops::Bound;

use crate::btree::{tree, Item};
use crate::error::{AtlasError, Result};
use crate::storage::PageNum;
use crate::tx::Transaction;

/// A named key/value tree, borrowed from a transaction
pub struct Collection<'tx, 'db> {
    tx: &'tx mut Transaction<'db>,
    name: Vec<u8>,
    root: PageNum,
}

impl<'tx, 'db> Collection<'tx, 'db> {
    pub(crate) fn new(tx: &'tx mut Transaction<'db>, name: Vec<u8>, root: PageNum) -> Self {
        Self { tx, name, root }
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// Current root page of this collection's tree
    pub fn root(&self) -> PageNum {
        self.root
    }

    /// Insert `key`, replacing any existing value
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.tx.ensure_writable()?;
        self.tx.validate_item(key, value)?;

        let result = tree::put(&mut *self.tx, self.root, key, value);
        let root = self.tx.track(result)?;
        self.set_root(root)
    }

    /// Value stored under `key`
    pub fn find(&self, key: &[u8]) -> Result<Vec<u8>> {
        tree::find(&*self.tx, self.root, key)?.ok_or(AtlasError::KeyNotFound)
    }

    /// Delete `key`; `KeyNotFound` if it is absent
    pub fn remove(&mut self, key: &[u8]) -> Result<()> {
        self.tx.ensure_writable()?;

        let result = tree::remove(&mut *self.tx, self.root, key);
        let root = self.tx.track(result)?;
        self.set_root(root)
    }

    /// Every item, in key order
    pub fn items(&self) -> Result<Vec<Item>> {
        self.scan(Bound::Unbounded, Bound::Unbounded)
    }

    /// Items with keys between `start` and `end`, in key order
    pub fn scan(&self, start: Bound<&[u8]>, end: Bound<&[u8]>) -> Result<Vec<Item>> {
        tree::scan(&*self.tx, self.root, start, end)
    }

    /// Number of items
    pub fn len(&self) -> Result<usize> {
        tree::len(&*self.tx, self.root)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Levels in the tree; 1 while the root is still a leaf
    pub fn height(&self) -> Result<usize> {
        tree::height(&*self.tx, self.root)
    }

    fn set_root(&mut self, root: PageNum) -> Result<()> {
        if root != self.root {
            self.root = root;
            self.tx.set_collection_root(&self.name, root)?;
        }
        Ok(())
    }
}
