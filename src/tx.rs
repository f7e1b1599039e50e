//! Transactions
//!
//! A read transaction looks at one committed snapshot. A write transaction
//! holds the database's write permit and builds the next committed state.
//!
//! ## Write path
//! Nodes are copy-on-write: the first time a transaction modifies a node of
//! the committed tree, the node is written to a newly allocated page and the
//! old page is remembered in `freed`. Pages the transaction allocated itself
//! are rewritten in place. The freelist moves to a fresh page on every
//! commit too. Nothing committed is ever overwritten, so rollback only has to
//! drop the private meta/freelist copies, and a crash before the meta write
//! leaves the previous commit readable.

use std::collections::HashSet;

use parking_lot::MutexGuard;

use crate::btree::{tree, FillBounds, Node, NodeStore};
use crate::collection::Collection;
use crate::db::Database;
use crate::error::{AtlasError, Result};
use crate::storage::{Freelist, Meta, PageNum};

/// Read or write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    Read,
    Write,
}

/// A unit of work against a [`Database`]
///
/// `commit` and `rollback` consume the transaction. Dropping an open
/// transaction rolls it back.
pub struct Transaction<'db> {
    db: &'db Database,
    kind: TxKind,

    /// Snapshot (read) or working copy (write) of the meta record
    meta: Meta,

    /// Working copy of the freelist; `None` for readers
    freelist: Option<Freelist>,

    /// Pages allocated by this transaction
    owned: HashSet<PageNum>,

    /// Committed pages this transaction stopped using
    freed: Vec<PageNum>,

    /// Set by the first I/O or corruption error
    failed: bool,

    finished: bool,

    /// Write permit; released when the transaction is dropped
    _writer: Option<MutexGuard<'db, ()>>,
}

impl<'db> Transaction<'db> {
    pub(crate) fn read(db: &'db Database) -> Self {
        let meta = db.begin_read();
        Self {
            db,
            kind: TxKind::Read,
            meta,
            freelist: None,
            owned: HashSet::new(),
            freed: Vec::new(),
            failed: false,
            finished: false,
            _writer: None,
        }
    }

    pub(crate) fn write(db: &'db Database) -> Self {
        let (guard, meta, freelist) = db.begin_write();
        tracing::trace!("Write transaction {} started", meta.txid() + 1);
        Self {
            db,
            kind: TxKind::Write,
            meta,
            freelist: Some(freelist),
            owned: HashSet::new(),
            freed: Vec::new(),
            failed: false,
            finished: false,
            _writer: Some(guard),
        }
    }

    pub fn kind(&self) -> TxKind {
        self.kind
    }

    pub fn is_writable(&self) -> bool {
        self.kind == TxKind::Write
    }

    /// Snapshot id for readers; the id this transaction commits as for writers
    pub fn id(&self) -> u64 {
        match self.kind {
            TxKind::Read => self.meta.txid(),
            TxKind::Write => self.meta.txid() + 1,
        }
    }

    // =========================================================================
    // Collections
    // =========================================================================

    /// Create an empty collection; fails if `name` is taken
    pub fn create_collection(&mut self, name: &[u8]) -> Result<Collection<'_, 'db>> {
        self.ensure_writable()?;
        self.validate_item(name, &[0u8; 8])?;

        if self.lookup_collection(name)?.is_some() {
            return Err(AtlasError::CollectionExists);
        }

        let created = tree::create(self);
        let root = self.track(created)?;
        self.set_collection_root(name, root)?;

        tracing::debug!(
            "Created collection {:?} at page {}",
            String::from_utf8_lossy(name),
            root
        );
        Ok(Collection::new(self, name.to_vec(), root))
    }

    /// Open an existing collection
    pub fn get_collection(&mut self, name: &[u8]) -> Result<Collection<'_, 'db>> {
        let root = self
            .lookup_collection(name)?
            .ok_or(AtlasError::CollectionNotFound)?;
        Ok(Collection::new(self, name.to_vec(), root))
    }

    /// Drop a collection and release all of its pages
    pub fn delete_collection(&mut self, name: &[u8]) -> Result<()> {
        self.ensure_writable()?;

        let root = self
            .lookup_collection(name)?
            .ok_or(AtlasError::CollectionNotFound)?;

        let freed = tree::free_all(self, root);
        self.track(freed)?;

        let collections = self.meta.root();
        let removed = tree::remove(self, collections, name);
        let new_root = self.track(removed)?;
        self.meta.set_root(new_root);

        tracing::debug!("Deleted collection {:?}", String::from_utf8_lossy(name));
        Ok(())
    }

    /// Names of all collections, in key order
    pub fn collections(&self) -> Result<Vec<Vec<u8>>> {
        let items = tree::scan(
            self,
            self.meta.root(),
            std::ops::Bound::Unbounded,
            std::ops::Bound::Unbounded,
        )?;
        Ok(items.into_iter().map(|item| item.key).collect())
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Make the transaction's changes durable
    ///
    /// Writes the freelist to a new page, then the meta page. A no-op for
    /// readers.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;

        if self.kind == TxKind::Read {
            self.db.end_read(self.meta.txid());
            return Ok(());
        }

        if self.failed {
            tracing::warn!(
                "Write transaction {} failed earlier; rolled back instead of committing",
                self.id()
            );
            return Err(AtlasError::TxFailed);
        }

        let txid = self.id();
        let mut freelist = self.freelist.take().ok_or_else(|| {
            AtlasError::InvariantViolation("write transaction without freelist".to_string())
        })?;
        // The committed freelist page stays intact until the new meta lands
        let mut meta = self.meta;
        let freelist_page = freelist.allocate();
        self.freed.push(meta.freelist_page());
        meta.set_freelist_page(freelist_page);
        meta.set_txid(txid);

        for page in self.freed.drain(..) {
            freelist.free_pending(txid, page);
        }

        self.db.commit(meta, freelist).map_err(|e| {
            tracing::warn!("Commit of transaction {} failed: {}", txid, e);
            e
        })?;

        tracing::debug!(
            "Committed transaction {}: root={}, {} pages allocated",
            txid,
            meta.root(),
            self.owned.len()
        );
        Ok(())
    }

    /// Discard the transaction; the database keeps its last committed state
    pub fn rollback(mut self) {
        self.finish_rollback();
    }

    fn finish_rollback(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        match self.kind {
            TxKind::Read => self.db.end_read(self.meta.txid()),
            TxKind::Write => {
                // Pages written so far are unreachable from the committed meta
                tracing::debug!(
                    "Rolled back transaction {} ({} pages discarded)",
                    self.id(),
                    self.owned.len()
                );
            }
        }
    }

    // =========================================================================
    // Crate Internals
    // =========================================================================

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.kind == TxKind::Read {
            return Err(AtlasError::WriteInsideReadTx);
        }
        if self.failed {
            return Err(AtlasError::TxFailed);
        }
        Ok(())
    }

    /// Reject keys the tree cannot hold
    pub(crate) fn validate_item(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(AtlasError::EmptyKey);
        }

        let size = key.len() + value.len();
        let max = self.db.options().max_item_size();
        if size > max {
            return Err(AtlasError::ItemTooLarge { size, max });
        }
        Ok(())
    }

    /// Mark the transaction failed on errors that leave it untrustworthy
    pub(crate) fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal() && !self.failed {
                tracing::warn!("Transaction {} failed: {}", self.id(), e);
                self.failed = true;
            }
        }
        result
    }

    /// Point collection `name` at a new root page
    pub(crate) fn set_collection_root(&mut self, name: &[u8], root: PageNum) -> Result<()> {
        let collections = self.meta.root();
        let result = tree::put(self, collections, name, &root.to_le_bytes());
        let new_root = self.track(result)?;
        self.meta.set_root(new_root);
        Ok(())
    }

    fn lookup_collection(&mut self, name: &[u8]) -> Result<Option<PageNum>> {
        let collections = self.meta.root();
        let found = tree::find(&*self, collections, name);
        match self.track(found)? {
            Some(value) => decode_root(&value).map(Some),
            None => Ok(None),
        }
    }

    fn allocate_page(&mut self) -> Result<PageNum> {
        let freelist = self
            .freelist
            .as_mut()
            .ok_or(AtlasError::WriteInsideReadTx)?;
        let page = freelist.allocate();
        self.owned.insert(page);
        Ok(page)
    }
}

impl NodeStore for Transaction<'_> {
    fn fill(&self) -> FillBounds {
        self.db.options().fill_bounds()
    }

    fn get_node(&self, page_num: PageNum) -> Result<Node> {
        let page = self.db.pager().read_page(page_num)?;
        Node::deserialize(page_num, &page.data)
    }

    fn write_node(&mut self, node: &mut Node) -> Result<()> {
        self.ensure_writable()?;

        if !self.owned.contains(&node.page_num) {
            let previous = node.page_num;
            node.page_num = self.allocate_page()?;
            if previous != 0 {
                self.free_node(previous)?;
            }
        }

        let pager = self.db.pager();
        let mut page = pager.allocate_empty_page();
        page.num = node.page_num;
        node.serialize(&mut page.data)?;
        pager.write_page(&page)
    }

    fn free_node(&mut self, page_num: PageNum) -> Result<()> {
        self.ensure_writable()?;

        if self.owned.remove(&page_num) {
            if let Some(freelist) = self.freelist.as_mut() {
                freelist.release(page_num);
            }
        } else {
            self.freed.push(page_num);
        }
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.finish_rollback();
    }
}

/// A collection's root page, stored as 8 little-endian bytes
fn decode_root(value: &[u8]) -> Result<PageNum> {
    let bytes: [u8; 8] = value.try_into().map_err(|_| {
        AtlasError::Corruption(format!(
            "collection record holds {} bytes, expected 8",
            value.len()
        ))
    })?;
    Ok(PageNum::from_le_bytes(bytes))
}
