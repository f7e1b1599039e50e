//! Database Module
//!
//! Owns the file and the last committed meta/freelist; hands out
//! transactions.
//!
//! ## Responsibilities
//! - Bootstrap a new file (meta, freelist, empty collections tree)
//! - Load and validate an existing file
//! - Serialize writers, track live readers
//! - Apply a write transaction's freelist and meta at commit

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::btree::Node;
use crate::config::Options;
use crate::error::{AtlasError, Result};
use crate::storage::{Freelist, Meta, PageNum, Pager, META_PAGE_NUM, META_SIZE};
use crate::tx::Transaction;

/// State visible to new transactions
#[derive(Debug, Clone)]
struct CommittedState {
    meta: Meta,
    freelist: Freelist,
}

/// Point-in-time numbers about the database file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbStats {
    pub page_size: usize,
    /// Root page of the collections tree
    pub root: PageNum,
    pub freelist_page: PageNum,
    /// Highest page number ever allocated
    pub max_page: PageNum,
    /// Pages ready for reuse
    pub free_pages: usize,
    /// Freed pages held back for live readers
    pub pending_pages: usize,
    /// Id of the last committed write transaction
    pub txid: u64,
}

/// An open database file
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader
///
/// - **Writers**: `write_tx()` takes `writer` and holds it until the
///   transaction commits or rolls back. A second call blocks.
/// - **Readers**: never block. Each registers the snapshot it reads in
///   `readers`; pages freed after that snapshot stay pending until it ends.
/// - **Pages**: writers never overwrite a committed page (copy-on-write), and
///   `Pager` serializes raw I/O, so a reader never sees a torn page.
pub struct Database {
    /// Database file path
    path: PathBuf,

    /// Options the file was opened with
    options: Options,

    /// Page I/O (internal mutex around the file)
    pager: Pager,

    /// Last committed meta + freelist
    state: RwLock<CommittedState>,

    /// Write permit, held by the one open write transaction
    writer: Mutex<()>,

    /// Live read transactions: snapshot txid -> count
    readers: Mutex<BTreeMap<u64, usize>>,
}

impl Database {
    /// Open the database at `path`, creating it if missing or empty
    ///
    /// An existing file must have been created with the same page size.
    pub fn open(path: impl AsRef<Path>, options: Options) -> Result<Self> {
        options.validate()?;

        let path = path.as_ref().to_path_buf();
        let pager = Pager::open(&path, options.page_size)?;

        let state = if pager.file_len()? == 0 {
            let state = Self::bootstrap(&pager, &options)?;
            tracing::debug!(
                "Initialized database {} (page size {})",
                path.display(),
                options.page_size
            );
            state
        } else {
            let state = Self::load(&pager, &options)?;
            tracing::debug!(
                "Opened database {}: root={}, freelist={}, txid={}",
                path.display(),
                state.meta.root(),
                state.meta.freelist_page(),
                state.meta.txid()
            );
            state
        };

        Ok(Self {
            path,
            options,
            pager,
            state: RwLock::new(state),
            writer: Mutex::new(()),
            readers: Mutex::new(BTreeMap::new()),
        })
    }

    /// Open with default options
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(path, Options::default())
    }

    /// Start a write transaction, waiting for the current writer to finish
    pub fn write_tx(&self) -> Transaction<'_> {
        Transaction::write(self)
    }

    /// Start a read transaction on the last committed state
    pub fn read_tx(&self) -> Transaction<'_> {
        Transaction::read(self)
    }

    /// Run `f` in a write transaction; commit on `Ok`, roll back on `Err`
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        let mut tx = self.write_tx();
        let value = f(&mut tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run `f` in a read transaction
    pub fn view<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        let mut tx = self.read_tx();
        let value = f(&mut tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Flush the file and release it
    ///
    /// Transactions borrow the database, so none can be open here.
    pub fn close(self) -> Result<()> {
        self.pager.sync()?;
        tracing::debug!("Closed database {}", self.path.display());
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Current numbers for the committed state
    pub fn stats(&self) -> DbStats {
        let state = self.state.read();
        DbStats {
            page_size: state.meta.page_size(),
            root: state.meta.root(),
            freelist_page: state.meta.freelist_page(),
            max_page: state.freelist.max_page(),
            free_pages: state.freelist.released().len(),
            pending_pages: state.freelist.pending_count(),
            txid: state.meta.txid(),
        }
    }

    // =========================================================================
    // Transaction Support
    // =========================================================================

    pub(crate) fn pager(&self) -> &Pager {
        &self.pager
    }

    /// Register a reader and return the meta it must read
    pub(crate) fn begin_read(&self) -> Meta {
        let mut readers = self.readers.lock();
        let meta = self.state.read().meta;
        *readers.entry(meta.txid()).or_insert(0) += 1;
        meta
    }

    pub(crate) fn end_read(&self, snapshot: u64) {
        let mut readers = self.readers.lock();
        if let Some(count) = readers.get_mut(&snapshot) {
            *count -= 1;
            if *count == 0 {
                readers.remove(&snapshot);
            }
        }
    }

    /// Take the write permit and private copies of meta and freelist
    pub(crate) fn begin_write(&self) -> (MutexGuard<'_, ()>, Meta, Freelist) {
        let guard = self.writer.lock();

        // Lock order: readers, then state
        let readers = self.readers.lock();
        let state = self.state.read();

        let mut freelist = state.freelist.clone();
        freelist.release_pending(readers.keys().next().copied());

        (guard, state.meta, freelist)
    }

    /// Make a write transaction durable and visible
    ///
    /// Node pages are already on disk. The freelist goes first, into a page
    /// the old meta does not reference, then the meta page as the final
    /// write; until it lands the old meta still points at the old, untouched
    /// tree and freelist.
    pub(crate) fn commit(&self, meta: Meta, freelist: Freelist) -> Result<()> {
        write_freelist(&self.pager, meta.freelist_page(), &freelist)?;
        self.pager.sync()?;

        write_meta(&self.pager, &meta)?;
        self.pager.sync()?;

        *self.state.write() = CommittedState { meta, freelist };
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Lay out a fresh file: meta, freelist, empty collections root
    fn bootstrap(pager: &Pager, options: &Options) -> Result<CommittedState> {
        let mut freelist = Freelist::new();
        let freelist_page = freelist.allocate();
        let root = freelist.allocate();

        let mut page = pager.allocate_empty_page();
        page.num = root;
        Node::new_leaf(Vec::new()).serialize(&mut page.data)?;
        pager.write_page(&page)?;

        write_freelist(pager, freelist_page, &freelist)?;

        let meta = Meta::new(options.page_size, root, freelist_page);
        write_meta(pager, &meta)?;
        pager.sync()?;

        Ok(CommittedState { meta, freelist })
    }

    /// Read meta and freelist of an existing file
    fn load(pager: &Pager, options: &Options) -> Result<CommittedState> {
        if pager.file_len()? < META_SIZE as u64 {
            return Err(AtlasError::Corruption(
                "file too short to hold a meta page".to_string(),
            ));
        }

        let mut header = [0u8; META_SIZE];
        pager.read_at(0, &mut header)?;
        let meta = Meta::deserialize(&header)?;

        if meta.page_size() != options.page_size {
            return Err(AtlasError::Corruption(format!(
                "page size mismatch: file uses {}, options specify {}",
                meta.page_size(),
                options.page_size
            )));
        }

        let page = pager.read_page(meta.freelist_page())?;
        let freelist = Freelist::deserialize(&page.data)?;

        Ok(CommittedState { meta, freelist })
    }
}

fn write_meta(pager: &Pager, meta: &Meta) -> Result<()> {
    let mut page = pager.allocate_empty_page();
    page.num = META_PAGE_NUM;
    meta.serialize(&mut page.data)?;
    pager.write_page(&page)
}

fn write_freelist(pager: &Pager, page_num: PageNum, freelist: &Freelist) -> Result<()> {
    let mut page = pager.allocate_empty_page();
    page.num = page_num;
    freelist.serialize(&mut page.data)?;
    pager.write_page(&page)
}
