//! Freelist
//!
//! Tracks the highest page ever handed out and the pages that can be reused.
//!
//! ## Pending pages
//! A commit frees the pages its copy-on-write replaced, but a read
//! transaction that started earlier may still be walking them. Such pages are
//! parked under the id of the freeing commit and only become allocatable once
//! no reader older than that commit remains. On disk they are recorded as
//! plain released pages: after a restart no reader exists.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, Result};

use super::meta::META_PAGE_NUM;
use super::PageNum;

/// On-disk shape: `max_page u64 | count u64 | count x u64`
///
/// bincode's fixed-int encoding writes exactly this layout.
#[derive(Debug, Serialize, Deserialize)]
struct FreelistRecord {
    max_page: PageNum,
    released: Vec<PageNum>,
}

/// Registry of reusable pages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Freelist {
    /// Highest page number ever allocated
    max_page: PageNum,

    /// Reusable pages; `allocate` pops from the back
    released: Vec<PageNum>,

    /// Pages freed by commit `txid`, not yet safe to reuse
    pending: BTreeMap<u64, Vec<PageNum>>,
}

impl Default for Freelist {
    fn default() -> Self {
        Self::new()
    }
}

impl Freelist {
    /// Empty freelist; page 0 (meta) is already taken
    pub fn new() -> Self {
        Self {
            max_page: META_PAGE_NUM,
            released: Vec::new(),
            pending: BTreeMap::new(),
        }
    }

    /// Hand out a page: the most recently released one, else a fresh one
    pub fn allocate(&mut self) -> PageNum {
        if let Some(page) = self.released.pop() {
            return page;
        }
        self.max_page += 1;
        self.max_page
    }

    /// Make `page` reusable right away
    ///
    /// A page must not be released twice without being allocated in between.
    pub fn release(&mut self, page: PageNum) {
        debug_assert!(
            !self.released.contains(&page),
            "page {} released twice",
            page
        );
        self.released.push(page);
    }

    /// Park `page`, freed by commit `txid`, until older readers are gone
    pub fn free_pending(&mut self, txid: u64, page: PageNum) {
        self.pending.entry(txid).or_default().push(page);
    }

    /// Move pending pages nobody can still see into the reusable set
    ///
    /// `oldest_reader` is the snapshot id of the oldest live read transaction.
    /// Pages freed by commit `t` were reachable only from snapshots before `t`.
    pub fn release_pending(&mut self, oldest_reader: Option<u64>) {
        let ready: Vec<u64> = self
            .pending
            .keys()
            .copied()
            .filter(|&txid| oldest_reader.map_or(true, |reader| reader >= txid))
            .collect();

        for txid in ready {
            if let Some(pages) = self.pending.remove(&txid) {
                self.released.extend(pages);
            }
        }
    }

    pub fn max_page(&self) -> PageNum {
        self.max_page
    }

    /// Pages available to `allocate`, in release order
    pub fn released(&self) -> &[PageNum] {
        &self.released
    }

    /// Number of pages held back for live readers
    pub fn pending_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Encode into a page buffer
    pub fn serialize(&self, buf: &mut [u8]) -> Result<()> {
        let mut released = self.released.clone();
        for pages in self.pending.values() {
            released.extend_from_slice(pages);
        }

        let record = FreelistRecord {
            max_page: self.max_page,
            released,
        };

        let size = bincode::serialized_size(&record)
            .map_err(|e| AtlasError::Serialization(e.to_string()))? as usize;
        if size > buf.len() {
            return Err(AtlasError::InvariantViolation(format!(
                "freelist needs {} bytes but a page holds {}",
                size,
                buf.len()
            )));
        }

        bincode::serialize_into(&mut buf[..size], &record)
            .map_err(|e| AtlasError::Serialization(e.to_string()))
    }

    /// Decode from a page buffer, preserving the release order
    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        let record: FreelistRecord = bincode::deserialize(buf)
            .map_err(|e| AtlasError::Corruption(format!("malformed freelist: {}", e)))?;

        let mut seen = HashSet::with_capacity(record.released.len());
        for &page in &record.released {
            if page == META_PAGE_NUM || page > record.max_page {
                return Err(AtlasError::Corruption(format!(
                    "freelist entry {} outside [1, {}]",
                    page, record.max_page
                )));
            }
            if !seen.insert(page) {
                return Err(AtlasError::Corruption(format!(
                    "freelist lists page {} twice",
                    page
                )));
            }
        }

        Ok(Self {
            max_page: record.max_page,
            released: record.released,
            pending: BTreeMap::new(),
        })
    }
}
