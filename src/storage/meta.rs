//! Meta record
//!
//! Page 0 of every database file. Rewritten wholesale as the last write of a
//! commit.

use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, Result};

use super::PageNum;

/// Magic number identifying an AtlasDB file ("ATDB")
pub const MAGIC: u32 = 0x4154_4442;

/// The meta record always lives in page 0
pub const META_PAGE_NUM: PageNum = 0;

/// Encoded size: Magic (4) + PageSize (8) + Root (8) + Freelist (8) + TxId (8)
pub const META_SIZE: usize = 36;

/// Root pointers of the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    magic: u32,
    page_size: u64,
    root: PageNum,
    freelist_page: PageNum,
    txid: u64,
}

impl Meta {
    pub fn new(page_size: usize, root: PageNum, freelist_page: PageNum) -> Self {
        Self {
            magic: MAGIC,
            page_size: page_size as u64,
            root,
            freelist_page,
            txid: 0,
        }
    }

    /// Page holding the root of the collections tree
    pub fn root(&self) -> PageNum {
        self.root
    }

    pub fn set_root(&mut self, root: PageNum) {
        self.root = root;
    }

    pub fn freelist_page(&self) -> PageNum {
        self.freelist_page
    }

    pub fn set_freelist_page(&mut self, page: PageNum) {
        self.freelist_page = page;
    }

    pub fn page_size(&self) -> usize {
        self.page_size as usize
    }

    /// Id of the last committed write transaction
    pub fn txid(&self) -> u64 {
        self.txid
    }

    pub fn set_txid(&mut self, txid: u64) {
        self.txid = txid;
    }

    /// Encode into the start of `buf`
    pub fn serialize(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() < META_SIZE {
            return Err(AtlasError::InvariantViolation(format!(
                "meta needs {} bytes, buffer has {}",
                META_SIZE,
                buf.len()
            )));
        }
        bincode::serialize_into(&mut buf[..META_SIZE], self)
            .map_err(|e| AtlasError::Serialization(e.to_string()))
    }

    /// Decode and check the magic number
    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        let meta: Meta = bincode::deserialize(buf)
            .map_err(|e| AtlasError::Corruption(format!("malformed meta: {}", e)))?;

        if meta.magic != MAGIC {
            return Err(AtlasError::Corruption(format!(
                "invalid magic: expected 0x{:08x}, got 0x{:08x}",
                MAGIC, meta.magic
            )));
        }

        Ok(meta)
    }
}
