//! Page I/O
//!
//! Reads and writes whole pages of the database file. There is no cache:
//! every call goes to the file.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;

use crate::error::{AtlasError, Result};

/// Page number inside the database file
pub type PageNum = u64;

/// One page worth of bytes and the page it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub num: PageNum,
    pub data: Vec<u8>,
}

/// Reads and writes fixed-size pages
///
/// ## Concurrency:
/// - `file`: one mutex around the handle, so a seek and the read/write that
///   follows it are never interleaved with another caller and no page is
///   observed half-written.
pub struct Pager {
    file: Mutex<File>,
    page_size: usize,
}

impl Pager {
    /// Open or create the file at `path`
    pub fn open(path: &Path, page_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            file: Mutex::new(file),
            page_size,
        })
    }

    /// A zero-filled buffer of one page
    pub fn allocate_empty_page(&self) -> Page {
        Page {
            num: 0,
            data: vec![0u8; self.page_size],
        }
    }

    /// Read page `num`; a short read is an I/O error
    pub fn read_page(&self, num: PageNum) -> Result<Page> {
        let mut page = self.allocate_empty_page();
        page.num = num;
        self.read_at(self.offset(num), &mut page.data)?;
        Ok(page)
    }

    /// Write a full page at its offset
    pub fn write_page(&self, page: &Page) -> Result<()> {
        if page.data.len() != self.page_size {
            return Err(AtlasError::InvariantViolation(format!(
                "page {} buffer is {} bytes, expected {}",
                page.num,
                page.data.len(),
                self.page_size
            )));
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(self.offset(page.num)))?;
        file.write_all(&page.data)?;
        Ok(())
    }

    /// Read `buf.len()` bytes at an absolute offset
    ///
    /// Used for the meta header, which must be read before the stored page
    /// size is known to match.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    /// Current file length in bytes
    pub fn file_len(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    /// Flush file contents to stable storage
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn offset(&self, num: PageNum) -> u64 {
        num * self.page_size as u64
    }
}
