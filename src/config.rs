//! Configuration for AtlasDB
//!
//! Everything a database needs is passed explicitly to `Database::open`.
//! `Options::default()` is a plain constant, there is no global state.

use crate::btree::FillBounds;
use crate::error::{AtlasError, Result};

/// Default page size (bytes)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Smallest page size accepted by `Options::validate`
pub const MIN_PAGE_SIZE: usize = 256;

/// Largest page size: item offsets inside a node are stored as u16
pub const MAX_PAGE_SIZE: usize = 65536;

/// Share of a page one maximum-size item can take, see `max_item_size`
pub const MAX_ITEM_FILL: f32 = 0.25;

/// Options for opening a database
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Options {
    // -------------------------------------------------------------------------
    // Page Layout
    // -------------------------------------------------------------------------
    /// Size of every page in the file. Fixed when the file is created and
    /// checked against the stored value on every later open.
    pub page_size: usize,

    // -------------------------------------------------------------------------
    // Node Fill Thresholds
    // -------------------------------------------------------------------------
    /// A non-root node smaller than `min_fill_percent * page_size` is
    /// rebalanced after a delete.
    pub min_fill_percent: f32,

    /// A node larger than `max_fill_percent * page_size` is split after an
    /// insert.
    pub max_fill_percent: f32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            min_fill_percent: 0.5,
            max_fill_percent: 0.95,
        }
    }
}

impl Options {
    /// Create a new options builder
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Check that the options describe a usable tree shape
    pub fn validate(&self) -> Result<()> {
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(AtlasError::Config(format!(
                "page size {} out of range [{}, {}]",
                self.page_size, MIN_PAGE_SIZE, MAX_PAGE_SIZE
            )));
        }

        if !(self.min_fill_percent > 0.0 && self.min_fill_percent < self.max_fill_percent) {
            return Err(AtlasError::Config(format!(
                "min fill percent {} must be in (0, max fill percent {})",
                self.min_fill_percent, self.max_fill_percent
            )));
        }

        // Below one half a split cannot guarantee two non-empty halves
        if !(0.5..=1.0).contains(&self.max_fill_percent) {
            return Err(AtlasError::Config(format!(
                "max fill percent {} must be in [0.5, 1.0]",
                self.max_fill_percent
            )));
        }

        // The left piece of a split holds up to `min` plus one maximum item
        if self.min_fill_percent + MAX_ITEM_FILL > self.max_fill_percent {
            return Err(AtlasError::Config(format!(
                "min fill percent {} leaves less than {} below max fill percent {}",
                self.min_fill_percent, MAX_ITEM_FILL, self.max_fill_percent
            )));
        }

        Ok(())
    }

    /// Largest key + value accepted by a collection
    ///
    /// Values never spill into overflow pages, so an item is capped well below
    /// a page; any over-full node then holds enough items to split.
    pub fn max_item_size(&self) -> usize {
        self.page_size / 4 - 32
    }

    /// Split/merge thresholds derived from these options
    pub fn fill_bounds(&self) -> FillBounds {
        FillBounds::new(self.page_size, self.min_fill_percent, self.max_fill_percent)
    }
}

/// Builder for Options
#[derive(Default)]
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    /// Set the page size (in bytes)
    pub fn page_size(mut self, size: usize) -> Self {
        self.options.page_size = size;
        self
    }

    /// Set the minimum fill fraction for non-root nodes
    pub fn min_fill_percent(mut self, percent: f32) -> Self {
        self.options.min_fill_percent = percent;
        self
    }

    /// Set the maximum fill fraction before a node splits
    pub fn max_fill_percent(mut self, percent: f32) -> Self {
        self.options.max_fill_percent = percent;
        self
    }

    pub fn build(self) -> Options {
        self.options
    }
}
