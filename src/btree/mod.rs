//! B+Tree Module
//!
//! Page-resident B+Tree: node encoding plus the insert/delete algorithms.
//!
//! ## Responsibilities
//! - Encode/decode leaf and internal nodes
//! - Descend by binary search
//! - Split over-full nodes, borrow or merge under-full ones
//! - Grow and shrink the tree height at the root
//!
//! Nodes reference each other by page number only. Every access goes through
//! a [`NodeStore`], so the algorithms never hold an in-memory node graph.

mod node;
pub mod tree;

pub use node::{FillBounds, Item, Node, NODE_HEADER_SIZE, PAGE_NUM_SIZE};

use crate::error::Result;
use crate::storage::PageNum;

/// Where a tree reads and writes its nodes
///
/// The database's transaction implements this; tests can back it with memory.
pub trait NodeStore {
    /// Split/merge thresholds for this store's page size
    fn fill(&self) -> FillBounds;

    /// Load the node stored in `page_num`
    fn get_node(&self, page_num: PageNum) -> Result<Node>;

    /// Persist `node`
    ///
    /// May move the node to another page (page number 0 always does); the
    /// caller must use `node.page_num` afterwards.
    fn write_node(&mut self, node: &mut Node) -> Result<()>;

    /// The page no longer belongs to the tree
    fn free_node(&mut self, page_num: PageNum) -> Result<()>;
}
