//! B+Tree node
//!
//! ## Page Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (3 bytes)                                             │
//! │   IsLeaf: u8 | ItemCount: u16                                │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Children (internal only): (ItemCount + 1) x PageNum u64      │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Offset table: ItemCount x u16 (absolute offset of each body) │
//! ├──────────────────────────────────────────────────────────────┤
//! │ ... free space ...                                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Bodies, packed against the end of the page, in item order    │
//! │   leaf:     [KeyLen u16][Key][ValueLen u16][Value]           │
//! │   internal: [KeyLen u16][Key]                                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//! Decoding reads the fixed region first, then follows the offsets.

use bytes::{Buf, BufMut};

use crate::error::{AtlasError, Result};
use crate::storage::{PageNum, META_PAGE_NUM};

/// IsLeaf (1) + ItemCount (2)
pub const NODE_HEADER_SIZE: usize = 3;

/// Size of an encoded child pointer
pub const PAGE_NUM_SIZE: usize = 8;

const OFFSET_SIZE: usize = 2;
const LEN_PREFIX_SIZE: usize = 2;

/// A key and its value
///
/// Internal nodes keep their separator keys as items with an empty value;
/// the value is never encoded for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Item {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// A routing key for an internal node
    pub fn separator(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Vec::new(),
        }
    }
}

/// In-memory form of one node page
///
/// A node with no children is a leaf. An internal node always has one more
/// child than it has items. `page_num` is 0 until the node is first written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    pub page_num: PageNum,
    pub items: Vec<Item>,
    pub children: Vec<PageNum>,
}

impl Node {
    pub fn new_leaf(items: Vec<Item>) -> Self {
        Self {
            page_num: 0,
            items,
            children: Vec::new(),
        }
    }

    pub fn new_internal(items: Vec<Item>, children: Vec<PageNum>) -> Self {
        debug_assert_eq!(children.len(), items.len() + 1);
        Self {
            page_num: 0,
            items,
            children,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Binary search for `key`: `Ok(index)` on an exact match, otherwise
    /// `Err(index)` where the key would be inserted
    pub fn search(&self, key: &[u8]) -> std::result::Result<usize, usize> {
        self.items
            .binary_search_by(|item| item.key.as_slice().cmp(key))
    }

    /// Index of the child whose subtree may hold `key`
    ///
    /// Child `i` holds keys in `[items[i - 1], items[i])`, so a key equal to
    /// a separator goes right.
    pub fn child_index(&self, key: &[u8]) -> usize {
        match self.search(key) {
            Ok(index) => index + 1,
            Err(index) => index,
        }
    }

    /// Bytes item `index` adds to the page: offset slot, body, child pointer
    pub fn element_size(&self, index: usize) -> usize {
        let pointer = if self.is_leaf() { 0 } else { PAGE_NUM_SIZE };
        OFFSET_SIZE + self.body_size(index) + pointer
    }

    /// Encoded size of the whole node
    pub fn node_size(&self) -> usize {
        let last_child = if self.is_leaf() { 0 } else { PAGE_NUM_SIZE };
        let elements: usize = (0..self.items.len()).map(|i| self.element_size(i)).sum();
        NODE_HEADER_SIZE + elements + last_child
    }

    fn body_size(&self, index: usize) -> usize {
        let item = &self.items[index];
        let key = LEN_PREFIX_SIZE + item.key.len();
        if self.is_leaf() {
            key + LEN_PREFIX_SIZE + item.value.len()
        } else {
            key
        }
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    /// Encode into a page buffer
    pub fn serialize(&self, buf: &mut [u8]) -> Result<()> {
        let size = self.node_size();
        if size > buf.len() {
            return Err(AtlasError::InvariantViolation(format!(
                "node of {} bytes does not fit a {} byte page",
                size,
                buf.len()
            )));
        }

        let leaf = self.is_leaf();
        let body_len: usize = (0..self.items.len()).map(|i| self.body_size(i)).sum();
        let mut body_offset = buf.len() - body_len;

        let (head, body) = buf.split_at_mut(body_offset);
        let mut head: &mut [u8] = head;
        let mut body: &mut [u8] = body;

        head.put_u8(leaf as u8);
        head.put_u16_le(self.items.len() as u16);
        for &child in &self.children {
            head.put_u64_le(child);
        }

        for (index, item) in self.items.iter().enumerate() {
            head.put_u16_le(body_offset as u16);

            body.put_u16_le(item.key.len() as u16);
            body.put_slice(&item.key);
            if leaf {
                body.put_u16_le(item.value.len() as u16);
                body.put_slice(&item.value);
            }

            body_offset += self.body_size(index);
        }

        Ok(())
    }

    /// Decode a node read from page `page_num`
    pub fn deserialize(page_num: PageNum, buf: &[u8]) -> Result<Self> {
        let corrupt = |what: &str| {
            AtlasError::Corruption(format!("node page {}: {}", page_num, what))
        };

        // Pass 1: fixed region
        let mut cursor = buf;
        if cursor.remaining() < NODE_HEADER_SIZE {
            return Err(corrupt("truncated header"));
        }
        let leaf = match cursor.get_u8() {
            0 => false,
            1 => true,
            flag => return Err(corrupt(&format!("invalid leaf flag {}", flag))),
        };
        let count = cursor.get_u16_le() as usize;
        let child_count = if leaf { 0 } else { count + 1 };

        if cursor.remaining() < child_count * PAGE_NUM_SIZE + count * OFFSET_SIZE {
            return Err(corrupt("item count exceeds page"));
        }

        let mut children = Vec::with_capacity(child_count);
        for _ in 0..child_count {
            let child = cursor.get_u64_le();
            if child == META_PAGE_NUM {
                return Err(corrupt("child points at the meta page"));
            }
            children.push(child);
        }

        let offsets: Vec<usize> = (0..count).map(|_| cursor.get_u16_le() as usize).collect();

        // Pass 2: bodies
        let mut items: Vec<Item> = Vec::with_capacity(count);
        for offset in offsets {
            let mut body = buf.get(offset..).ok_or_else(|| corrupt("offset past page end"))?;

            let key = read_prefixed(&mut body).ok_or_else(|| corrupt("truncated key"))?;
            let value: &[u8] = if leaf {
                read_prefixed(&mut body).ok_or_else(|| corrupt("truncated value"))?
            } else {
                &[]
            };

            if let Some(prev) = items.last() {
                if prev.key.as_slice() >= key {
                    return Err(corrupt("keys out of order"));
                }
            }
            items.push(Item::new(key, value));
        }

        Ok(Self {
            page_num,
            items,
            children,
        })
    }

    // =========================================================================
    // Split
    // =========================================================================

    /// Split at `at`, keeping the left part in `self`
    ///
    /// Returns the separator for the parent and the new right sibling
    /// (page number 0, not yet written).
    /// - Leaf: items `[at..]` move right; the separator is their first key.
    /// - Internal: item `at` is promoted, items `[at + 1..]` and children
    ///   `[at + 1..]` move right.
    pub fn split(&mut self, at: usize) -> Result<(Vec<u8>, Node)> {
        let count = self.items.len();

        if self.is_leaf() {
            if at == 0 || at >= count {
                return Err(AtlasError::InvariantViolation(format!(
                    "leaf split index {} invalid for {} items",
                    at, count
                )));
            }
            let right = self.items.split_off(at);
            let separator = right[0].key.clone();
            return Ok((separator, Node::new_leaf(right)));
        }

        // The promoted key needs at least one key left on each side
        let at = at.min(count.saturating_sub(2));
        if at == 0 {
            return Err(AtlasError::InvariantViolation(format!(
                "internal node with {} items cannot be split",
                count
            )));
        }

        let mut right_items = self.items.split_off(at);
        let promoted = right_items.remove(0);
        let right_children = self.children.split_off(at + 1);

        Ok((promoted.key, Node::new_internal(right_items, right_children)))
    }
}

/// Read a u16 length prefix and that many bytes
fn read_prefixed<'a>(cursor: &mut &'a [u8]) -> Option<&'a [u8]> {
    if cursor.remaining() < LEN_PREFIX_SIZE {
        return None;
    }
    let len = cursor.get_u16_le() as usize;
    if cursor.len() < len {
        return None;
    }
    let (bytes, rest) = cursor.split_at(len);
    *cursor = rest;
    Some(bytes)
}

// =============================================================================
// Fill Thresholds
// =============================================================================

/// Split and merge thresholds in bytes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillBounds {
    page_size: usize,
    min: f32,
    max: f32,
}

impl FillBounds {
    pub fn new(page_size: usize, min_fill_percent: f32, max_fill_percent: f32) -> Self {
        Self {
            page_size,
            min: min_fill_percent * page_size as f32,
            max: max_fill_percent * page_size as f32,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn min_threshold(&self) -> f32 {
        self.min
    }

    pub fn max_threshold(&self) -> f32 {
        self.max
    }

    pub fn is_over_populated(&self, node: &Node) -> bool {
        node.node_size() as f32 > self.max
    }

    pub fn is_under_populated(&self, node: &Node) -> bool {
        (node.node_size() as f32) < self.min
    }

    /// Where to cut `node` so the left part is just over the minimum
    ///
    /// The lowest `i` whose running size (header plus items `0..=i`) exceeds
    /// the minimum threshold, provided `i` is not the last item; returns
    /// `i + 1`. `None` means the node has nothing to spare.
    pub fn split_index(&self, node: &Node) -> Option<usize> {
        let mut size = NODE_HEADER_SIZE;
        let last = node.items.len().checked_sub(1)?;

        for i in 0..node.items.len() {
            size += node.element_size(i);
            if size as f32 > self.min && i < last {
                return Some(i + 1);
            }
        }

        None
    }

    /// Whether `node` can give one item to a sibling
    pub fn can_spare(&self, node: &Node) -> bool {
        self.split_index(node).is_some()
    }
}
