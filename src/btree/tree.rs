//! B+Tree algorithms
//!
//! Every operation takes the root page number and returns the (possibly new)
//! root page number. Nodes on the path from the root to the touched leaf are
//! held in memory for the duration of one call and written back bottom-up.

use std::ops::Bound;

use crate::error::{AtlasError, Result};
use crate::storage::PageNum;

use super::{Item, Node, NodeStore};

/// An ancestor on the way down and the child slot that was followed
struct PathEntry {
    node: Node,
    child: usize,
}

/// What a modified path may need on the way back up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rebalance {
    /// Inserts only ever grow nodes
    Split,
    /// Deletes may also leave nodes under-full
    SplitOrMerge,
}

/// Write an empty leaf and return its page: the root of a new tree
pub fn create<S: NodeStore + ?Sized>(store: &mut S) -> Result<PageNum> {
    let mut root = Node::new_leaf(Vec::new());
    store.write_node(&mut root)?;
    Ok(root.page_num)
}

/// Look up `key`; `None` if no leaf holds it
pub fn find<S: NodeStore + ?Sized>(store: &S, root: PageNum, key: &[u8]) -> Result<Option<Vec<u8>>> {
    let (_, mut leaf) = descend(store, root, key)?;
    Ok(match leaf.search(key) {
        Ok(index) => Some(leaf.items.swap_remove(index).value),
        Err(_) => None,
    })
}

/// Insert or overwrite `key`
pub fn put<S: NodeStore + ?Sized>(
    store: &mut S,
    root: PageNum,
    key: &[u8],
    value: &[u8],
) -> Result<PageNum> {
    let (path, mut leaf) = descend(store, root, key)?;

    match leaf.search(key) {
        Ok(index) => leaf.items[index].value = value.to_vec(),
        Err(index) => leaf.items.insert(index, Item::new(key, value)),
    }

    rebalance_path(store, path, leaf, Rebalance::Split)
}

/// Delete `key`; `KeyNotFound` leaves the tree untouched
///
/// Separators equal to the removed key may stay in internal nodes: they
/// still bound their subtrees correctly.
pub fn remove<S: NodeStore + ?Sized>(store: &mut S, root: PageNum, key: &[u8]) -> Result<PageNum> {
    let (path, mut leaf) = descend(store, root, key)?;

    match leaf.search(key) {
        Ok(index) => {
            leaf.items.remove(index);
        }
        Err(_) => return Err(AtlasError::KeyNotFound),
    }

    rebalance_path(store, path, leaf, Rebalance::SplitOrMerge)
}

/// All leaf items with keys inside the bounds, in key order
pub fn scan<S: NodeStore + ?Sized>(
    store: &S,
    root: PageNum,
    start: Bound<&[u8]>,
    end: Bound<&[u8]>,
) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    scan_node(store, root, start, end, &mut items)?;
    Ok(items)
}

/// Number of key/value pairs in the tree
pub fn len<S: NodeStore + ?Sized>(store: &S, root: PageNum) -> Result<usize> {
    let node = store.get_node(root)?;
    if node.is_leaf() {
        return Ok(node.items.len());
    }

    let mut total = 0;
    for &child in &node.children {
        total += len(store, child)?;
    }
    Ok(total)
}

/// Levels from root to leaf; a lone root leaf has height 1
pub fn height<S: NodeStore + ?Sized>(store: &S, root: PageNum) -> Result<usize> {
    let mut node = store.get_node(root)?;
    let mut height = 1;
    while let Some(&first) = node.children.first() {
        node = store.get_node(first)?;
        height += 1;
    }
    Ok(height)
}

/// Release every page of the tree
pub fn free_all<S: NodeStore + ?Sized>(store: &mut S, root: PageNum) -> Result<()> {
    let node = store.get_node(root)?;
    for &child in &node.children {
        free_all(store, child)?;
    }
    store.free_node(root)
}

// =============================================================================
// Descent
// =============================================================================

fn descend<S: NodeStore + ?Sized>(store: &S, root: PageNum, key: &[u8]) -> Result<(Vec<PathEntry>, Node)> {
    let mut path = Vec::new();
    let mut node = store.get_node(root)?;

    while !node.is_leaf() {
        let child = node.child_index(key);
        let next = store.get_node(node.children[child])?;
        path.push(PathEntry { node, child });
        node = next;
    }

    Ok((path, node))
}

fn scan_node<S: NodeStore + ?Sized>(
    store: &S,
    page_num: PageNum,
    start: Bound<&[u8]>,
    end: Bound<&[u8]>,
    items: &mut Vec<Item>,
) -> Result<()> {
    let node = store.get_node(page_num)?;

    if node.is_leaf() {
        items.extend(
            node.items
                .into_iter()
                .filter(|item| in_range(&item.key, start, end)),
        );
        return Ok(());
    }

    let first = match start {
        Bound::Included(key) | Bound::Excluded(key) => node.child_index(key),
        Bound::Unbounded => 0,
    };
    let last = match end {
        Bound::Included(key) | Bound::Excluded(key) => node.child_index(key),
        Bound::Unbounded => node.children.len() - 1,
    };
    if first > last {
        return Ok(());
    }

    for &child in &node.children[first..=last] {
        scan_node(store, child, start, end, items)?;
    }
    Ok(())
}

fn in_range(key: &[u8], start: Bound<&[u8]>, end: Bound<&[u8]>) -> bool {
    let after_start = match start {
        Bound::Included(bound) => key >= bound,
        Bound::Excluded(bound) => key > bound,
        Bound::Unbounded => true,
    };
    let before_end = match end {
        Bound::Included(bound) => key <= bound,
        Bound::Excluded(bound) => key < bound,
        Bound::Unbounded => true,
    };
    after_start && before_end
}

// =============================================================================
// Rebalancing
// =============================================================================

/// Write `node` and its ancestors back, fixing fill at every level
fn rebalance_path<S: NodeStore + ?Sized>(
    store: &mut S,
    mut path: Vec<PathEntry>,
    mut node: Node,
    rebalance: Rebalance,
) -> Result<PageNum> {
    let fill = store.fill();

    while let Some(PathEntry { node: mut parent, child }) = path.pop() {
        if rebalance == Rebalance::SplitOrMerge && fill.is_under_populated(&node) {
            fix_underflow(store, &mut parent, child, node)?;
        } else {
            place_child(store, &mut parent, child, node)?;
        }
        node = parent;
    }

    finish_root(store, node)
}

/// The root may be sparse; it only grows or shrinks the tree height
fn finish_root<S: NodeStore + ?Sized>(store: &mut S, mut root: Node) -> Result<PageNum> {
    let fill = store.fill();

    if fill.is_over_populated(&root) {
        let siblings = split_over_full(store, &mut root)?;
        store.write_node(&mut root)?;

        let mut separators = Vec::with_capacity(siblings.len());
        let mut children = vec![root.page_num];
        for (separator, sibling) in siblings {
            separators.push(Item::separator(separator));
            children.push(sibling.page_num);
        }

        tracing::trace!(
            "Root split: page {} into {} nodes",
            root.page_num,
            children.len()
        );

        // A wide enough split can over-fill the new root as well
        return finish_root(store, Node::new_internal(separators, children));
    }

    if !root.is_leaf() && root.items.is_empty() {
        let only_child = root.children[0];
        if root.page_num != 0 {
            store.free_node(root.page_num)?;
        }
        tracing::trace!("Root collapsed into page {}", only_child);
        return Ok(only_child);
    }

    store.write_node(&mut root)?;
    Ok(root.page_num)
}

/// Write `child` into slot `index` of `parent`, splitting it if over-full
fn place_child<S: NodeStore + ?Sized>(
    store: &mut S,
    parent: &mut Node,
    index: usize,
    mut child: Node,
) -> Result<()> {
    let fill = store.fill();

    if !fill.is_over_populated(&child) {
        store.write_node(&mut child)?;
        parent.children[index] = child.page_num;
        return Ok(());
    }

    let siblings = split_over_full(store, &mut child)?;
    store.write_node(&mut child)?;
    parent.children[index] = child.page_num;

    tracing::trace!(
        "Split page {} into {} nodes",
        child.page_num,
        siblings.len() + 1
    );

    for (offset, (separator, sibling)) in siblings.into_iter().enumerate() {
        parent.items.insert(index + offset, Item::separator(separator));
        parent.children.insert(index + offset + 1, sibling.page_num);
    }
    Ok(())
}

/// Split `node` until every piece fits under the maximum fill
///
/// `node` keeps the first piece and is left for the caller to write. The
/// returned siblings are already written, in key order, each with the
/// separator that goes in front of it.
fn split_over_full<S: NodeStore + ?Sized>(
    store: &mut S,
    node: &mut Node,
) -> Result<Vec<(Vec<u8>, Node)>> {
    let fill = store.fill();
    let mut siblings: Vec<(Vec<u8>, Node)> = Vec::new();

    loop {
        let last = match siblings.last_mut() {
            Some((_, sibling)) => sibling,
            None => &mut *node,
        };
        if !fill.is_over_populated(last) {
            break;
        }
        let at = fill.split_index(last).ok_or_else(|| no_split_index(last))?;
        let split = last.split(at)?;
        siblings.push(split);
    }

    for (_, sibling) in siblings.iter_mut() {
        store.write_node(sibling)?;
    }
    Ok(siblings)
}

/// Borrow from a sibling that can spare an item, else merge with one
fn fix_underflow<S: NodeStore + ?Sized>(
    store: &mut S,
    parent: &mut Node,
    index: usize,
    mut child: Node,
) -> Result<()> {
    let fill = store.fill();

    let mut left = None;
    if index > 0 {
        let mut sibling = store.get_node(parent.children[index - 1])?;
        if fill.can_spare(&sibling) {
            rotate_right(&mut sibling, parent, &mut child, index);
            place_child(store, parent, index, child)?;
            return place_child(store, parent, index - 1, sibling);
        }
        left = Some(sibling);
    }

    let mut right = None;
    if index + 1 < parent.children.len() {
        let mut sibling = store.get_node(parent.children[index + 1])?;
        if fill.can_spare(&sibling) {
            rotate_left(&mut child, parent, &mut sibling, index);
            place_child(store, parent, index + 1, sibling)?;
            return place_child(store, parent, index, child);
        }
        right = Some(sibling);
    }

    match (left, right) {
        (Some(left), _) => merge(store, parent, index - 1, left, child),
        (None, Some(right)) => merge(store, parent, index, child, right),
        // An only child has nobody to borrow from
        (None, None) => place_child(store, parent, index, child),
    }
}

/// Fold `right` into `left`, dropping their separator from `parent`
fn merge<S: NodeStore + ?Sized>(
    store: &mut S,
    parent: &mut Node,
    left_index: usize,
    mut left: Node,
    right: Node,
) -> Result<()> {
    let separator = parent.items.remove(left_index);
    parent.children.remove(left_index + 1);

    let right_page = right.page_num;
    if !left.is_leaf() {
        left.items.push(separator);
        left.children.extend(right.children);
    }
    left.items.extend(right.items);

    store.free_node(right_page)?;
    tracing::trace!("Merged page {} into {}", right_page, left.page_num);

    place_child(store, parent, left_index, left)
}

/// Move the left sibling's last item into `child` (slot `index`)
fn rotate_right(left: &mut Node, parent: &mut Node, child: &mut Node, index: usize) {
    if child.is_leaf() {
        if let Some(item) = left.items.pop() {
            parent.items[index - 1] = Item::separator(item.key.clone());
            child.items.insert(0, item);
        }
        return;
    }

    if let (Some(item), Some(page)) = (left.items.pop(), left.children.pop()) {
        let separator = std::mem::replace(&mut parent.items[index - 1], Item::separator(item.key));
        child.items.insert(0, separator);
        child.children.insert(0, page);
    }
}

/// Move the right sibling's first item into `child` (slot `index`)
fn rotate_left(child: &mut Node, parent: &mut Node, right: &mut Node, index: usize) {
    if right.items.is_empty() {
        return;
    }

    let item = right.items.remove(0);
    if child.is_leaf() {
        child.items.push(item);
        if let Some(first) = right.items.first() {
            parent.items[index] = Item::separator(first.key.clone());
        }
        return;
    }

    let page = right.children.remove(0);
    let separator = std::mem::replace(&mut parent.items[index], Item::separator(item.key));
    child.items.push(separator);
    child.children.push(page);
}

fn no_split_index(node: &Node) -> AtlasError {
    AtlasError::InvariantViolation(format!(
        "no split index for over-full node {} ({} items, {} bytes)",
        node.page_num,
        node.items.len(),
        node.node_size()
    ))
}
