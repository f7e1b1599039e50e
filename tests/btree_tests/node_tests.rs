//! Tests for Node
//!
//! These tests verify:
//! - Page layout of leaf and internal nodes
//! - Encoding at the exact page boundary
//! - Binary search and child routing
//! - Split index selection and splitting
//! - Corrupt pages are rejected

use atlasdb::btree::{FillBounds, Item, Node};
use atlasdb::AtlasError;

// =============================================================================
// Helper Functions
// =============================================================================

fn leaf(pairs: &[(&[u8], &[u8])]) -> Node {
    Node::new_leaf(pairs.iter().map(|(k, v)| Item::new(*k, *v)).collect())
}

fn internal(keys: &[&[u8]], children: &[u64]) -> Node {
    Node::new_internal(
        keys.iter().map(|k| Item::separator(*k)).collect(),
        children.to_vec(),
    )
}

fn encode(node: &Node, page_size: usize) -> Vec<u8> {
    let mut buf = vec![0u8; page_size];
    node.serialize(&mut buf).unwrap();
    buf
}

/// Leaf with one-byte keys and five-byte values: 12 bytes per element
fn small_leaf(count: u8) -> Node {
    Node::new_leaf(
        (0..count)
            .map(|i| Item::new(vec![b'a' + i], b"value".to_vec()))
            .collect(),
    )
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_leaf_layout() {
    let node = leaf(&[(b"a", b"1"), (b"bc", b"22")]);

    let buf = encode(&node, 64);

    assert_eq!(buf[0], 1);
    assert_eq!(&buf[1..3], &2u16.to_le_bytes());
    assert_eq!(&buf[3..5], &50u16.to_le_bytes());
    assert_eq!(&buf[5..7], &56u16.to_le_bytes());
    assert_eq!(&buf[50..56], &[1, 0, b'a', 1, 0, b'1']);
    assert_eq!(&buf[56..64], &[2, 0, b'b', b'c', 2, 0, b'2', b'2']);
    assert!(buf[7..50].iter().all(|&b| b == 0));
}

#[test]
fn test_internal_layout() {
    let node = internal(&[b"m"], &[3, 4]);

    let buf = encode(&node, 64);

    assert_eq!(buf[0], 0);
    assert_eq!(&buf[1..3], &1u16.to_le_bytes());
    assert_eq!(&buf[3..11], &3u64.to_le_bytes());
    assert_eq!(&buf[11..19], &4u64.to_le_bytes());
    assert_eq!(&buf[19..21], &61u16.to_le_bytes());
    assert_eq!(&buf[61..64], &[1, 0, b'm']);
}

#[test]
fn test_node_size_matches_layout() {
    let leaf = leaf(&[(b"a", b"1"), (b"bc", b"22")]);
    let internal = internal(&[b"m"], &[3, 4]);

    assert_eq!(leaf.element_size(0), 8);
    assert_eq!(leaf.element_size(1), 10);
    assert_eq!(leaf.node_size(), 21);
    assert_eq!(internal.element_size(0), 13);
    assert_eq!(internal.node_size(), 24);
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_empty_leaf_round_trip() {
    let node = Node::new_leaf(Vec::new());

    let decoded = Node::deserialize(7, &encode(&node, 256)).unwrap();

    assert_eq!(decoded.page_num, 7);
    assert!(decoded.is_leaf());
    assert!(decoded.items.is_empty());
}

#[test]
fn test_internal_round_trip_drops_values() {
    let mut node = internal(&[b"k"], &[2, 9]);
    node.page_num = 4;

    let decoded = Node::deserialize(4, &encode(&node, 256)).unwrap();

    assert_eq!(decoded, node);
    assert!(decoded.items[0].value.is_empty());
}

#[test]
fn test_full_page_round_trip() {
    // 3 + 2 + (2 + 10 + 2 + 45) = 64
    let mut node = Node::new_leaf(vec![Item::new(vec![7u8; 10], vec![9u8; 45])]);
    node.page_num = 1;
    assert_eq!(node.node_size(), 64);

    let decoded = Node::deserialize(1, &encode(&node, 64)).unwrap();

    assert_eq!(decoded, node);
}

#[test]
fn test_oversized_node_rejected() {
    let node = Node::new_leaf(vec![Item::new(vec![7u8; 10], vec![9u8; 46])]);
    let mut buf = vec![0u8; 64];

    let result = node.serialize(&mut buf);

    assert!(matches!(result, Err(AtlasError::InvariantViolation(_))));
}

// =============================================================================
// Search Tests
// =============================================================================

#[test]
fn test_search() {
    let node = leaf(&[(b"b", b""), (b"d", b""), (b"f", b"")]);

    assert_eq!(node.search(b"d"), Ok(1));
    assert_eq!(node.search(b"c"), Err(1));
    assert_eq!(node.search(b"a"), Err(0));
    assert_eq!(node.search(b"z"), Err(3));
}

#[test]
fn test_child_index_equal_key_goes_right() {
    let node = internal(&[b"b", b"d", b"f"], &[1, 2, 3, 4]);

    assert_eq!(node.child_index(b"a"), 0);
    assert_eq!(node.child_index(b"b"), 1);
    assert_eq!(node.child_index(b"c"), 1);
    assert_eq!(node.child_index(b"d"), 2);
    assert_eq!(node.child_index(b"z"), 3);
}

// =============================================================================
// Fill Tests
// =============================================================================

#[test]
fn test_fill_thresholds() {
    let fill = FillBounds::new(100, 0.5, 0.95);

    assert_eq!(fill.page_size(), 100);
    assert!(fill.is_under_populated(&small_leaf(3))); // 39 bytes
    assert!(!fill.is_under_populated(&small_leaf(4))); // 51 bytes
    assert!(!fill.is_over_populated(&small_leaf(7))); // 87 bytes
    assert!(fill.is_over_populated(&small_leaf(8))); // 99 bytes
}

#[test]
fn test_split_index_first_past_min() {
    let fill = FillBounds::new(100, 0.5, 0.95);

    // Running sizes 15, 27, 39, 51: item 3 crosses 50
    assert_eq!(fill.split_index(&small_leaf(5)), Some(4));
    assert!(fill.can_spare(&small_leaf(5)));
}

#[test]
fn test_split_index_never_last_item() {
    let fill = FillBounds::new(100, 0.5, 0.95);

    assert_eq!(fill.split_index(&small_leaf(4)), None);
    assert_eq!(fill.split_index(&small_leaf(1)), None);
    assert_eq!(fill.split_index(&Node::new_leaf(Vec::new())), None);
    assert!(!fill.can_spare(&small_leaf(4)));
}

// =============================================================================
// Split Tests
// =============================================================================

#[test]
fn test_leaf_split() {
    let mut node = small_leaf(5);

    let (separator, right) = node.split(2).unwrap();

    assert_eq!(separator, b"c".to_vec());
    assert_eq!(node.items.len(), 2);
    assert_eq!(right.items.len(), 3);
    assert_eq!(right.items[0].key, b"c".to_vec());
    assert!(right.is_leaf());
    assert_eq!(right.page_num, 0);
}

#[test]
fn test_internal_split_promotes_key() {
    let mut node = internal(&[b"a", b"b", b"c", b"d"], &[1, 2, 3, 4, 5]);

    let (separator, right) = node.split(2).unwrap();

    assert_eq!(separator, b"c".to_vec());
    assert_eq!(node.items.len(), 2);
    assert_eq!(node.children, vec![1, 2, 3]);
    assert_eq!(right.items, vec![Item::separator(b"d".to_vec())]);
    assert_eq!(right.children, vec![4, 5]);
}

#[test]
fn test_internal_split_keeps_right_key() {
    let mut node = internal(&[b"a", b"b", b"c", b"d"], &[1, 2, 3, 4, 5]);

    // Splitting at the last item would leave the right side keyless
    let (separator, right) = node.split(3).unwrap();

    assert_eq!(separator, b"c".to_vec());
    assert_eq!(right.items.len(), 1);
    assert_eq!(right.children.len(), 2);
}

#[test]
fn test_leaf_split_at_edge_rejected() {
    let mut node = small_leaf(3);

    assert!(matches!(node.split(0), Err(AtlasError::InvariantViolation(_))));
    assert!(matches!(node.split(3), Err(AtlasError::InvariantViolation(_))));
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_bad_leaf_flag_rejected() {
    let mut buf = encode(&small_leaf(2), 128);
    buf[0] = 7;

    assert!(matches!(
        Node::deserialize(1, &buf),
        Err(AtlasError::Corruption(_))
    ));
}

#[test]
fn test_count_past_page_rejected() {
    let mut buf = encode(&small_leaf(2), 128);
    buf[1..3].copy_from_slice(&1000u16.to_le_bytes());

    assert!(matches!(
        Node::deserialize(1, &buf),
        Err(AtlasError::Corruption(_))
    ));
}

#[test]
fn test_offset_past_page_rejected() {
    let mut buf = encode(&small_leaf(1), 64);
    buf[3..5].copy_from_slice(&1000u16.to_le_bytes());

    assert!(matches!(
        Node::deserialize(1, &buf),
        Err(AtlasError::Corruption(_))
    ));
}

#[test]
fn test_child_pointing_at_meta_rejected() {
    let buf = encode(&internal(&[b"m"], &[0, 4]), 64);

    assert!(matches!(
        Node::deserialize(1, &buf),
        Err(AtlasError::Corruption(_))
    ));
}

#[test]
fn test_keys_out_of_order_rejected() {
    let mut buf = encode(&leaf(&[(b"a", b"1"), (b"bc", b"22")]), 64);
    // Swap the two offset slots
    let first = [buf[3], buf[4]];
    buf.copy_within(5..7, 3);
    buf[5..7].copy_from_slice(&first);

    assert!(matches!(
        Node::deserialize(1, &buf),
        Err(AtlasError::Corruption(_))
    ));
}
