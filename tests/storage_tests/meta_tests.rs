//! Tests for Meta
//!
//! These tests verify:
//! - The fixed byte layout of page 0
//! - Magic number validation

use atlasdb::storage::{Meta, MAGIC, META_SIZE};
use atlasdb::AtlasError;

#[test]
fn test_byte_layout() {
    let mut meta = Meta::new(4096, 2, 1);
    meta.set_txid(9);

    let mut buf = vec![0u8; 64];
    meta.serialize(&mut buf).unwrap();

    assert_eq!(&buf[0..4], &MAGIC.to_le_bytes());
    assert_eq!(&buf[4..12], &4096u64.to_le_bytes());
    assert_eq!(&buf[12..20], &2u64.to_le_bytes());
    assert_eq!(&buf[20..28], &1u64.to_le_bytes());
    assert_eq!(&buf[28..36], &9u64.to_le_bytes());
    assert!(buf[META_SIZE..].iter().all(|&b| b == 0));
}

#[test]
fn test_round_trip() {
    let mut meta = Meta::new(1024, 17, 3);
    meta.set_root(42);
    meta.set_txid(5);

    let mut buf = vec![0u8; 1024];
    meta.serialize(&mut buf).unwrap();
    let decoded = Meta::deserialize(&buf).unwrap();

    assert_eq!(decoded, meta);
    assert_eq!(decoded.root(), 42);
    assert_eq!(decoded.freelist_page(), 3);
    assert_eq!(decoded.page_size(), 1024);
    assert_eq!(decoded.txid(), 5);
}

#[test]
fn test_bad_magic_rejected() {
    let mut buf = vec![0u8; 64];
    Meta::new(4096, 2, 1).serialize(&mut buf).unwrap();
    buf[0] ^= 0xFF;

    let result = Meta::deserialize(&buf);

    assert!(matches!(result, Err(AtlasError::Corruption(_))));
}

#[test]
fn test_truncated_rejected() {
    let mut buf = vec![0u8; 64];
    Meta::new(4096, 2, 1).serialize(&mut buf).unwrap();

    let result = Meta::deserialize(&buf[..20]);

    assert!(matches!(result, Err(AtlasError::Corruption(_))));
}

#[test]
fn test_small_buffer_rejected() {
    let mut buf = vec![0u8; 10];

    let result = Meta::new(4096, 2, 1).serialize(&mut buf);

    assert!(matches!(result, Err(AtlasError::InvariantViolation(_))));
}
