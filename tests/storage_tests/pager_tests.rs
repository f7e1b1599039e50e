//! Tests for Pager
//!
//! These tests verify:
//! - Empty pages are zero-filled and page-sized
//! - Pages land at `num * page_size`
//! - Reading past the end of the file is an I/O error

use std::fs;

use atlasdb::storage::{Page, Pager};
use atlasdb::AtlasError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_pager(page_size: usize) -> (TempDir, Pager) {
    let temp_dir = TempDir::new().unwrap();
    let pager = Pager::open(&temp_dir.path().join("pages.db"), page_size).unwrap();
    (temp_dir, pager)
}

fn filled_page(pager: &Pager, num: u64, byte: u8) -> Page {
    let mut page = pager.allocate_empty_page();
    page.num = num;
    page.data.fill(byte);
    page
}

// =============================================================================
// Allocation Tests
// =============================================================================

#[test]
fn test_empty_page_is_zeroed() {
    let (_temp, pager) = setup_temp_pager(512);

    let page = pager.allocate_empty_page();

    assert_eq!(page.data.len(), 512);
    assert!(page.data.iter().all(|&b| b == 0));
    assert_eq!(pager.page_size(), 512);
}

// =============================================================================
// Read/Write Tests
// =============================================================================

#[test]
fn test_write_then_read_page() {
    let (_temp, pager) = setup_temp_pager(256);

    pager.write_page(&filled_page(&pager, 3, 0xAB)).unwrap();
    let page = pager.read_page(3).unwrap();

    assert_eq!(page.num, 3);
    assert!(page.data.iter().all(|&b| b == 0xAB));
}

#[test]
fn test_page_written_at_offset() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("pages.db");
    let pager = Pager::open(&path, 256).unwrap();

    pager.write_page(&filled_page(&pager, 2, 0x11)).unwrap();
    pager.sync().unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 3 * 256);
    assert!(bytes[..512].iter().all(|&b| b == 0));
    assert!(bytes[512..].iter().all(|&b| b == 0x11));
    assert_eq!(pager.file_len().unwrap(), 768);
}

#[test]
fn test_overwrite_keeps_neighbours() {
    let (_temp, pager) = setup_temp_pager(256);

    pager.write_page(&filled_page(&pager, 1, 1)).unwrap();
    pager.write_page(&filled_page(&pager, 2, 2)).unwrap();
    pager.write_page(&filled_page(&pager, 1, 9)).unwrap();

    assert!(pager.read_page(1).unwrap().data.iter().all(|&b| b == 9));
    assert!(pager.read_page(2).unwrap().data.iter().all(|&b| b == 2));
}

#[test]
fn test_read_past_end_is_io_error() {
    let (_temp, pager) = setup_temp_pager(256);
    pager.write_page(&filled_page(&pager, 0, 7)).unwrap();

    let result = pager.read_page(5);

    assert!(matches!(result, Err(AtlasError::Io(_))));
}

#[test]
fn test_wrong_buffer_size_rejected() {
    let (_temp, pager) = setup_temp_pager(256);
    let page = Page {
        num: 1,
        data: vec![0u8; 100],
    };

    let result = pager.write_page(&page);

    assert!(matches!(result, Err(AtlasError::InvariantViolation(_))));
}

#[test]
fn test_read_at_absolute_offset() {
    let (_temp, pager) = setup_temp_pager(256);
    let mut page = pager.allocate_empty_page();
    page.data[10..14].copy_from_slice(&[1, 2, 3, 4]);
    pager.write_page(&page).unwrap();

    let mut buf = [0u8; 4];
    pager.read_at(10, &mut buf).unwrap();

    assert_eq!(buf, [1, 2, 3, 4]);
}

#[test]
fn test_open_does_not_truncate() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("pages.db");
    {
        let pager = Pager::open(&path, 256).unwrap();
        pager.write_page(&filled_page(&pager, 1, 5)).unwrap();
        pager.sync().unwrap();
    }

    let pager = Pager::open(&path, 256).unwrap();

    assert_eq!(pager.file_len().unwrap(), 512);
    assert!(pager.read_page(1).unwrap().data.iter().all(|&b| b == 5));
}
