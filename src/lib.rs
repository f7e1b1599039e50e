//! # AtlasDB
//!
//! An embedded, disk-backed key-value store with:
//! - A paged B+Tree per named collection
//! - An on-disk freelist for page reuse
//! - Copy-on-write write transactions with atomic commit
//! - Single-writer/multi-reader concurrency model
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Database                              │
//! │           (file, committed meta + freelist)                  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ read_tx() / write_tx()
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Transaction                             │
//! │        (snapshot / write permit, copy-on-write)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ Collections │          │ Collection  │
//!   │    tree     │─────────▶│   B+Tree    │
//!   └─────────────┘          └──────┬──────┘
//!                                   │
//!                                   ▼
//!                  ┌────────────────────────────────┐
//!                  │   Storage: pager, freelist,    │
//!                  │          meta page             │
//!                  └────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use atlasdb::{Database, Options};
//!
//! # fn main() -> atlasdb::Result<()> {
//! let db = Database::open("demo.atlas", Options::default())?;
//!
//! let mut tx = db.write_tx();
//! let mut users = tx.create_collection(b"users")?;
//! users.put(b"alice", b"admin")?;
//! tx.commit()?;
//!
//! let mut tx = db.read_tx();
//! let users = tx.get_collection(b"users")?;
//! assert_eq!(users.find(b"alice")?, b"admin");
//! tx.commit()?;
//!
//! db.close()
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod storage;
pub mod btree;
pub mod collection;
pub mod tx;
pub mod db;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use btree::Item;
pub use collection::Collection;
pub use config::Options;
pub use db::{Database, DbStats};
pub use error::{AtlasError, Result};
pub use storage::PageNum;
pub use tx::{Transaction, TxKind};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of AtlasDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
