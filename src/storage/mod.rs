//! Storage Module
//!
//! Raw page I/O plus the two fixed records every database file carries.
//!
//! ## Responsibilities
//! - Read/write fixed-size pages at `page_num * page_size`
//! - Track reusable pages and the allocation high-water mark (freelist)
//! - Persist the root pointers (meta)
//!
//! ## File Layout
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Page 0: Meta                                             │
//! │   Magic u32 | PageSize u64 | Root u64 | Freelist u64 |   │
//! │   TxId u64                                               │
//! ├──────────────────────────────────────────────────────────┤
//! │ Page N (recorded in meta): Freelist                      │
//! │   MaxPage u64 | Count u64 | Count x PageNum u64          │
//! ├──────────────────────────────────────────────────────────┤
//! │ Every other allocated page: a B+Tree node                │
//! └──────────────────────────────────────────────────────────┘
//! ```
//! All integers are little-endian.

mod freelist;
mod meta;
mod pager;

pub use freelist::Freelist;
pub use meta::{Meta, MAGIC, META_PAGE_NUM, META_SIZE};
pub use pager::{Page, PageNum, Pager};
