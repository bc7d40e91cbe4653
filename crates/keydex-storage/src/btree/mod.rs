//! B+ tree key index over fixed-width keys.
//!
//! An index store is a page file:
//!
//! ```text
//! page 0      header (magic, key width, root, height, entry count, complete flag, CRC)
//! page 1..n   leaf and internal nodes
//! ```
//!
//! Builds run in memory with exclusive access (`&mut self`) and are written
//! out in one pass by [`IndexWriter::finish`]. The header is written last, so
//! a store whose build was interrupted is recognised on open.
//!
//! Leaves are chained left to right. [`IndexReader`] walks the chain for
//! ordered traversal and checks that keys never decrease; readers therefore
//! detect damaged stores instead of returning mis-ordered data.
//!
//! Every key has the same width. A leaf holds `(key, record pointer)`
//! entries in a dense sorted array; record pointers are 1-based and 0 never
//! appears in a valid entry.

mod constants;
mod handle;
mod index;
mod page;
mod reader;
mod store;
mod types;

pub use constants::MAX_KEY_SIZE;
pub use handle::{IndexHandle, OpenMode};
pub use index::IndexWriter;
pub use page::{InternalNode, LeafNode};
pub use reader::{Entries, IndexReader, KeyLookup};
pub use types::{IndexHeader, IndexState, SearchMode, WriteOutcome, compare_keys};
