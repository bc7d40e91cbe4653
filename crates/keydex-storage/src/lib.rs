//! Storage layer for keydex.
//!
//! This crate provides:
//! - Fixed-length record stores addressed by 1-based record pointers
//! - Page file I/O for index stores
//! - The B+ tree key index engine (build, traverse, search)
//! - Composite key encoding
//! - Foreign-key resolution with a single-entry cache

mod btree;
mod codec;
mod disk;
mod record;
mod resolver;

pub use btree::{
    Entries, IndexHandle, IndexHeader, IndexReader, IndexState, IndexWriter, InternalNode,
    KeyLookup, LeafNode, MAX_KEY_SIZE, OpenMode, SearchMode, WriteOutcome, compare_keys,
};
pub use codec::{
    FILLER, FieldSpec, KeyLayout, SUFFIX_WIDTH, TAG_WIDTH, normalize, ordinal_from_suffix,
    suffix_for, uniquing_suffix,
};
pub use disk::PageFile;
pub use record::{FileRecordStore, MemoryRecordStore, RecordStore};
pub use resolver::{Association, ForeignKeyResolver, ResolverStats};
