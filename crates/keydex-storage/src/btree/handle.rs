//! Single handle over either side of an index, for callers that pick the
//! open mode at runtime.

use super::index::IndexWriter;
use super::reader::IndexReader;
use super::types::{IndexState, SearchMode};
use keydex_common::{IndexEntry, KeydexConfig, KeydexError, RecordPointer, Result};

/// How an index store is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Truncate and build from scratch.
    Build,
    /// Open a finished index for traversal and search.
    Read,
}

/// An open index in either build or read state.
///
/// Operations that do not fit the current state fail with `InvalidState`
/// instead of being silently ignored.
pub enum IndexHandle {
    Building(IndexWriter),
    Readable(IndexReader),
}

impl IndexHandle {
    /// Opens the named index in `mode`.
    pub fn open(
        config: &KeydexConfig,
        mode: OpenMode,
        name: &str,
        key_width: usize,
    ) -> Result<Self> {
        match mode {
            OpenMode::Build => {
                IndexWriter::create(config, name, key_width).map(IndexHandle::Building)
            }
            OpenMode::Read => IndexReader::open(config, name, key_width).map(IndexHandle::Readable),
        }
    }

    /// Returns the index name.
    pub fn name(&self) -> &str {
        match self {
            IndexHandle::Building(w) => w.name(),
            IndexHandle::Readable(r) => r.name(),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> IndexState {
        match self {
            IndexHandle::Building(_) => IndexState::Building,
            IndexHandle::Readable(r) => r.state(),
        }
    }

    /// Inserts a key. Only legal while building.
    pub fn write(&mut self, key: &[u8], pointer: RecordPointer) -> Result<RecordPointer> {
        match self {
            IndexHandle::Building(w) => w.write(key, pointer),
            IndexHandle::Readable(r) => Err(invalid("write", r.state())),
        }
    }

    /// Positions on the lowest key. Only legal once the build is closed.
    pub fn first(&mut self) -> Result<Option<IndexEntry>> {
        self.reader_mut("first")?.first()
    }

    /// Returns the next entry in key order.
    pub fn read(&mut self) -> Result<Option<IndexEntry>> {
        self.reader_mut("read")?.read()
    }

    /// Looks up a key without moving the cursor.
    pub fn search(&mut self, key: &[u8], mode: SearchMode) -> Result<Option<RecordPointer>> {
        self.reader_mut("search")?.search(key, mode)
    }

    /// Finishes a build and returns the handle in read state.
    /// Closing a reader just hands it back.
    pub fn close(self) -> Result<Self> {
        match self {
            IndexHandle::Building(w) => w.finish().map(IndexHandle::Readable),
            readable @ IndexHandle::Readable(_) => Ok(readable),
        }
    }

    /// Unwraps the reader, if the handle is in read state.
    pub fn into_reader(self) -> Result<IndexReader> {
        match self {
            IndexHandle::Readable(r) => Ok(r),
            IndexHandle::Building(_) => Err(invalid("into_reader", IndexState::Building)),
        }
    }

    fn reader_mut(&mut self, operation: &'static str) -> Result<&mut IndexReader> {
        match self {
            IndexHandle::Readable(r) => Ok(r),
            IndexHandle::Building(_) => Err(invalid(operation, IndexState::Building)),
        }
    }
}

fn invalid(operation: &'static str, state: IndexState) -> KeydexError {
    KeydexError::InvalidState {
        operation,
        state: state.name(),
    }
}
