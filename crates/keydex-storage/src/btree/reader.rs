//! Index reader: ordered traversal and key search over a finished index.

use super::constants::{FIRST_NODE_PAGE, HEADER_PAGE};
use super::page::{InternalNode, LeafNode};
use super::types::{IndexHeader, IndexState, SearchMode, compare_keys};
use crate::disk::PageFile;
use bytes::Bytes;
use keydex_common::page::PageType;
use keydex_common::{
    IndexEntry, KeydexConfig, KeydexError, RecordPointer, Result, display_key,
};
use tracing::{debug, error};

/// Anything that maps a key to a record pointer.
///
/// The foreign-key resolver is generic over this so tests can count lookups.
pub trait KeyLookup {
    /// Returns the pointer stored for `key`, or `None` if it is absent.
    fn lookup(&mut self, key: &[u8], mode: SearchMode) -> Result<Option<RecordPointer>>;
}

/// Position of the traversal cursor.
struct Position {
    leaf: LeafNode,
    slot: usize,
    /// Entries returned since FIRST, this one included.
    visited: u64,
    last_key: Bytes,
}

enum Cursor {
    Unpositioned,
    On(Position),
    End,
    Halted,
}

/// Read handle on a finished index store.
///
/// Pages are read on demand. Traversal verifies ordering as it goes: a key
/// lower than its predecessor halts the cursor with `OutOfOrder`, and any
/// structural damage halts it with `IndexCorrupted`. A halted reader stays
/// halted until `first` is called again.
pub struct IndexReader {
    name: String,
    file: PageFile,
    header: IndexHeader,
    key_width: usize,
    cursor: Cursor,
}

impl IndexReader {
    /// Opens the named index for reading.
    ///
    /// Fails with `IncompleteIndex` if its build never finished and with
    /// `KeyWidthMismatch` if the store was built for a different key width.
    pub fn open(config: &KeydexConfig, name: &str, key_width: usize) -> Result<Self> {
        let path = config.index_path(name);
        let file = PageFile::open(&path, config.fsync_enabled)?;
        debug!(index = name, path = %path.display(), "opened index for read");
        Self::attach(name.to_string(), file, Some(key_width))
    }

    /// Validates the header of an already opened store.
    pub(crate) fn attach(
        name: String,
        mut file: PageFile,
        key_width: Option<usize>,
    ) -> Result<Self> {
        if file.num_pages() == 0 {
            return Err(KeydexError::IndexCorrupted {
                index: name,
                reason: "store has no header page".to_string(),
            });
        }

        let header = IndexHeader::from_page(&name, &*file.read_page(HEADER_PAGE)?)?;
        if !header.complete {
            return Err(KeydexError::IncompleteIndex(name));
        }
        match key_width {
            Some(expected) if expected != header.key_width as usize => {
                return Err(KeydexError::KeyWidthMismatch {
                    expected,
                    actual: header.key_width as usize,
                });
            }
            _ => {}
        }
        if header.page_count > file.num_pages() {
            return Err(KeydexError::IndexCorrupted {
                reason: format!(
                    "store truncated: header records {} pages, file has {}",
                    header.page_count,
                    file.num_pages()
                ),
                index: name,
            });
        }
        if header.height == 0
            || header.key_width == 0
            || header.root_page < FIRST_NODE_PAGE
            || header.root_page >= header.page_count
        {
            return Err(KeydexError::IndexCorrupted {
                index: name,
                reason: "header describes an invalid tree".to_string(),
            });
        }

        Ok(Self {
            key_width: header.key_width as usize,
            name,
            file,
            header,
            cursor: Cursor::Unpositioned,
        })
    }

    /// Returns the index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the key width recorded in the store.
    pub fn key_width(&self) -> usize {
        self.key_width
    }

    /// Returns the number of entries recorded in the store.
    pub fn len(&self) -> u64 {
        self.header.entry_count
    }

    /// Returns true if the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.header.entry_count == 0
    }

    /// Returns the traversal state.
    pub fn state(&self) -> IndexState {
        match self.cursor {
            Cursor::Unpositioned => IndexState::Readable,
            Cursor::On(_) => IndexState::Positioned,
            Cursor::End => IndexState::AtEnd,
            Cursor::Halted => IndexState::Halted,
        }
    }

    /// Positions the cursor on the lowest key and returns that entry.
    ///
    /// Returns `None` for an empty index.
    pub fn first(&mut self) -> Result<Option<IndexEntry>> {
        self.cursor = Cursor::Halted;
        let leaf = self.leftmost_leaf()?;
        self.settle(leaf, 0, 0, None)
    }

    /// Advances the cursor and returns the next entry in ascending key order.
    ///
    /// An unpositioned cursor behaves as `first`. Past the last entry this
    /// keeps returning `None`.
    pub fn read(&mut self) -> Result<Option<IndexEntry>> {
        match std::mem::replace(&mut self.cursor, Cursor::Halted) {
            Cursor::Unpositioned => self.first(),
            Cursor::On(pos) => self.settle(pos.leaf, pos.slot + 1, pos.visited, Some(pos.last_key)),
            Cursor::End => {
                self.cursor = Cursor::End;
                Ok(None)
            }
            Cursor::Halted => {
                Err(self.corrupted("traversal halted after an earlier failure".to_string()))
            }
        }
    }

    /// Finds the record pointer for `key`. Does not move the traversal cursor.
    ///
    /// With `SearchMode::Prefix(n)` only the first `n` bytes of `key` are
    /// compared and the lowest matching entry wins.
    pub fn search(&mut self, key: &[u8], mode: SearchMode) -> Result<Option<RecordPointer>> {
        let probe = match mode {
            SearchMode::Exact => {
                if key.len() != self.key_width {
                    return Err(KeydexError::KeyWidthMismatch {
                        expected: self.key_width,
                        actual: key.len(),
                    });
                }
                key
            }
            SearchMode::Prefix(len) => {
                if len > self.key_width {
                    return Err(KeydexError::KeyTooLarge {
                        size: len,
                        max: self.key_width,
                    });
                }
                if len > key.len() {
                    return Err(KeydexError::KeyWidthMismatch {
                        expected: len,
                        actual: key.len(),
                    });
                }
                &key[..len]
            }
        };

        let mut current = self.header.root_page;
        for level in (1..self.header.height).rev() {
            let node = self.load_internal(current, level as u16)?;
            current = node.find_child(probe);
        }

        let mut leaf = self.load_leaf(current)?;
        let mut slot = leaf.lower_bound(probe);
        let mut hops = 0u32;
        while slot >= leaf.num_entries() {
            match leaf.next_leaf() {
                Some(next) => {
                    hops += 1;
                    if hops > self.header.page_count {
                        return Err(self.corrupted("leaf chain does not terminate".to_string()));
                    }
                    leaf = self.load_leaf(next)?;
                    slot = leaf.lower_bound(probe);
                }
                None => return Ok(None),
            }
        }

        let found = leaf.key_at(slot);
        let matched = match mode {
            SearchMode::Exact => found == probe,
            SearchMode::Prefix(_) => found.starts_with(probe),
        };
        if !matched {
            return Ok(None);
        }
        let raw = leaf.pointer_at(slot);
        RecordPointer::new(raw)
            .map(Some)
            .ok_or_else(|| self.corrupted("entry holds a null record pointer".to_string()))
    }

    /// Iterates every entry from the lowest key. Stops after the first error.
    pub fn entries(&mut self) -> Entries<'_> {
        Entries {
            reader: self,
            started: false,
            done: false,
        }
    }

    /// Returns the entry at (`leaf`, `slot`), following the leaf chain past
    /// exhausted leaves, and leaves the cursor on it.
    fn settle(
        &mut self,
        mut leaf: LeafNode,
        mut slot: usize,
        visited: u64,
        last_key: Option<Bytes>,
    ) -> Result<Option<IndexEntry>> {
        let mut hops = 0u32;
        while slot >= leaf.num_entries() {
            match leaf.next_leaf() {
                Some(next) => {
                    hops += 1;
                    if hops > self.header.page_count {
                        return Err(self.corrupted("leaf chain does not terminate".to_string()));
                    }
                    leaf = self.load_leaf(next)?;
                    slot = 0;
                }
                None => {
                    if visited != self.header.entry_count {
                        return Err(self.corrupted(format!(
                            "traversal found {} entries, header records {}",
                            visited, self.header.entry_count
                        )));
                    }
                    self.cursor = Cursor::End;
                    return Ok(None);
                }
            }
        }

        let key = Bytes::copy_from_slice(leaf.key_at(slot));
        let visited = visited + 1;

        let out_of_order = last_key
            .as_ref()
            .filter(|previous| compare_keys(&key, previous).is_lt());
        if let Some(previous) = out_of_order {
            error!(
                index = %self.name,
                position = visited,
                previous = %display_key(previous),
                current = %display_key(&key),
                "index keys out of order, traversal halted"
            );
            return Err(KeydexError::OutOfOrder {
                index: self.name.clone(),
                position: visited,
                previous: display_key(previous),
                current: display_key(&key),
            });
        }
        if visited > self.header.entry_count {
            return Err(self.corrupted(format!(
                "traversal found more entries than the {} recorded",
                self.header.entry_count
            )));
        }

        let pointer = RecordPointer::new(leaf.pointer_at(slot)).ok_or_else(|| {
            self.corrupted(format!("entry {} holds a null record pointer", visited))
        })?;

        self.cursor = Cursor::On(Position {
            leaf,
            slot,
            visited,
            last_key: key.clone(),
        });
        Ok(Some(IndexEntry { key, pointer }))
    }

    fn leftmost_leaf(&mut self) -> Result<LeafNode> {
        let mut current = self.header.root_page;
        for level in (1..self.header.height).rev() {
            current = self.load_internal(current, level as u16)?.leftmost_child();
        }
        self.load_leaf(current)
    }

    fn read_node(&mut self, page_num: u32) -> Result<Box<[u8; keydex_common::PAGE_SIZE]>> {
        if page_num < FIRST_NODE_PAGE || page_num >= self.header.page_count {
            return Err(self.corrupted(format!("page {} out of range", page_num)));
        }
        self.file.read_page(page_num)
    }

    fn load_leaf(&mut self, page_num: u32) -> Result<LeafNode> {
        let leaf = LeafNode::from_bytes(self.read_node(page_num)?, self.key_width);
        if leaf.page_type() != Some(PageType::Leaf) {
            return Err(self.corrupted(format!("page {} is not a leaf", page_num)));
        }
        if leaf.num_entries() > LeafNode::capacity(self.key_width) {
            return Err(self.corrupted(format!("leaf {} entry count out of range", page_num)));
        }
        Ok(leaf)
    }

    fn load_internal(&mut self, page_num: u32, level: u16) -> Result<InternalNode> {
        let node = InternalNode::from_bytes(self.read_node(page_num)?, self.key_width);
        if node.page_type() != Some(PageType::Internal) || node.level() != level {
            return Err(self.corrupted(format!(
                "page {} is not an internal node at level {}",
                page_num, level
            )));
        }
        if node.num_keys() > InternalNode::capacity(self.key_width) {
            return Err(self.corrupted(format!("node {} key count out of range", page_num)));
        }
        Ok(node)
    }

    fn corrupted(&self, reason: String) -> KeydexError {
        error!(index = %self.name, %reason, "index corrupted");
        KeydexError::IndexCorrupted {
            index: self.name.clone(),
            reason,
        }
    }
}

impl KeyLookup for IndexReader {
    fn lookup(&mut self, key: &[u8], mode: SearchMode) -> Result<Option<RecordPointer>> {
        self.search(key, mode)
    }
}

/// Iterator over index entries in ascending key order.
pub struct Entries<'a> {
    reader: &'a mut IndexReader,
    started: bool,
    done: bool,
}

impl Iterator for Entries<'_> {
    type Item = Result<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = if self.started {
            self.reader.read()
        } else {
            self.started = true;
            self.reader.first()
        };
        match result {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
