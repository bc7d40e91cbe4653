//! Index builder: the write side of the key index engine.

use super::constants::{HEADER_PAGE, MAX_HEIGHT, MAX_KEY_SIZE};
use super::page::{InternalNode, LeafNode};
use super::reader::IndexReader;
use super::store::NodeStore;
use super::types::{IndexHeader, WriteOutcome};
use crate::disk::PageFile;
use bytes::Bytes;
use keydex_common::page::PAGE_SIZE;
use keydex_common::{KeydexConfig, KeydexError, RecordPointer, Result};
use tracing::{debug, info, warn};

/// Builds one index store in a single pass.
///
/// Opening a writer truncates the store and marks it incomplete on disk.
/// Nodes are kept in memory while building; `finish` writes every page and
/// then the header with the complete flag. A writer dropped before `finish`
/// leaves a store that readers refuse to open.
pub struct IndexWriter {
    /// Index name (file stem).
    name: String,
    /// Backing store file.
    file: PageFile,
    /// Node pages built so far.
    pages: NodeStore,
    /// Root page number.
    root_page: u32,
    /// Tree height (1 = just root as leaf).
    height: u32,
    /// Width of every key.
    key_width: usize,
    /// Entries inserted.
    entries: u64,
    /// Maximum number of entries.
    capacity: u64,
    /// Writes skipped by write_clamped.
    clamped: u64,
}

impl IndexWriter {
    /// Creates (or truncates) the named index store and prepares an empty tree.
    pub fn create(config: &KeydexConfig, name: &str, key_width: usize) -> Result<Self> {
        config.validate()?;
        if key_width == 0 {
            return Err(KeydexError::ConfigError(
                "key width must be positive".to_string(),
            ));
        }
        if key_width > MAX_KEY_SIZE {
            return Err(KeydexError::KeyTooLarge {
                size: key_width,
                max: MAX_KEY_SIZE,
            });
        }

        let path = config.index_path(name);
        let mut file = PageFile::create(&path, config.fsync_enabled)?;
        file.write_page(HEADER_PAGE, &IndexHeader::new(key_width as u16).to_page())?;

        let mut pages = NodeStore::new();
        let root_page = pages.allocate();
        pages.write(root_page, LeafNode::new(root_page, key_width).as_bytes());

        debug!(index = name, path = %path.display(), key_width, "opened index for build");

        Ok(Self {
            name: name.to_string(),
            file,
            pages,
            root_page,
            height: 1,
            key_width,
            entries: 0,
            capacity: config.max_index_entries,
            clamped: 0,
        })
    }

    /// Returns the index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the key width.
    pub fn key_width(&self) -> usize {
        self.key_width
    }

    /// Returns the number of entries written.
    pub fn len(&self) -> u64 {
        self.entries
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Returns the configured capacity.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Returns the number of writes skipped because the index was full.
    pub fn clamped(&self) -> u64 {
        self.clamped
    }

    /// Returns the tree height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Inserts `key` for the record at `pointer` and returns the pointer.
    ///
    /// Fails with `IndexFull` at capacity and `DuplicateKey` if the key is
    /// already present; the tree is unchanged in both cases.
    pub fn write(&mut self, key: &[u8], pointer: RecordPointer) -> Result<RecordPointer> {
        if key.len() != self.key_width {
            return Err(KeydexError::KeyWidthMismatch {
                expected: self.key_width,
                actual: key.len(),
            });
        }
        if self.entries >= self.capacity {
            return Err(KeydexError::IndexFull {
                capacity: self.capacity,
            });
        }

        self.insert(key, pointer.get())?;
        self.entries += 1;
        Ok(pointer)
    }

    /// Like `write`, but a full index skips the key instead of failing.
    ///
    /// The first skipped key is logged; the total is available from
    /// `clamped()` and is logged again when the build finishes.
    pub fn write_clamped(&mut self, key: &[u8], pointer: RecordPointer) -> Result<WriteOutcome> {
        match self.write(key, pointer) {
            Ok(_) => Ok(WriteOutcome::Inserted),
            Err(KeydexError::IndexFull { capacity }) => {
                if self.clamped == 0 {
                    warn!(index = %self.name, capacity, "index full, skipping remaining records");
                }
                self.clamped += 1;
                Ok(WriteOutcome::Clamped)
            }
            Err(e) => Err(e),
        }
    }

    /// Writes every node and a complete header, then reopens the store for reading.
    pub fn finish(mut self) -> Result<IndexReader> {
        for (page_num, data) in self.pages.iter() {
            self.file.write_page(page_num, data)?;
        }

        let header = IndexHeader {
            key_width: self.key_width as u16,
            root_page: self.root_page,
            height: self.height,
            entry_count: self.entries,
            page_count: self.pages.len() as u32 + 1,
            complete: true,
        };
        self.file.write_page(HEADER_PAGE, &header.to_page())?;
        self.file.sync()?;

        info!(
            index = %self.name,
            entries = self.entries,
            pages = header.page_count,
            height = self.height,
            "index build finished"
        );
        if self.clamped > 0 {
            warn!(
                index = %self.name,
                skipped = self.clamped,
                capacity = self.capacity,
                "index build truncated at capacity"
            );
        }

        IndexReader::attach(self.name, self.file, Some(self.key_width))
    }

    fn node(&self, page_num: u32) -> Result<Box<[u8; PAGE_SIZE]>> {
        self.pages
            .get(page_num)
            .map(|data| Box::new(*data))
            .ok_or_else(|| KeydexError::IndexCorrupted {
                index: self.name.clone(),
                reason: format!("node {} not found", page_num),
            })
    }

    /// Descends to the leaf for `key`, splitting on the way back up when needed.
    fn insert(&mut self, key: &[u8], pointer: u32) -> Result<()> {
        let mut path = [0u32; MAX_HEIGHT];
        let mut path_len = 0;
        let mut current = self.root_page;

        path[path_len] = current;
        path_len += 1;

        for _ in 1..self.height {
            let internal = InternalNode::from_bytes(self.node(current)?, self.key_width);
            current = internal.find_child(key);
            path[path_len] = current;
            path_len += 1;
        }

        // Fast path: room in the leaf
        let mut leaf = LeafNode::from_bytes(self.node(current)?, self.key_width);
        if leaf.insert(key, pointer)? {
            self.pages.write(current, leaf.as_bytes());
            return Ok(());
        }

        // Split the leaf
        let new_page_num = self.pages.allocate();
        let (split_key, mut right_leaf) = leaf.split(new_page_num);

        let inserted = if key < split_key.as_ref() {
            leaf.insert(key, pointer)?
        } else {
            right_leaf.insert(key, pointer)?
        };
        debug_assert!(inserted, "half-empty leaf rejected an insert");

        self.pages.write(current, leaf.as_bytes());
        self.pages.write(new_page_num, right_leaf.as_bytes());

        if path_len < 2 {
            // Root was a leaf, create new root
            self.create_new_root(split_key, new_page_num)
        } else {
            self.propagate_split(split_key, new_page_num, &path[..path_len])
        }
    }

    /// Inserts a separator into each ancestor, splitting full ones.
    fn propagate_split(&mut self, key: Bytes, new_child: u32, path: &[u32]) -> Result<()> {
        let mut current_key = key;
        let mut current_child = new_child;
        let mut parent_idx = path.len() - 2;

        loop {
            let parent_page_num = path[parent_idx];
            let mut parent = InternalNode::from_bytes(self.node(parent_page_num)?, self.key_width);

            if parent.insert(&current_key, current_child)? {
                self.pages.write(parent_page_num, parent.as_bytes());
                return Ok(());
            }

            // Split the internal node
            let new_page_num = self.pages.allocate();
            let (promoted_key, mut right_internal) = parent.split(new_page_num);

            let inserted = if current_key.as_ref() < promoted_key.as_ref() {
                parent.insert(&current_key, current_child)?
            } else {
                right_internal.insert(&current_key, current_child)?
            };
            debug_assert!(inserted, "half-empty internal node rejected an insert");

            self.pages.write(parent_page_num, parent.as_bytes());
            self.pages.write(new_page_num, right_internal.as_bytes());

            if parent_idx == 0 {
                return self.create_new_root(promoted_key, new_page_num);
            }

            current_key = promoted_key;
            current_child = new_page_num;
            parent_idx -= 1;
        }
    }

    /// Creates a new root above the old one after the old root split.
    fn create_new_root(&mut self, key: Bytes, right_child: u32) -> Result<()> {
        if self.height as usize >= MAX_HEIGHT {
            return Err(KeydexError::Storage(format!(
                "index {} reached the maximum tree height",
                self.name
            )));
        }

        let new_root_num = self.pages.allocate();
        let mut new_root = InternalNode::new(new_root_num, self.height as u16, self.key_width);
        new_root.set_leftmost_child(self.root_page);
        new_root.insert(&key, right_child)?;

        self.pages.write(new_root_num, new_root.as_bytes());

        self.root_page = new_root_num;
        self.height += 1;

        debug!(index = %self.name, height = self.height, "index root split");
        Ok(())
    }
}
