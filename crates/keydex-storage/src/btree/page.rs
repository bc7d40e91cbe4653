//! B+Tree node pages with fixed-width keys.
//!
//! Every key in an index has the same width, so nodes store entries in a
//! dense sorted array instead of a slot directory.
//!
//! Leaf layout:
//! ```text
//! +------------------------+ 0
//! | Node Header (16 bytes) |
//! +------------------------+ 16
//! | key_0 | pointer_0 (4)  |
//! | key_1 | pointer_1      |
//! | ...                    |
//! +------------------------+
//! ```
//!
//! Internal layout:
//! ```text
//! +------------------------+ 0
//! | Node Header (16 bytes) |
//! +------------------------+ 16
//! | leftmost child (4)     |
//! | key_0 | child_0 (4)    |
//! | ...                    |
//! +------------------------+
//! ```
//! Keys greater than or equal to `key_i` live under `child_i`.

use super::constants::{CHILD_SIZE, NODE_BODY_SIZE, POINTER_SIZE};
use super::types::compare_keys;
use bytes::Bytes;
use keydex_common::page::{NULL_PAGE, NodeHeader, PAGE_SIZE, PageType};
use keydex_common::{KeydexError, Result};

/// B+ tree leaf page.
pub struct LeafNode {
    /// Page data buffer.
    data: Box<[u8; PAGE_SIZE]>,
    /// Width of every key.
    key_width: usize,
}

impl LeafNode {
    /// Entry data start offset after the node header.
    const DATA_START: usize = NodeHeader::SIZE;

    /// Maximum number of entries a leaf holds for the given key width.
    pub const fn capacity(key_width: usize) -> usize {
        NODE_BODY_SIZE / (key_width + POINTER_SIZE)
    }

    /// Creates a new empty leaf page.
    pub fn new(page_num: u32, key_width: usize) -> Self {
        let mut data = Box::new([0u8; PAGE_SIZE]);
        data[..NodeHeader::SIZE].copy_from_slice(&NodeHeader::leaf(page_num).to_bytes());
        Self { data, key_width }
    }

    /// Creates a leaf page from raw bytes.
    pub fn from_bytes(data: Box<[u8; PAGE_SIZE]>, key_width: usize) -> Self {
        Self { data, key_width }
    }

    /// Returns the raw page data.
    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    /// Returns the node header. Pages built by this module always decode.
    pub fn header(&self) -> Option<NodeHeader> {
        NodeHeader::from_bytes(&self.data[..NodeHeader::SIZE])
    }

    fn set_num_entries(&mut self, n: usize) {
        self.data[6..8].copy_from_slice(&(n as u16).to_le_bytes());
    }

    /// Returns the number of entries in this leaf.
    pub fn num_entries(&self) -> usize {
        u16::from_le_bytes([self.data[6], self.data[7]]) as usize
    }

    /// Returns the page type byte as stored.
    pub fn page_type(&self) -> Option<PageType> {
        PageType::from_u8(self.data[4])
    }

    /// Returns true if the leaf cannot take another entry.
    pub fn is_full(&self) -> bool {
        self.num_entries() >= Self::capacity(self.key_width)
    }

    #[inline]
    fn entry_size(&self) -> usize {
        self.key_width + POINTER_SIZE
    }

    #[inline]
    fn entry_offset(&self, idx: usize) -> usize {
        Self::DATA_START + idx * self.entry_size()
    }

    /// Returns the key at `idx`.
    #[inline]
    pub fn key_at(&self, idx: usize) -> &[u8] {
        let off = self.entry_offset(idx);
        &self.data[off..off + self.key_width]
    }

    /// Returns the raw record pointer at `idx`.
    #[inline]
    pub fn pointer_at(&self, idx: usize) -> u32 {
        let off = self.entry_offset(idx) + self.key_width;
        u32::from_le_bytes([
            self.data[off],
            self.data[off + 1],
            self.data[off + 2],
            self.data[off + 3],
        ])
    }

    /// Returns the next leaf page number.
    pub fn next_leaf(&self) -> Option<u32> {
        let next = u32::from_le_bytes([self.data[10], self.data[11], self.data[12], self.data[13]]);
        if next == NULL_PAGE { None } else { Some(next) }
    }

    /// Sets the next leaf page number.
    pub fn set_next_leaf(&mut self, page_num: Option<u32>) {
        let next = page_num.unwrap_or(NULL_PAGE);
        self.data[10..14].copy_from_slice(&next.to_le_bytes());
    }

    /// Binary search for a key. Returns Ok(index) if found, Err(index) for insertion point.
    pub fn search(&self, key: &[u8]) -> std::result::Result<usize, usize> {
        let mut low = 0usize;
        let mut high = self.num_entries();

        while low < high {
            let mid = low + (high - low) / 2;
            match compare_keys(key, self.key_at(mid)) {
                std::cmp::Ordering::Equal => return Ok(mid),
                std::cmp::Ordering::Less => high = mid,
                std::cmp::Ordering::Greater => low = mid + 1,
            }
        }
        Err(low)
    }

    /// Returns the index of the first entry whose key is not less than `probe`.
    /// The probe may be shorter than the key width.
    pub fn lower_bound(&self, probe: &[u8]) -> usize {
        let mut low = 0usize;
        let mut high = self.num_entries();

        while low < high {
            let mid = low + (high - low) / 2;
            if compare_keys(self.key_at(mid), probe).is_lt() {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        low
    }

    /// Inserts a key and record pointer in sorted position.
    /// Returns Ok(false) if the page is full, Err(DuplicateKey) if the key exists.
    pub fn insert(&mut self, key: &[u8], pointer: u32) -> Result<bool> {
        let idx = match self.search(key) {
            Ok(_) => return Err(KeydexError::DuplicateKey),
            Err(idx) => idx,
        };
        if self.is_full() {
            return Ok(false);
        }

        let num = self.num_entries();
        let entry_size = self.entry_size();
        let start = self.entry_offset(idx);
        let end = self.entry_offset(num);
        // Shift the tail one entry right
        self.data.copy_within(start..end, start + entry_size);

        self.data[start..start + self.key_width].copy_from_slice(key);
        self.data[start + self.key_width..start + entry_size]
            .copy_from_slice(&pointer.to_le_bytes());
        self.set_num_entries(num + 1);
        Ok(true)
    }

    /// Splits this leaf into two. Returns (split_key, new_right_page).
    pub fn split(&mut self, new_page_num: u32) -> (Bytes, LeafNode) {
        let num = self.num_entries();
        let mid = num / 2;

        let mut right = LeafNode::new(new_page_num, self.key_width);
        let start = self.entry_offset(mid);
        let end = self.entry_offset(num);
        right.data[Self::DATA_START..Self::DATA_START + (end - start)]
            .copy_from_slice(&self.data[start..end]);
        right.set_num_entries(num - mid);

        self.data[start..end].fill(0);
        self.set_num_entries(mid);

        // The split key is the first key of the right page
        let split_key = Bytes::copy_from_slice(right.key_at(0));

        // Link pages
        right.set_next_leaf(self.next_leaf());
        self.set_next_leaf(Some(new_page_num));

        (split_key, right)
    }
}

/// B+ tree internal page.
pub struct InternalNode {
    /// Page data buffer.
    data: Box<[u8; PAGE_SIZE]>,
    /// Width of every key.
    key_width: usize,
}

impl InternalNode {
    /// Leftmost child pointer offset after the node header.
    const LEFTMOST: usize = NodeHeader::SIZE;

    /// Separator entries start after the leftmost child.
    const DATA_START: usize = NodeHeader::SIZE + CHILD_SIZE;

    /// Maximum number of separator keys for the given key width.
    pub const fn capacity(key_width: usize) -> usize {
        (NODE_BODY_SIZE - CHILD_SIZE) / (key_width + CHILD_SIZE)
    }

    /// Creates a new empty internal page.
    pub fn new(page_num: u32, level: u16, key_width: usize) -> Self {
        let mut data = Box::new([0u8; PAGE_SIZE]);
        data[..NodeHeader::SIZE]
            .copy_from_slice(&NodeHeader::internal(page_num, level).to_bytes());
        Self { data, key_width }
    }

    /// Creates an internal page from raw bytes.
    pub fn from_bytes(data: Box<[u8; PAGE_SIZE]>, key_width: usize) -> Self {
        Self { data, key_width }
    }

    /// Returns the raw page data.
    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    /// Returns the number of separator keys.
    pub fn num_keys(&self) -> usize {
        u16::from_le_bytes([self.data[6], self.data[7]]) as usize
    }

    fn set_num_keys(&mut self, n: usize) {
        self.data[6..8].copy_from_slice(&(n as u16).to_le_bytes());
    }

    /// Returns the level of this node (1 = just above leaves).
    pub fn level(&self) -> u16 {
        u16::from_le_bytes([self.data[8], self.data[9]])
    }

    /// Returns the page type byte as stored.
    pub fn page_type(&self) -> Option<PageType> {
        PageType::from_u8(self.data[4])
    }

    #[inline]
    fn entry_size(&self) -> usize {
        self.key_width + CHILD_SIZE
    }

    #[inline]
    fn entry_offset(&self, idx: usize) -> usize {
        Self::DATA_START + idx * self.entry_size()
    }

    /// Returns the separator key at `idx`.
    pub fn key_at(&self, idx: usize) -> &[u8] {
        let off = self.entry_offset(idx);
        &self.data[off..off + self.key_width]
    }

    fn child_at(&self, idx: usize) -> u32 {
        let off = self.entry_offset(idx) + self.key_width;
        u32::from_le_bytes([
            self.data[off],
            self.data[off + 1],
            self.data[off + 2],
            self.data[off + 3],
        ])
    }

    /// Gets the leftmost child pointer.
    pub fn leftmost_child(&self) -> u32 {
        let o = Self::LEFTMOST;
        u32::from_le_bytes([self.data[o], self.data[o + 1], self.data[o + 2], self.data[o + 3]])
    }

    /// Sets the leftmost child pointer.
    pub fn set_leftmost_child(&mut self, page_num: u32) {
        let o = Self::LEFTMOST;
        self.data[o..o + CHILD_SIZE].copy_from_slice(&page_num.to_le_bytes());
    }

    /// Finds the child page for a given key. The key may be a shorter probe,
    /// in which case the leftmost subtree that can hold a match is chosen.
    pub fn find_child(&self, key: &[u8]) -> u32 {
        let mut low = 0usize;
        let mut high = self.num_keys();

        while low < high {
            let mid = low + (high - low) / 2;
            if compare_keys(key, self.key_at(mid)).is_lt() {
                high = mid;
            } else {
                low = mid + 1;
            }
        }

        if low == 0 {
            self.leftmost_child()
        } else {
            self.child_at(low - 1)
        }
    }

    /// Inserts a separator key and its right child pointer.
    /// Returns Ok(false) if the page is full.
    pub fn insert(&mut self, key: &[u8], right_child: u32) -> Result<bool> {
        let num = self.num_keys();
        if num >= Self::capacity(self.key_width) {
            return Ok(false);
        }

        let mut idx = 0;
        while idx < num && compare_keys(self.key_at(idx), key).is_lt() {
            idx += 1;
        }
        if idx < num && self.key_at(idx) == key {
            return Err(KeydexError::DuplicateKey);
        }

        let entry_size = self.entry_size();
        let start = self.entry_offset(idx);
        let end = self.entry_offset(num);
        self.data.copy_within(start..end, start + entry_size);
        self.data[start..start + self.key_width].copy_from_slice(key);
        self.data[start + self.key_width..start + entry_size]
            .copy_from_slice(&right_child.to_le_bytes());
        self.set_num_keys(num + 1);
        Ok(true)
    }

    /// Splits this internal node. Returns (promoted_key, new_right_page).
    pub fn split(&mut self, new_page_num: u32) -> (Bytes, InternalNode) {
        let num = self.num_keys();
        let mid = num / 2;

        let promoted_key = Bytes::copy_from_slice(self.key_at(mid));
        let mut right = InternalNode::new(new_page_num, self.level(), self.key_width);
        right.set_leftmost_child(self.child_at(mid));

        let start = self.entry_offset(mid + 1);
        let end = self.entry_offset(num);
        right.data[Self::DATA_START..Self::DATA_START + (end - start)]
            .copy_from_slice(&self.data[start..end]);
        right.set_num_keys(num - mid - 1);

        let promoted_start = self.entry_offset(mid);
        self.data[promoted_start..end].fill(0);
        self.set_num_keys(mid);

        (promoted_key, right)
    }
}
