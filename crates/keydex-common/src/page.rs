//! Page structures for index stores.

use serde::{Deserialize, Serialize};

/// Page size in bytes for index stores (4 KB).
pub const PAGE_SIZE: usize = 4 * 1024;

/// Page number sentinel meaning "no page".
pub const NULL_PAGE: u32 = u32::MAX;

/// Page types in an index store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PageType {
    /// Unallocated page.
    Free = 0,
    /// Store header (page 0).
    Header = 1,
    /// B+ tree leaf page.
    Leaf = 2,
    /// B+ tree internal page.
    Internal = 3,
}

impl PageType {
    /// Decodes a page type byte. Unknown values return None.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PageType::Free),
            1 => Some(PageType::Header),
            2 => Some(PageType::Leaf),
            3 => Some(PageType::Internal),
            _ => None,
        }
    }
}

/// Header at the beginning of every B+ tree node page.
///
/// Layout (16 bytes total):
/// - page_num: 4 bytes
/// - page_type: 1 byte
/// - reserved: 1 byte
/// - num_entries: 2 bytes
/// - level: 2 bytes (0 = leaf)
/// - next_page: 4 bytes (right sibling for leaves, NULL_PAGE otherwise)
/// - reserved: 2 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHeader {
    /// Page number of this node.
    pub page_num: u32,
    /// Type of this node.
    pub page_type: PageType,
    /// Number of entries (leaf) or separator keys (internal).
    pub num_entries: u16,
    /// Level in the tree (0 = leaf).
    pub level: u16,
    /// Right sibling for leaves.
    pub next_page: u32,
}

impl NodeHeader {
    /// Size of the node header in bytes.
    pub const SIZE: usize = 16;

    /// Creates a header for an empty leaf.
    pub fn leaf(page_num: u32) -> Self {
        Self {
            page_num,
            page_type: PageType::Leaf,
            num_entries: 0,
            level: 0,
            next_page: NULL_PAGE,
        }
    }

    /// Creates a header for an empty internal node.
    pub fn internal(page_num: u32, level: u16) -> Self {
        Self {
            page_num,
            page_type: PageType::Internal,
            num_entries: 0,
            level,
            next_page: NULL_PAGE,
        }
    }

    /// Serializes the header to bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.page_num.to_le_bytes());
        buf[4] = self.page_type as u8;
        buf[6..8].copy_from_slice(&self.num_entries.to_le_bytes());
        buf[8..10].copy_from_slice(&self.level.to_le_bytes());
        buf[10..14].copy_from_slice(&self.next_page.to_le_bytes());
        // bytes 5 and 14-15 are reserved (already zeroed)
        buf
    }

    /// Deserializes the header from bytes. Returns None for an unknown page type.
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        let page_type = PageType::from_u8(buf[4])?;
        Some(Self {
            page_num: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            page_type,
            num_entries: u16::from_le_bytes([buf[6], buf[7]]),
            level: u16::from_le_bytes([buf[8], buf[9]]),
            next_page: u32::from_le_bytes([buf[10], buf[11], buf[12], buf[13]]),
        })
    }
}
