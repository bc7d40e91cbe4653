//! Common types for the index engine.

use keydex_common::page::PAGE_SIZE;
use keydex_common::{KeydexError, Result};

/// Key comparison using u64 prefix for 8+ byte keys.
/// Falls back to slice comparison for shorter keys or when prefix matches.
///
/// The result is plain lexicographic byte order; a key that is a strict
/// prefix of another sorts first.
#[inline(always)]
pub fn compare_keys(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
    // For 8+ byte keys, compare first 8 bytes as u64 (big-endian for sort order)
    if a.len() >= 8 && b.len() >= 8 {
        let a_prefix = u64::from_be_bytes([a[0], a[1], a[2], a[3], a[4], a[5], a[6], a[7]]);
        let b_prefix = u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
        if a_prefix != b_prefix {
            return a_prefix.cmp(&b_prefix);
        }
        // Prefix matched, compare remaining bytes
        if a.len() == 8 && b.len() == 8 {
            return std::cmp::Ordering::Equal;
        }
    }
    a.cmp(b)
}

/// How a search key is matched against stored keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// The whole key must match; the probe must be exactly key-width long.
    Exact,
    /// Only the first `n` bytes are compared; the lowest matching key wins.
    Prefix(usize),
}

/// Result of a clamped write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The key was inserted.
    Inserted,
    /// The index was at capacity and the key was skipped.
    Clamped,
}

/// Traversal state of an index handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// Accepting writes.
    Building,
    /// Built and open for reading, cursor not yet positioned.
    Readable,
    /// Cursor is on an entry.
    Positioned,
    /// Cursor has passed the last entry.
    AtEnd,
    /// Traversal detected corruption and halted.
    Halted,
}

impl IndexState {
    /// Returns the state name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            IndexState::Building => "building",
            IndexState::Readable => "readable",
            IndexState::Positioned => "positioned",
            IndexState::AtEnd => "at end",
            IndexState::Halted => "halted",
        }
    }
}

/// Header stored in page 0 of every index store.
///
/// Layout (36 bytes, rest of the page zeroed):
/// - magic: 4 bytes ("KIDX")
/// - version: 2 bytes
/// - key_width: 2 bytes
/// - root_page: 4 bytes
/// - height: 4 bytes
/// - entry_count: 8 bytes
/// - page_count: 4 bytes
/// - flags: 4 bytes (bit 0 = build complete)
/// - checksum: 4 bytes (CRC32 of the preceding 32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    /// Width of every key in bytes.
    pub key_width: u16,
    /// Page number of the root node.
    pub root_page: u32,
    /// Tree height (1 = root is a leaf).
    pub height: u32,
    /// Number of entries in the tree.
    pub entry_count: u64,
    /// Number of pages in the file, header included.
    pub page_count: u32,
    /// True once the build finished and every page was written.
    pub complete: bool,
}

impl IndexHeader {
    /// Magic bytes identifying an index store.
    pub const MAGIC: [u8; 4] = *b"KIDX";
    /// Current format version.
    pub const VERSION: u16 = 1;
    /// Size of the header in bytes.
    pub const SIZE: usize = 36;

    const FLAG_COMPLETE: u32 = 0b1;

    /// Creates the header of an empty, unfinished index.
    pub fn new(key_width: u16) -> Self {
        Self {
            key_width,
            root_page: 0,
            height: 0,
            entry_count: 0,
            page_count: 1,
            complete: false,
        }
    }

    fn body(&self) -> [u8; Self::SIZE - 4] {
        let mut buf = [0u8; Self::SIZE - 4];
        buf[0..4].copy_from_slice(&Self::MAGIC);
        buf[4..6].copy_from_slice(&Self::VERSION.to_le_bytes());
        buf[6..8].copy_from_slice(&self.key_width.to_le_bytes());
        buf[8..12].copy_from_slice(&self.root_page.to_le_bytes());
        buf[12..16].copy_from_slice(&self.height.to_le_bytes());
        buf[16..24].copy_from_slice(&self.entry_count.to_le_bytes());
        buf[24..28].copy_from_slice(&self.page_count.to_le_bytes());
        let flags = if self.complete { Self::FLAG_COMPLETE } else { 0 };
        buf[28..32].copy_from_slice(&flags.to_le_bytes());
        buf
    }

    /// Serializes the header into a full page.
    pub fn to_page(&self) -> [u8; PAGE_SIZE] {
        let mut page = [0u8; PAGE_SIZE];
        let body = self.body();
        page[..body.len()].copy_from_slice(&body);
        page[body.len()..Self::SIZE].copy_from_slice(&crc32fast::hash(&body).to_le_bytes());
        page
    }

    /// Deserializes and validates a header page.
    pub fn from_page(index: &str, page: &[u8; PAGE_SIZE]) -> Result<Self> {
        let corrupted = |reason: String| KeydexError::IndexCorrupted {
            index: index.to_string(),
            reason,
        };

        if page[0..4] != Self::MAGIC {
            return Err(corrupted("invalid magic bytes".to_string()));
        }
        let version = u16::from_le_bytes([page[4], page[5]]);
        if version != Self::VERSION {
            return Err(corrupted(format!("unsupported version: {}", version)));
        }

        let stored = u32::from_le_bytes([page[32], page[33], page[34], page[35]]);
        if crc32fast::hash(&page[..Self::SIZE - 4]) != stored {
            return Err(corrupted("header checksum mismatch".to_string()));
        }

        let flags = u32::from_le_bytes([page[28], page[29], page[30], page[31]]);
        Ok(Self {
            key_width: u16::from_le_bytes([page[6], page[7]]),
            root_page: u32::from_le_bytes([page[8], page[9], page[10], page[11]]),
            height: u32::from_le_bytes([page[12], page[13], page[14], page[15]]),
            entry_count: u64::from_le_bytes([
                page[16], page[17], page[18], page[19], page[20], page[21], page[22], page[23],
            ]),
            page_count: u32::from_le_bytes([page[24], page[25], page[26], page[27]]),
            complete: flags & Self::FLAG_COMPLETE != 0,
        })
    }
}
