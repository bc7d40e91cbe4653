//! Record pointers, store tags and index entries.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// 1-based ordinal of a record inside one fixed record store.
///
/// A pointer only names a record together with the identity of its store;
/// the same ordinal in two stores refers to two different records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordPointer(u32);

impl RecordPointer {
    /// The first record of any store.
    pub const FIRST: RecordPointer = RecordPointer(1);

    /// Creates a pointer. Returns None for 0, which names no record.
    pub const fn new(position: u32) -> Option<Self> {
        if position == 0 {
            None
        } else {
            Some(Self(position))
        }
    }

    /// Returns the 1-based position.
    #[inline]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Returns the 0-based slot, used for byte offsets.
    #[inline]
    pub const fn index(&self) -> u64 {
        (self.0 - 1) as u64
    }

    /// Returns the pointer to the following record.
    pub fn next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl std::fmt::Display for RecordPointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl TryFrom<u32> for RecordPointer {
    type Error = crate::KeydexError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(crate::KeydexError::InvalidPointer(value))
    }
}

/// Tag byte identifying which source store a pointer belongs to when one
/// index spans several heterogeneous stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreTag(pub u8);

impl StoreTag {
    /// Returns the tag as it is embedded in a key.
    #[inline]
    pub const fn as_byte(&self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for StoreTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_ascii_graphic() {
            write!(f, "{}", self.0 as char)
        } else {
            write!(f, "0x{:02x}", self.0)
        }
    }
}

/// A composite key paired with the pointer of the record that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Fixed-width key bytes.
    pub key: Bytes,
    /// Record the key was derived from.
    pub pointer: RecordPointer,
}

impl IndexEntry {
    /// Creates a new entry.
    pub fn new(key: impl Into<Bytes>, pointer: RecordPointer) -> Self {
        Self {
            key: key.into(),
            pointer,
        }
    }

    /// Returns the key rendered for diagnostics (non-printable bytes escaped).
    pub fn display_key(&self) -> String {
        display_key(&self.key)
    }
}

/// Renders key bytes for log lines and error messages.
pub fn display_key(key: &[u8]) -> String {
    key.escape_ascii().to_string()
}
