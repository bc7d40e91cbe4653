//! Composite key encoding.
//!
//! A key is laid out as
//!
//! ```text
//! [field_0] [field_1] ... [store tag (1, optional)] [uniquing suffix (2, optional)]
//! ```
//!
//! Keys from several source stores therefore interleave by field value,
//! and the tag only separates equal field values from different stores.
//!
//! Field bytes are padded with spaces or truncated to their declared width
//! and null bytes become spaces, so keys compare and display the same
//! whether a field was blank-filled or null-filled. The tag and suffix are
//! binary and never normalized.

use bytes::{BufMut, Bytes, BytesMut};
use keydex_common::{KeydexError, RecordPointer, Result, StoreTag};

/// Filler used for padding and in place of null bytes.
pub const FILLER: u8 = b' ';

/// Width of the uniquing suffix.
pub const SUFFIX_WIDTH: usize = 2;

/// Width of the store tag.
pub const TAG_WIDTH: usize = 1;

/// Replaces every null byte with the filler.
pub fn normalize(bytes: &mut [u8]) {
    for b in bytes.iter_mut().filter(|b| **b == 0) {
        *b = FILLER;
    }
}

/// Two-byte tie breaker derived from a record ordinal.
///
/// The ordinal's little-endian halves are swapped, which yields its
/// big-endian form: byte-wise comparison of suffixes matches numeric
/// comparison of ordinals.
pub fn uniquing_suffix(ordinal: u16) -> [u8; SUFFIX_WIDTH] {
    let [lo, hi] = ordinal.to_le_bytes();
    [hi, lo]
}

/// Recovers the ordinal from a suffix.
pub fn ordinal_from_suffix(suffix: [u8; SUFFIX_WIDTH]) -> u16 {
    u16::from_be_bytes(suffix)
}

/// Uniquing suffix for a record pointer. Pointers above `u16::MAX` do not fit.
pub fn suffix_for(pointer: RecordPointer) -> Result<[u8; SUFFIX_WIDTH]> {
    u16::try_from(pointer.get())
        .map(uniquing_suffix)
        .map_err(|_| KeydexError::SuffixOverflow(pointer.get()))
}

/// A fixed-width field inside a source record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    /// Byte offset of the field within the record.
    pub offset: usize,
    /// Field width in bytes, both in the record and in the key.
    pub width: usize,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, offset: usize, width: usize) -> Self {
        Self {
            name: name.into(),
            offset,
            width,
        }
    }

    /// Returns the field's bytes within `record`.
    pub fn extract<'a>(&self, record: &'a [u8]) -> Result<&'a [u8]> {
        let end = self.offset + self.width;
        record
            .get(self.offset..end)
            .ok_or(KeydexError::RecordSizeMismatch {
                expected: end,
                actual: record.len(),
            })
    }
}

/// Describes how keys of one index are assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    fields: Vec<FieldSpec>,
    suffix: bool,
    tag: Option<StoreTag>,
}

impl KeyLayout {
    /// Layout made of `fields` only.
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self {
            fields,
            suffix: false,
            tag: None,
        }
    }

    /// Appends the uniquing suffix to every key.
    pub fn with_suffix(mut self) -> Self {
        self.suffix = true;
        self
    }

    /// Follows the fields of every key with `tag`.
    pub fn with_tag(mut self, tag: StoreTag) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn tag(&self) -> Option<StoreTag> {
        self.tag
    }

    pub fn has_suffix(&self) -> bool {
        self.suffix
    }

    /// Total width of the field portion.
    pub fn fields_width(&self) -> usize {
        self.fields.iter().map(|f| f.width).sum()
    }

    /// Offset of the store tag within a complete key.
    pub fn tag_offset(&self) -> Option<usize> {
        self.tag.map(|_| self.fields_width())
    }

    /// Width of a complete key under this layout.
    pub fn width(&self) -> usize {
        let tag = if self.tag.is_some() { TAG_WIDTH } else { 0 };
        let suffix = if self.suffix { SUFFIX_WIDTH } else { 0 };
        tag + self.fields_width() + suffix
    }

    /// Encodes the field portion of a key from one value per field.
    pub fn encode(&self, values: &[&[u8]]) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.fields_width());
        self.put_fields(&mut buf, values)?;
        Ok(buf.freeze())
    }

    /// Field portion followed by the uniquing suffix of `pointer`.
    pub fn encode_record(&self, values: &[&[u8]], pointer: RecordPointer) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.fields_width() + SUFFIX_WIDTH);
        self.put_fields(&mut buf, values)?;
        buf.put_slice(&suffix_for(pointer)?);
        Ok(buf.freeze())
    }

    /// Field portion, store tag, then the uniquing suffix of `pointer`.
    pub fn encode_tagged(
        &self,
        tag: StoreTag,
        values: &[&[u8]],
        pointer: RecordPointer,
    ) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(TAG_WIDTH + self.fields_width() + SUFFIX_WIDTH);
        self.put_fields(&mut buf, values)?;
        buf.put_u8(tag.as_byte());
        buf.put_slice(&suffix_for(pointer)?);
        Ok(buf.freeze())
    }

    /// Builds the complete key for a raw source record at `pointer`.
    pub fn key_for(&self, record: &[u8], pointer: RecordPointer) -> Result<Bytes> {
        let values = self
            .fields
            .iter()
            .map(|f| f.extract(record))
            .collect::<Result<Vec<_>>>()?;

        let mut buf = BytesMut::with_capacity(self.width());
        self.put_fields(&mut buf, &values)?;
        if let Some(tag) = self.tag {
            buf.put_u8(tag.as_byte());
        }
        if self.suffix {
            buf.put_slice(&suffix_for(pointer)?);
        }
        Ok(buf.freeze())
    }

    /// Splits a complete key back into its field slices, skipping the tag and suffix.
    pub fn decode_fields<'a>(&self, key: &'a [u8]) -> Result<Vec<&'a [u8]>> {
        if key.len() != self.width() {
            return Err(KeydexError::KeyWidthMismatch {
                expected: self.width(),
                actual: key.len(),
            });
        }
        let mut offset = 0;
        let mut out = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            out.push(&key[offset..offset + field.width]);
            offset += field.width;
        }
        Ok(out)
    }

    fn put_fields(&self, buf: &mut BytesMut, values: &[&[u8]]) -> Result<()> {
        if values.len() != self.fields.len() {
            return Err(KeydexError::ConfigError(format!(
                "key layout has {} fields, got {} values",
                self.fields.len(),
                values.len()
            )));
        }
        for (field, value) in self.fields.iter().zip(values) {
            let start = buf.len();
            let take = value.len().min(field.width);
            buf.put_slice(&value[..take]);
            buf.put_bytes(FILLER, field.width - take);
            normalize(&mut buf[start..]);
        }
        Ok(())
    }
}
