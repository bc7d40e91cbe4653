//! Build-and-list and consolidation drivers.
//!
//! These tie a source [`RecordStore`] to the index engine or to the batch
//! builder. Formatting of individual lines is left to the caller.

use crate::sort::{CollectSummary, SortIndexBuilder};
use bytes::Bytes;
use keydex_common::{IndexEntry, KeydexConfig, KeydexError, RecordPointer, Result, StoreTag};
use keydex_storage::{IndexReader, IndexWriter, KeyLayout, RecordStore, WriteOutcome, normalize};
use std::collections::HashSet;
use std::io::Write;
use tracing::{info, warn};

/// Counters for one incremental build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Records read from the source store.
    pub scanned: u32,
    /// Records that produced no key.
    pub skipped: u32,
    /// Entries written to the index.
    pub written: u64,
    /// Keys dropped because the index was full.
    pub clamped: u64,
}

/// Builds the named index from every qualifying record of `source`.
///
/// `key_fn` returns the key for a record, or `None` to leave it out. The
/// index is rebuilt from scratch; on error it is left incomplete and will
/// not open for reading.
pub fn build_index<S, F>(
    config: &KeydexConfig,
    name: &str,
    key_width: usize,
    source: &mut S,
    mut key_fn: F,
) -> Result<(IndexReader, BuildSummary)>
where
    S: RecordStore + ?Sized,
    F: FnMut(RecordPointer, &[u8]) -> Result<Option<Bytes>>,
{
    let mut writer = IndexWriter::create(config, name, key_width)?;
    let mut summary = BuildSummary::default();

    source.rewind();
    while let Some((pointer, record)) = source.read_next()? {
        summary.scanned += 1;
        match key_fn(pointer, &record)? {
            Some(key) => {
                if writer.write_clamped(&key, pointer)? == WriteOutcome::Inserted {
                    summary.written += 1;
                }
            }
            None => summary.skipped += 1,
        }
    }
    summary.clamped = writer.clamped();

    let reader = writer.finish()?;
    info!(
        index = name,
        scanned = summary.scanned,
        written = summary.written,
        skipped = summary.skipped,
        clamped = summary.clamped,
        "index built"
    );
    Ok((reader, summary))
}

/// Counters for one listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListingSummary {
    /// Lines written.
    pub listed: u64,
    /// Entries whose pointer lies past the end of the store.
    pub unresolved: u64,
}

/// Walks `reader` from the first key and writes one formatted line per entry.
///
/// Each pointer is resolved through `store` before formatting. Nothing is
/// written unless the whole traversal succeeds, so a corrupted index never
/// produces a partial listing.
pub fn list_index<S, W, F>(
    reader: &mut IndexReader,
    store: &mut S,
    out: &mut W,
    mut format: F,
) -> Result<ListingSummary>
where
    S: RecordStore + ?Sized,
    W: Write,
    F: FnMut(&IndexEntry, &[u8]) -> String,
{
    let mut summary = ListingSummary::default();
    let mut listing = String::new();

    let mut entry = reader.first()?;
    while let Some(e) = entry {
        match store.read_at(e.pointer)? {
            Some(record) => {
                listing.push_str(&format(&e, &record));
                listing.push('\n');
                summary.listed += 1;
            }
            None => {
                summary.unresolved += 1;
                warn!(
                    index = reader.name(),
                    pointer = %e.pointer,
                    key = %e.display_key(),
                    "index entry points past the end of the store"
                );
            }
        }
        entry = reader.read()?;
    }

    out.write_all(listing.as_bytes())?;
    out.flush()?;
    info!(
        index = reader.name(),
        listed = summary.listed,
        unresolved = summary.unresolved,
        "index listed"
    );
    Ok(summary)
}

/// Flat text export: each record in key order, nulls blanked and trailing
/// blanks trimmed, one per line.
pub fn export_lines<S, W>(
    reader: &mut IndexReader,
    store: &mut S,
    out: &mut W,
) -> Result<ListingSummary>
where
    S: RecordStore + ?Sized,
    W: Write,
{
    list_index(reader, store, out, |_, record| {
        let mut line = record.to_vec();
        normalize(&mut line);
        String::from_utf8_lossy(&line).trim_end().to_string()
    })
}

/// One input of a consolidation.
pub struct Source<'a> {
    layout: KeyLayout,
    store: &'a mut dyn RecordStore,
    filter: Option<&'a dyn Fn(&[u8]) -> bool>,
}

impl<'a> Source<'a> {
    /// `layout` locates the key fields in this store's records. The tag and
    /// uniquing suffix are added to it.
    pub fn new(tag: StoreTag, layout: KeyLayout, store: &'a mut dyn RecordStore) -> Self {
        Self {
            layout: layout.with_tag(tag).with_suffix(),
            store,
            filter: None,
        }
    }

    /// Only records for which `filter` returns true are collected.
    pub fn with_filter(mut self, filter: &'a dyn Fn(&[u8]) -> bool) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn tag(&self) -> Option<StoreTag> {
        self.layout.tag()
    }
}

/// Counters for one consolidation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsolidateSummary {
    /// Per-source collection counters, in source order.
    pub sources: Vec<(StoreTag, CollectSummary)>,
    /// Records written to the output store.
    pub written: u32,
    /// Entries dropped at the sort capacity.
    pub dropped: u64,
}

/// Merges several source stores into one new output store in key order.
///
/// Keys are `[fields][tag][suffix]`, so records from different stores
/// interleave by field value. `render` turns a source record into the output
/// record. The output store must be empty.
pub fn consolidate<O, F>(
    sources: &mut [Source<'_>],
    capacity: usize,
    output: &mut O,
    mut render: F,
) -> Result<ConsolidateSummary>
where
    O: RecordStore + ?Sized,
    F: FnMut(StoreTag, &[u8]) -> Result<Bytes>,
{
    let Some(first) = sources.first() else {
        return Err(KeydexError::ConfigError(
            "consolidation needs at least one source".to_string(),
        ));
    };
    let width = first.layout.width();
    let Some(tag_offset) = first.layout.tag_offset() else {
        return Err(KeydexError::ConfigError("source layout has no store tag".to_string()));
    };

    let mut seen = HashSet::new();
    for source in sources.iter() {
        if source.layout.width() != width || source.layout.tag_offset() != Some(tag_offset) {
            return Err(KeydexError::ConfigError(
                "all sources must produce keys of the same shape".to_string(),
            ));
        }
        if let Some(tag) = source.tag() {
            if !seen.insert(tag) {
                return Err(KeydexError::ConfigError(format!("store tag {} used twice", tag)));
            }
        }
    }

    let mut builder = SortIndexBuilder::new(capacity);
    let mut summary = ConsolidateSummary::default();

    for source in sources.iter_mut() {
        let layout = &source.layout;
        let filter = source.filter;
        let collected = builder.collect(&mut *source.store, |pointer, record| {
            if filter.is_some_and(|keep| !keep(record)) {
                return Ok(None);
            }
            layout.key_for(record, pointer).map(Some)
        })?;
        if let Some(tag) = layout.tag() {
            summary.sources.push((tag, collected));
        }
    }

    let run = builder.sort();
    summary.dropped = run.dropped();
    summary.written = run.write_to(output, |entry| {
        let tag = StoreTag(entry.key[tag_offset]);
        let source = sources
            .iter_mut()
            .find(|s| s.tag() == Some(tag))
            .ok_or_else(|| KeydexError::Storage(format!("no source for store tag {}", tag)))?;
        let record = source
            .store
            .read_at(entry.pointer)?
            .ok_or(KeydexError::InvalidPointer(entry.pointer.get()))?;
        render(tag, &record)
    })?;

    info!(
        sources = summary.sources.len(),
        written = summary.written,
        dropped = summary.dropped,
        "stores consolidated"
    );
    Ok(summary)
}
