//! Batch sort-index builder.
//!
//! Collects `(key, record pointer)` pairs from one or more source stores
//! into memory, sorts them once and writes them to a fresh output store in
//! a single sequential pass. For large volumes this beats inserting every
//! key into the incremental index.

use bytes::Bytes;
use keydex_common::{IndexEntry, KeydexError, RecordPointer, Result};
use keydex_storage::{RecordStore, compare_keys};
use tracing::{debug, info, warn};

/// Result of offering one entry to the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    /// The builder was at capacity; the entry was not kept.
    Dropped,
}

/// Counters for one pass over a source store.
///
/// Once the builder is full, remaining records are dropped without being
/// keyed, so they count as scanned and dropped but not as qualified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectSummary {
    /// Records read from the store.
    pub scanned: u32,
    /// Records for which a key was produced.
    pub qualified: u32,
    /// Keys kept by the builder.
    pub accepted: u32,
    /// Records dropped because the builder was full or their position
    /// did not fit the uniquing suffix.
    pub dropped: u32,
}

/// In-memory collector with a fixed entry cap.
///
/// Entries beyond the cap are dropped with a warning rather than failing
/// the run. Every key must have the same width; a builder made with
/// [`SortIndexBuilder::with_key_width`] checks against the declared width,
/// otherwise the first key fixes it.
pub struct SortIndexBuilder {
    entries: Vec<IndexEntry>,
    capacity: usize,
    key_width: Option<usize>,
    dropped: u64,
}

impl SortIndexBuilder {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity.min(4_096)),
            capacity,
            key_width: None,
            dropped: 0,
        }
    }

    /// Creates a builder that only accepts keys of `key_width` bytes.
    pub fn with_key_width(capacity: usize, key_width: usize) -> Self {
        Self {
            key_width: Some(key_width),
            ..Self::new(capacity)
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Number of entries dropped at the cap so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Offers one entry. Only a key width that differs from earlier keys is an error.
    pub fn push(&mut self, key: Bytes, pointer: RecordPointer) -> Result<PushOutcome> {
        match self.key_width {
            Some(width) if width != key.len() => {
                return Err(KeydexError::KeyWidthMismatch {
                    expected: width,
                    actual: key.len(),
                });
            }
            Some(_) => {}
            None => self.key_width = Some(key.len()),
        }

        if self.is_full() {
            self.note_drop();
            return Ok(PushOutcome::Dropped);
        }

        self.entries.push(IndexEntry { key, pointer });
        Ok(PushOutcome::Accepted)
    }

    fn note_drop(&mut self) {
        if self.dropped == 0 {
            warn!(capacity = self.capacity, "sort buffer full, dropping remaining entries");
        }
        self.dropped += 1;
    }

    /// Reads `store` from the first record and pushes a key for each
    /// qualifying record. `key_fn` returns `None` to skip a record.
    ///
    /// `key_fn` is not called once the builder is full. A record whose
    /// position overflows the uniquing suffix is dropped with a warning.
    pub fn collect<S, F>(&mut self, store: &mut S, mut key_fn: F) -> Result<CollectSummary>
    where
        S: RecordStore + ?Sized,
        F: FnMut(RecordPointer, &[u8]) -> Result<Option<Bytes>>,
    {
        let mut summary = CollectSummary::default();
        store.rewind();

        while let Some((pointer, record)) = store.read_next()? {
            summary.scanned += 1;
            if self.is_full() {
                self.note_drop();
                summary.dropped += 1;
                continue;
            }
            let key = match key_fn(pointer, &record) {
                Ok(Some(key)) => key,
                Ok(None) => continue,
                Err(KeydexError::SuffixOverflow(position)) => {
                    warn!(position, "record position overflows uniquing suffix, dropped");
                    self.dropped += 1;
                    summary.dropped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            summary.qualified += 1;
            match self.push(key, pointer)? {
                PushOutcome::Accepted => summary.accepted += 1,
                PushOutcome::Dropped => summary.dropped += 1,
            }
        }

        debug!(
            scanned = summary.scanned,
            qualified = summary.qualified,
            accepted = summary.accepted,
            dropped = summary.dropped,
            "collected source store"
        );
        Ok(summary)
    }

    /// Sorts and fails with `DuplicateKey` if two collected keys are equal.
    pub fn sort_unique(self) -> Result<SortedRun> {
        let run = self.sort();
        if run.entries.windows(2).any(|pair| pair[0].key == pair[1].key) {
            return Err(KeydexError::DuplicateKey);
        }
        Ok(run)
    }

    /// Sorts the collected entries into ascending key order.
    pub fn sort(self) -> SortedRun {
        let mut entries = self.entries;
        entries.sort_unstable_by(|a, b| compare_keys(&a.key, &b.key));
        if self.dropped > 0 {
            warn!(
                kept = entries.len(),
                dropped = self.dropped,
                capacity = self.capacity,
                "sort run truncated at capacity"
            );
        }
        SortedRun {
            entries,
            dropped: self.dropped,
        }
    }
}

/// Collected entries in ascending key order.
pub struct SortedRun {
    entries: Vec<IndexEntry>,
    dropped: u64,
}

impl SortedRun {
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<IndexEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries dropped while collecting.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Writes one rendered record per entry to positions 1..n of `out`.
    ///
    /// `out` must be empty so positions match sort order. Returns the number
    /// of records written.
    pub fn write_to<S, F>(&self, out: &mut S, mut render: F) -> Result<u32>
    where
        S: RecordStore + ?Sized,
        F: FnMut(&IndexEntry) -> Result<Bytes>,
    {
        if out.count() != 0 {
            return Err(KeydexError::Storage(format!(
                "output store already holds {} records",
                out.count()
            )));
        }

        let mut written = 0u32;
        for entry in &self.entries {
            let record = render(entry)?;
            out.append(&record)?;
            written += 1;
        }

        info!(records = written, "sorted output written");
        Ok(written)
    }
}
