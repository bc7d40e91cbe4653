//! Interchangeable ways of producing an ordered index.

use crate::sort::{PushOutcome, SortIndexBuilder};
use bytes::Bytes;
use keydex_common::{IndexEntry, KeydexConfig, RecordPointer, Result};
use keydex_storage::{IndexWriter, WriteOutcome};
use tracing::debug;

/// How an ordered run of entries is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStrategy {
    /// Insert each key into the on-disk B+ tree as it arrives.
    Incremental,
    /// Collect everything in memory and sort once.
    Batch,
}

impl BuildStrategy {
    /// Picks the batch path once the estimated volume reaches the configured threshold.
    pub fn choose(estimated: usize, config: &KeydexConfig) -> Self {
        let strategy = if estimated >= config.batch_threshold {
            BuildStrategy::Batch
        } else {
            BuildStrategy::Incremental
        };
        debug!(estimated, threshold = config.batch_threshold, ?strategy, "build strategy chosen");
        strategy
    }

    /// Starts a build. `name` is only used by the incremental path.
    pub fn start(
        self,
        config: &KeydexConfig,
        name: &str,
        key_width: usize,
    ) -> Result<Box<dyn OrderedBuild>> {
        Ok(match self {
            BuildStrategy::Incremental => {
                Box::new(IncrementalBuild::new(IndexWriter::create(config, name, key_width)?))
            }
            BuildStrategy::Batch => Box::new(SortIndexBuilder::with_key_width(
                config.max_sort_entries,
                key_width,
            )),
        })
    }
}

/// Accepts entries in any order and yields them in ascending key order.
///
/// Both strategies clamp at their capacity instead of failing, and both
/// reject keys of the wrong width and duplicate keys.
pub trait OrderedBuild {
    fn insert(&mut self, key: Bytes, pointer: RecordPointer) -> Result<PushOutcome>;

    /// Entries dropped at capacity.
    fn dropped(&self) -> u64;

    /// Completes the build and returns every kept entry in key order.
    fn finish(self: Box<Self>) -> Result<Vec<IndexEntry>>;
}

/// Incremental build backed by an on-disk index.
pub struct IncrementalBuild {
    writer: IndexWriter,
}

impl IncrementalBuild {
    pub fn new(writer: IndexWriter) -> Self {
        Self { writer }
    }
}

impl OrderedBuild for IncrementalBuild {
    fn insert(&mut self, key: Bytes, pointer: RecordPointer) -> Result<PushOutcome> {
        Ok(match self.writer.write_clamped(&key, pointer)? {
            WriteOutcome::Inserted => PushOutcome::Accepted,
            WriteOutcome::Clamped => PushOutcome::Dropped,
        })
    }

    fn dropped(&self) -> u64 {
        self.writer.clamped()
    }

    fn finish(self: Box<Self>) -> Result<Vec<IndexEntry>> {
        let mut reader = self.writer.finish()?;
        reader.entries().collect()
    }
}

impl OrderedBuild for SortIndexBuilder {
    fn insert(&mut self, key: Bytes, pointer: RecordPointer) -> Result<PushOutcome> {
        self.push(key, pointer)
    }

    fn dropped(&self) -> u64 {
        SortIndexBuilder::dropped(self)
    }

    fn finish(self: Box<Self>) -> Result<Vec<IndexEntry>> {
        Ok(self.sort_unique()?.into_entries())
    }
}
