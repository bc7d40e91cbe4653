//! Fixed-length random-access record stores.
//!
//! A store is a sequence of records of identical size addressed by 1-based
//! position. The index engine only reads records by position and never
//! interprets their layout; field extraction is left to the key codec.
//!
//! Two implementations are provided:
//! - [`FileRecordStore`]: records packed back to back in a plain file
//! - [`MemoryRecordStore`]: records held in memory, used for staging and tests

use bytes::Bytes;
use keydex_common::{KeydexError, RecordPointer, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Contract of a fixed record store.
pub trait RecordStore {
    /// Size of every record in bytes.
    fn record_len(&self) -> usize;

    /// Number of records in the store.
    fn count(&self) -> u32;

    /// Reads the record at `position`. Returns None past the end of the store.
    fn read_at(&mut self, position: RecordPointer) -> Result<Option<Bytes>>;

    /// Reads the record under the sequential cursor and advances it.
    /// Returns None once the cursor has passed the last record.
    fn read_next(&mut self) -> Result<Option<(RecordPointer, Bytes)>>;

    /// Moves the sequential cursor back to the first record.
    fn rewind(&mut self);

    /// Writes a record at `position`. Writing at `count() + 1` appends.
    fn write_at(&mut self, position: RecordPointer, record: &[u8]) -> Result<()>;

    /// Appends a record and returns its position.
    fn append(&mut self, record: &[u8]) -> Result<RecordPointer> {
        let position = RecordPointer::new(self.count() + 1)
            .ok_or(KeydexError::InvalidPointer(0))?;
        self.write_at(position, record)?;
        Ok(position)
    }

    /// Returns true if `position` names an existing record.
    fn contains(&self, position: RecordPointer) -> bool {
        position.get() <= self.count()
    }
}

/// Validates a write against the store bounds and record size.
fn check_write(
    record_len: usize,
    count: u32,
    position: RecordPointer,
    record: &[u8],
) -> Result<()> {
    if record.len() != record_len {
        return Err(KeydexError::RecordSizeMismatch {
            expected: record_len,
            actual: record.len(),
        });
    }
    if position.get() > count + 1 {
        return Err(KeydexError::RecordOutOfRange {
            position: position.get(),
            count,
        });
    }
    Ok(())
}

/// Record store backed by a plain file of packed records.
pub struct FileRecordStore {
    /// The file handle.
    file: File,
    /// Path to the file.
    path: PathBuf,
    /// Size of every record.
    record_len: usize,
    /// Number of whole records in the file.
    count: u32,
    /// Next position returned by read_next.
    cursor: u32,
}

impl FileRecordStore {
    /// Creates a new, empty store, discarding any previous contents.
    pub fn create(path: &Path, record_len: usize) -> Result<Self> {
        if record_len == 0 {
            return Err(KeydexError::ConfigError(
                "record length must be positive".to_string(),
            ));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        debug!(path = %path.display(), record_len, "created record store");

        Ok(Self {
            file,
            path: path.to_path_buf(),
            record_len,
            count: 0,
            cursor: 1,
        })
    }

    /// Opens an existing store.
    ///
    /// A trailing partial record (from an interrupted append) is ignored.
    pub fn open(path: &Path, record_len: usize) -> Result<Self> {
        if record_len == 0 {
            return Err(KeydexError::ConfigError(
                "record length must be positive".to_string(),
            ));
        }

        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let file_size = file.metadata()?.len();
        let count = u32::try_from(file_size / record_len as u64).map_err(|_| {
            KeydexError::Storage(format!("{} holds too many records", path.display()))
        })?;

        let trailing = file_size % record_len as u64;
        if trailing != 0 {
            warn!(
                path = %path.display(),
                trailing,
                "ignoring partial record at end of store"
            );
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            record_len,
            count,
            cursor: 1,
        })
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes written records to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn offset(&self, position: RecordPointer) -> u64 {
        position.index() * self.record_len as u64
    }
}

impl RecordStore for FileRecordStore {
    fn record_len(&self) -> usize {
        self.record_len
    }

    fn count(&self) -> u32 {
        self.count
    }

    fn read_at(&mut self, position: RecordPointer) -> Result<Option<Bytes>> {
        if position.get() > self.count {
            return Ok(None);
        }

        let offset = self.offset(position);
        self.file.seek(SeekFrom::Start(offset))?;

        let mut buf = vec![0u8; self.record_len];
        self.file.read_exact(&mut buf)?;
        Ok(Some(Bytes::from(buf)))
    }

    fn read_next(&mut self) -> Result<Option<(RecordPointer, Bytes)>> {
        let Some(position) = RecordPointer::new(self.cursor) else {
            return Ok(None);
        };
        match self.read_at(position)? {
            Some(record) => {
                self.cursor += 1;
                Ok(Some((position, record)))
            }
            None => Ok(None),
        }
    }

    fn rewind(&mut self) {
        self.cursor = 1;
    }

    fn write_at(&mut self, position: RecordPointer, record: &[u8]) -> Result<()> {
        check_write(self.record_len, self.count, position, record)?;

        let offset = self.offset(position);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(record)?;

        if position.get() > self.count {
            self.count = position.get();
        }
        Ok(())
    }
}

/// Record store held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryRecordStore {
    /// Size of every record.
    record_len: usize,
    /// Records by 0-based slot.
    records: Vec<Bytes>,
    /// Next position returned by read_next.
    cursor: u32,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    pub fn new(record_len: usize) -> Self {
        Self {
            record_len,
            records: Vec::new(),
            cursor: 1,
        }
    }

    /// Creates a store holding the given records, in order.
    pub fn from_records<I, R>(record_len: usize, records: I) -> Result<Self>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[u8]>,
    {
        let mut store = Self::new(record_len);
        for record in records {
            store.append(record.as_ref())?;
        }
        Ok(store)
    }

    /// Returns all records in position order.
    pub fn records(&self) -> &[Bytes] {
        &self.records
    }
}

impl RecordStore for MemoryRecordStore {
    fn record_len(&self) -> usize {
        self.record_len
    }

    fn count(&self) -> u32 {
        self.records.len() as u32
    }

    fn read_at(&mut self, position: RecordPointer) -> Result<Option<Bytes>> {
        Ok(self.records.get(position.index() as usize).cloned())
    }

    fn read_next(&mut self) -> Result<Option<(RecordPointer, Bytes)>> {
        let Some(position) = RecordPointer::new(self.cursor) else {
            return Ok(None);
        };
        match self.records.get(position.index() as usize) {
            Some(record) => {
                self.cursor += 1;
                Ok(Some((position, record.clone())))
            }
            None => Ok(None),
        }
    }

    fn rewind(&mut self) {
        self.cursor = 1;
    }

    fn write_at(&mut self, position: RecordPointer, record: &[u8]) -> Result<()> {
        check_write(self.record_len, self.count(), position, record)?;

        let record = Bytes::copy_from_slice(record);
        let slot = position.index() as usize;
        if slot == self.records.len() {
            self.records.push(record);
        } else {
            self.records[slot] = record;
        }
        Ok(())
    }
}
