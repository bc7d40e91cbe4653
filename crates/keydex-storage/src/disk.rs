//! Page file for index store I/O.

use keydex_common::page::PAGE_SIZE;
use keydex_common::{KeydexError, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Reads and writes fixed-size pages of a single index store file.
///
/// The file is owned exclusively for the lifetime of the handle; nothing
/// else may write to it while a build or traversal is in progress.
pub struct PageFile {
    /// The file handle.
    file: File,
    /// Path to the file.
    path: PathBuf,
    /// Number of whole pages in the file.
    num_pages: u32,
    /// Enable fsync on sync().
    fsync_enabled: bool,
}

impl PageFile {
    /// Creates the file, discarding any previous contents.
    pub fn create(path: &Path, fsync_enabled: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            num_pages: 0,
            fsync_enabled,
        })
    }

    /// Opens an existing file.
    pub fn open(path: &Path, fsync_enabled: bool) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            num_pages,
            fsync_enabled,
        })
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of pages in the file.
    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// Reads a page from disk.
    pub fn read_page(&mut self, page_num: u32) -> Result<Box<[u8; PAGE_SIZE]>> {
        if page_num >= self.num_pages {
            return Err(KeydexError::Storage(format!(
                "page {} does not exist in {}",
                page_num,
                self.path.display()
            )));
        }

        let offset = (page_num as u64) * (PAGE_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;

        let mut buffer = Box::new([0u8; PAGE_SIZE]);
        self.file.read_exact(&mut buffer[..])?;

        Ok(buffer)
    }

    /// Writes a page to disk, extending the file if needed.
    pub fn write_page(&mut self, page_num: u32, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let offset = (page_num as u64) * (PAGE_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;

        // Update page count if we extended the file
        if page_num >= self.num_pages {
            self.num_pages = page_num + 1;
        }

        Ok(())
    }

    /// Flushes pending writes to disk when fsync is enabled.
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        if self.fsync_enabled {
            self.file.sync_all()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_page_file_create_empty() {
        let dir = tempdir().unwrap();
        let file = PageFile::create(&dir.path().join("a.idx"), false).unwrap();
        assert_eq!(file.num_pages(), 0);
        assert!(file.path().exists());
    }

    #[test]
    fn test_page_file_write_read() {
        let dir = tempdir().unwrap();
        let mut file = PageFile::create(&dir.path().join("a.idx"), false).unwrap();

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0xAB;
        data[100] = 0xCD;
        data[PAGE_SIZE - 1] = 0xEF;
        file.write_page(0, &data).unwrap();

        let read_data = file.read_page(0).unwrap();
        assert_eq!(read_data[0], 0xAB);
        assert_eq!(read_data[100], 0xCD);
        assert_eq!(read_data[PAGE_SIZE - 1], 0xEF);
    }

    #[test]
    fn test_page_file_extends_on_write() {
        let dir = tempdir().unwrap();
        let mut file = PageFile::create(&dir.path().join("a.idx"), false).unwrap();

        file.write_page(2, &[7u8; PAGE_SIZE]).unwrap();
        assert_eq!(file.num_pages(), 3);
        assert_eq!(file.read_page(1).unwrap()[0], 0);
        assert_eq!(file.read_page(2).unwrap()[0], 7);
    }

    #[test]
    fn test_page_file_read_nonexistent_page() {
        let dir = tempdir().unwrap();
        let mut file = PageFile::create(&dir.path().join("a.idx"), false).unwrap();
        file.write_page(0, &[0u8; PAGE_SIZE]).unwrap();

        let result = file.read_page(99);
        assert!(matches!(result, Err(KeydexError::Storage(_))));
    }

    #[test]
    fn test_page_file_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.idx");

        {
            let mut file = PageFile::create(&path, true).unwrap();
            let mut data = [0u8; PAGE_SIZE];
            data[0] = 0xFF;
            file.write_page(0, &data).unwrap();
            file.write_page(1, &data).unwrap();
            file.sync().unwrap();
        }

        let mut file = PageFile::open(&path, true).unwrap();
        assert_eq!(file.num_pages(), 2);
        assert_eq!(file.read_page(1).unwrap()[0], 0xFF);
    }

    #[test]
    fn test_page_file_create_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.idx");

        {
            let mut file = PageFile::create(&path, false).unwrap();
            file.write_page(4, &[1u8; PAGE_SIZE]).unwrap();
        }

        let file = PageFile::create(&path, false).unwrap();
        assert_eq!(file.num_pages(), 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_page_file_open_missing() {
        let dir = tempdir().unwrap();
        let result = PageFile::open(&dir.path().join("missing.idx"), false);
        assert!(matches!(result, Err(KeydexError::Io(_))));
    }

    #[test]
    fn test_page_file_ignores_partial_page() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.idx");
        std::fs::write(&path, vec![0u8; PAGE_SIZE + 10]).unwrap();

        let file = PageFile::open(&path, false).unwrap();
        assert_eq!(file.num_pages(), 1);
    }
}
