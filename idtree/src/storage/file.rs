//! File-backed page storage.
//!
//! The file is a flat sequence of pages: page `i` starts at byte
//! `i * PAGE_SIZE`. There is no header page.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::storage::io::{StorageError, StorageManager};
use crate::storage::page::{PAGE_SIZE, PAGE_SIZE_U64, Page, PageIndex};

/// A page file handle.
#[derive(Debug)]
pub struct FileStorage {
    file: File,
    path: PathBuf,
}

impl FileStorage {
    /// Create a new page file at the given path.
    ///
    /// Returns an error if the file already exists.
    pub fn create(path: &Path) -> Result<Self, StorageError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Open a page file, creating it if it does not exist.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of pages the file currently spans (a trailing partial page counts).
    pub fn page_count(&self) -> Result<u64, StorageError> {
        let len = self.file.metadata()?.len();
        Ok(len.div_ceil(PAGE_SIZE_U64))
    }
}

/// Byte offset of a page, rejecting indices past the addressable range.
fn page_offset(index: PageIndex) -> Result<u64, StorageError> {
    index.checked_mul(PAGE_SIZE_U64).ok_or_else(|| {
        StorageError::Io(std::io::Error::new(
            ErrorKind::InvalidInput,
            format!("page {index} is beyond the addressable file range"),
        ))
    })
}

impl StorageManager for FileStorage {
    fn read_page(&mut self, index: PageIndex) -> Result<Page, StorageError> {
        let mut page = Page::new();
        let offset = page_offset(index)?;

        // Past the end of the file: never written.
        if offset >= self.file.metadata()?.len() {
            return Ok(page);
        }

        self.file.seek(SeekFrom::Start(offset))?;

        // A trailing partial page is zero-filled.
        let buf = page.as_bytes_mut();
        let mut filled = 0;
        while filled < PAGE_SIZE {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(StorageError::Io(e)),
            }
        }

        Ok(page)
    }

    fn write_page(&mut self, index: PageIndex, page: &Page) -> Result<(), StorageError> {
        let offset = page_offset(index)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(page.as_bytes())?;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.file.sync_all()?;
        Ok(())
    }
}
