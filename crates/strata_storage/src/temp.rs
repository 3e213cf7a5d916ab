//! Private temporary files.

use crate::error::StorageResult;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// A read/write temporary file that is deleted when closed or dropped.
///
/// Temp files are never visible to readers of the final output path; they
/// are the staging area for every write and combine.
#[derive(Debug)]
pub struct TempFile {
    inner: NamedTempFile,
}

impl TempFile {
    /// Creates a temp file inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn new_in(dir: &Path) -> StorageResult<Self> {
        let inner = tempfile::Builder::new()
            .prefix("strata-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        tracing::debug!(path = %inner.path().display(), "temp file created");
        Ok(Self { inner })
    }

    /// Returns the path of the temp file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Returns the current length in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata cannot be read.
    pub fn len(&self) -> StorageResult<u64> {
        Ok(self.inner.as_file().metadata()?.len())
    }

    /// Returns true if nothing has been written yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata cannot be read.
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Opens an independent handle positioned at the start of the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be reopened.
    pub fn reopen(&self) -> StorageResult<File> {
        let mut file = self.inner.reopen()?;
        file.seek(SeekFrom::Start(0))?;
        Ok(file)
    }

    /// Closes the handle and removes the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be removed.
    pub fn close_and_delete(self) -> StorageResult<()> {
        let path = self.inner.path().to_path_buf();
        self.inner.close()?;
        tracing::debug!(path = %path.display(), "temp file deleted");
        Ok(())
    }
}

impl Read for TempFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.as_file_mut().read(buf)
    }
}

impl Write for TempFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.as_file_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.as_file_mut().flush()
    }
}

impl Seek for TempFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.as_file_mut().seek(pos)
    }
}
