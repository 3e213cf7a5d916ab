//! Whole-file advisory locks.

use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// The advisory lock held on an open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// No lock is taken.
    None,
    /// A shared lock; any number of readers may hold one at once.
    Shared,
    /// An exclusive lock; excludes every other shared or exclusive holder.
    Exclusive,
}

impl LockMode {
    fn describe(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Shared => "acquire shared",
            Self::Exclusive => "acquire exclusive",
        }
    }
}

/// An open file holding an advisory lock for as long as it lives.
///
/// The lock is released by [`LockedFile::close_and_unlock`] or, failing that,
/// when the value is dropped. Locks are blocking: acquiring one waits for
/// conflicting holders in other processes to let go.
#[derive(Debug)]
pub struct LockedFile {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl LockedFile {
    /// Takes `mode` on an already opened file.
    ///
    /// After the lock is granted the path is checked again, since a
    /// concurrent process may have unlinked the file while this one waited.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken or the file vanished.
    pub fn lock(file: File, path: &Path, mode: LockMode) -> StorageResult<Self> {
        let result = match mode {
            LockMode::None => Ok(()),
            LockMode::Shared => FileExt::lock_shared(&file),
            LockMode::Exclusive => FileExt::lock_exclusive(&file),
        };
        result.map_err(|source| StorageError::Lock {
            action: mode.describe(),
            path: path.to_path_buf(),
            source,
        })?;

        let locked = Self {
            file,
            path: path.to_path_buf(),
            mode,
        };
        if mode != LockMode::None && !path.exists() {
            return Err(StorageError::RemovedWhileLocking {
                path: path.to_path_buf(),
            });
        }
        tracing::trace!(path = %path.display(), mode = ?mode, "file locked");
        Ok(locked)
    }

    /// Returns the path this file was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the lock currently held.
    #[must_use]
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Truncates the file to zero length.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be resized.
    pub fn truncate(&mut self) -> StorageResult<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    /// Flushes pending writes to disk, then releases the lock and closes.
    ///
    /// # Errors
    ///
    /// Returns an error if syncing or unlocking fails. The handle is closed
    /// either way.
    pub fn close_and_unlock(mut self) -> StorageResult<()> {
        self.file.flush()?;
        if self.mode == LockMode::Exclusive {
            self.file.sync_all()?;
        }
        self.release()
    }

    fn release(&mut self) -> StorageResult<()> {
        if self.mode == LockMode::None {
            return Ok(());
        }
        self.mode = LockMode::None;
        FileExt::unlock(&self.file).map_err(|source| StorageError::Lock {
            action: "release",
            path: self.path.clone(),
            source,
        })
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            tracing::warn!(error = %err, "failed to release file lock on drop");
        }
    }
}

impl Read for LockedFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for LockedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for LockedFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use tempfile::tempdir;

    fn open(path: &Path) -> File {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .unwrap()
    }

    #[test]
    fn exclusive_lock_blocks_try_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("locked.dat");

        let held = LockedFile::lock(open(&path), &path, LockMode::Exclusive).unwrap();
        let other = open(&path);
        assert!(FileExt::try_lock_shared(&other).is_err());

        held.close_and_unlock().unwrap();
        assert!(FileExt::try_lock_exclusive(&other).is_ok());
    }

    #[test]
    fn shared_locks_coexist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shared.dat");
        std::fs::write(&path, b"x").unwrap();

        let a = LockedFile::lock(open(&path), &path, LockMode::Shared).unwrap();
        let b = LockedFile::lock(open(&path), &path, LockMode::Shared).unwrap();
        assert_eq!(a.mode(), LockMode::Shared);
        assert_eq!(b.mode(), LockMode::Shared);
    }

    #[test]
    fn drop_releases_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dropped.dat");

        {
            let _held = LockedFile::lock(open(&path), &path, LockMode::Exclusive).unwrap();
        }
        let other = open(&path);
        assert!(FileExt::try_lock_exclusive(&other).is_ok());
    }

    #[test]
    fn removed_file_is_detected_after_locking() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.dat");
        let file = open(&path);
        std::fs::remove_file(&path).unwrap();

        let result = LockedFile::lock(file, &path, LockMode::Shared);
        assert!(matches!(
            result,
            Err(StorageError::RemovedWhileLocking { .. })
        ));
    }

    #[test]
    fn truncate_resets_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trunc.dat");
        std::fs::write(&path, b"old contents").unwrap();

        let mut file = LockedFile::lock(open(&path), &path, LockMode::Exclusive).unwrap();
        file.truncate().unwrap();
        file.write_all(b"new").unwrap();
        file.close_and_unlock().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }
}
