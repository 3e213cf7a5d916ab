//! The file resource provider consumed by the engine.

use crate::error::{StorageError, StorageResult};
use crate::lock::{LockMode, LockedFile};
use crate::temp::TempFile;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};

/// Opens, locks, stages and places files on behalf of the engine.
///
/// The writer, reader and combiner never touch raw file handles directly;
/// everything goes through this trait so tests can observe or fake I/O.
///
/// # Invariants
///
/// - every lock taken by `open_for_read`/`open_for_write` is released when
///   the returned handle is closed or dropped
/// - temp files are deleted on every exit path
/// - `move_into` never leaves a partially written destination visible
///   without holding the requested lock on it
pub trait FileResources {
    /// Handle type returned for reading existing files.
    type Input: Read + Seek;

    /// Opens an existing file for reading under `lock`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be locked, or was
    /// removed while waiting for the lock.
    fn open_for_read(&self, path: &Path, lock: LockMode) -> StorageResult<Self::Input>;

    /// Opens (creating if needed) a file for writing and truncates it.
    ///
    /// With `lock` set, an exclusive lock is held until the handle closes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created, locked or truncated.
    fn open_for_write(&self, path: &Path, lock: bool) -> StorageResult<LockedFile>;

    /// Creates a private read/write temp file.
    ///
    /// # Errors
    ///
    /// Returns an error if the temp directory is unusable.
    fn open_temp_read_write(&self) -> StorageResult<TempFile>;

    /// Copies `temp` into `destination` and deletes `temp`.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination cannot be written. `temp` is
    /// deleted regardless.
    fn move_into(&self, temp: TempFile, destination: &Path, lock: bool) -> StorageResult<()>;

    /// Checks that `path` is a usable new output location: non-empty, not
    /// yet existing, and inside a writable directory.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first unmet condition.
    fn check_output_path(&self, path: &Path) -> StorageResult<()>;

    /// Releases an input handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be released.
    fn close_input(&self, input: Self::Input) -> StorageResult<()> {
        drop(input);
        Ok(())
    }

    /// Closes and deletes a temp file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be removed.
    fn close_and_delete(&self, temp: TempFile) -> StorageResult<()> {
        temp.close_and_delete()
    }
}

/// File resources backed by the local filesystem.
#[derive(Debug, Clone)]
pub struct FsResources {
    tmp_dir: PathBuf,
}

impl FsResources {
    /// Uses the system temp directory for staging.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tmp_dir: std::env::temp_dir(),
        }
    }

    /// Uses `dir` for staging.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` is not a writable directory.
    pub fn with_tmp_dir(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let tmp_dir = dir.into();
        if !tmp_dir.is_dir() {
            return Err(StorageError::NotFound { path: tmp_dir });
        }
        probe_writable(&tmp_dir)?;
        Ok(Self { tmp_dir })
    }

    /// Returns the staging directory.
    #[must_use]
    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }
}

impl Default for FsResources {
    fn default() -> Self {
        Self::new()
    }
}

impl FileResources for FsResources {
    type Input = LockedFile;

    fn open_for_read(&self, path: &Path, lock: LockMode) -> StorageResult<LockedFile> {
        let file = File::open(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound {
                path: path.to_path_buf(),
            },
            _ => StorageError::Io(err),
        })?;
        LockedFile::lock(file, path, lock)
    }

    fn open_for_write(&self, path: &Path, lock: bool) -> StorageResult<LockedFile> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let mode = if lock {
            LockMode::Exclusive
        } else {
            LockMode::None
        };
        let mut locked = LockedFile::lock(file, path, mode)?;
        if !path.exists() {
            return Err(StorageError::RemovedWhileLocking {
                path: path.to_path_buf(),
            });
        }
        locked.truncate()?;
        Ok(locked)
    }

    fn open_temp_read_write(&self) -> StorageResult<TempFile> {
        TempFile::new_in(&self.tmp_dir)
    }

    fn move_into(&self, temp: TempFile, destination: &Path, lock: bool) -> StorageResult<()> {
        let copied = copy_temp(&temp, self, destination, lock);
        let deleted = temp.close_and_delete();
        let bytes = copied?;
        deleted?;
        tracing::debug!(path = %destination.display(), bytes, "file placed");
        Ok(())
    }

    fn check_output_path(&self, path: &Path) -> StorageResult<()> {
        if path.as_os_str().is_empty() {
            return Err(StorageError::invalid_path("output path is empty"));
        }
        if path.exists() {
            return Err(StorageError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dir.is_dir() {
            return Err(StorageError::NotFound { path: dir });
        }
        probe_writable(&dir)
    }

    fn close_input(&self, input: LockedFile) -> StorageResult<()> {
        input.close_and_unlock()
    }
}

fn copy_temp(
    temp: &TempFile,
    resources: &FsResources,
    destination: &Path,
    lock: bool,
) -> StorageResult<u64> {
    let mut source = temp.reopen()?;
    let mut target = resources.open_for_write(destination, lock)?;
    let bytes = io::copy(&mut source, &mut target)?;
    target.flush()?;
    target.close_and_unlock()?;
    Ok(bytes)
}

fn probe_writable(dir: &Path) -> StorageResult<()> {
    tempfile::Builder::new()
        .prefix(".strata-probe-")
        .tempfile_in(dir)
        .map(drop)
        .map_err(|_| StorageError::NotWritable {
            path: dir.to_path_buf(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn move_into_copies_and_deletes_temp() {
        let dir = tempdir().unwrap();
        let resources = FsResources::with_tmp_dir(dir.path()).unwrap();
        let mut temp = resources.open_temp_read_write().unwrap();
        temp.write_all(b"{\"status\":\"no data\"}\n").unwrap();
        let temp_path = temp.path().to_path_buf();

        let dest = dir.path().join("out.strata");
        resources.move_into(temp, &dest, true).unwrap();

        assert!(!temp_path.exists());
        assert_eq!(
            std::fs::read_to_string(&dest).unwrap(),
            "{\"status\":\"no data\"}\n"
        );
    }

    #[test]
    fn open_for_read_missing_file() {
        let dir = tempdir().unwrap();
        let resources = FsResources::new();
        let result = resources.open_for_read(&dir.path().join("nope"), LockMode::Shared);
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[test]
    fn open_for_write_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("existing");
        std::fs::write(&path, b"previous").unwrap();

        let resources = FsResources::new();
        let mut file = resources.open_for_write(&path, true).unwrap();
        file.write_all(b"next").unwrap();
        file.close_and_unlock().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"next");
    }

    #[test]
    fn check_output_path_rules() {
        let dir = tempdir().unwrap();
        let resources = FsResources::new();

        let fresh = dir.path().join("fresh.strata");
        assert!(resources.check_output_path(&fresh).is_ok());

        std::fs::write(&fresh, b"").unwrap();
        assert!(matches!(
            resources.check_output_path(&fresh),
            Err(StorageError::AlreadyExists { .. })
        ));

        assert!(matches!(
            resources.check_output_path(Path::new("")),
            Err(StorageError::InvalidPath { .. })
        ));

        let orphan = dir.path().join("missing_dir").join("out.strata");
        assert!(matches!(
            resources.check_output_path(&orphan),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn with_tmp_dir_requires_directory() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, b"").unwrap();
        assert!(FsResources::with_tmp_dir(&file).is_err());
        assert_eq!(
            FsResources::with_tmp_dir(dir.path()).unwrap().tmp_dir(),
            dir.path()
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn move_into_preserves_bytes(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let dir = tempdir().unwrap();
            let resources = FsResources::with_tmp_dir(dir.path()).unwrap();
            let mut temp = resources.open_temp_read_write().unwrap();
            temp.write_all(&data).unwrap();

            let dest = dir.path().join("placed");
            resources.move_into(temp, &dest, false).unwrap();
            prop_assert_eq!(std::fs::read(&dest).unwrap(), data);
        }
    }
}
