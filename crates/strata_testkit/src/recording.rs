//! A file resource double that records what the engine touches.
//!
//! Wrap any [`FileResources`] in [`RecordingResources`] and hand it to a
//! writer, reader or combiner. Every open, seek, read and close on input
//! handles is logged with the byte position it happened at, so tests can
//! assert which parts of a file a query actually visited.
//!
//! [`StallingResources`] makes fresh inputs look empty for their first
//! reads, the way a file does while its writer has not flushed yet.

use parking_lot::Mutex;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strata_storage::{FileResources, FsResources, LockMode, LockedFile, StorageResult, TempFile};

/// One observed I/O operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoEvent {
    /// An input was opened.
    Open {
        /// File opened.
        path: PathBuf,
        /// Lock requested.
        lock: LockMode,
    },
    /// An input cursor moved.
    Seek {
        /// File seeked.
        path: PathBuf,
        /// Absolute position after the seek.
        position: u64,
    },
    /// Bytes were read from an input.
    Read {
        /// File read.
        path: PathBuf,
        /// Position of the first byte read.
        position: u64,
        /// Number of bytes read.
        len: usize,
    },
    /// An input was released through the resource provider.
    Close {
        /// File closed.
        path: PathBuf,
    },
    /// A temp file was placed at a destination.
    Move {
        /// Destination path.
        destination: PathBuf,
    },
}

type EventLog = Arc<Mutex<Vec<IoEvent>>>;

/// File resources that log every input operation.
#[derive(Debug, Default)]
pub struct RecordingResources<R: FileResources = FsResources> {
    inner: R,
    events: EventLog,
}

impl<R: FileResources> RecordingResources<R> {
    /// Wraps `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            events: Arc::default(),
        }
    }

    /// The wrapped resources.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Every event so far, in order.
    pub fn events(&self) -> Vec<IoEvent> {
        self.events.lock().clone()
    }

    /// Forgets every recorded event.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Seek targets on `path`, in order.
    pub fn seeks(&self, path: &Path) -> Vec<u64> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                IoEvent::Seek { path: p, position } if p == path => Some(*position),
                _ => None,
            })
            .collect()
    }

    /// `(position, len)` of every read on `path`, in order.
    pub fn reads(&self, path: &Path) -> Vec<(u64, usize)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                IoEvent::Read {
                    path: p,
                    position,
                    len,
                } if p == path => Some((*position, *len)),
                _ => None,
            })
            .collect()
    }

    /// Total bytes read from `path`.
    pub fn bytes_read(&self, path: &Path) -> u64 {
        self.reads(path).iter().map(|(_, len)| *len as u64).sum()
    }

    /// Locks requested when opening `path`.
    pub fn opens(&self, path: &Path) -> Vec<LockMode> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                IoEvent::Open { path: p, lock } if p == path => Some(*lock),
                _ => None,
            })
            .collect()
    }

    /// Opens minus closes across all paths.
    pub fn open_inputs(&self) -> usize {
        let events = self.events.lock();
        let opened = events
            .iter()
            .filter(|e| matches!(e, IoEvent::Open { .. }))
            .count();
        let closed = events
            .iter()
            .filter(|e| matches!(e, IoEvent::Close { .. }))
            .count();
        opened.saturating_sub(closed)
    }
}

impl<R: FileResources> FileResources for RecordingResources<R> {
    type Input = RecordingInput<R::Input>;

    fn open_for_read(&self, path: &Path, lock: LockMode) -> StorageResult<Self::Input> {
        let inner = self.inner.open_for_read(path, lock)?;
        self.events.lock().push(IoEvent::Open {
            path: path.to_path_buf(),
            lock,
        });
        Ok(RecordingInput {
            inner,
            path: path.to_path_buf(),
            position: 0,
            events: Arc::clone(&self.events),
        })
    }

    fn open_for_write(&self, path: &Path, lock: bool) -> StorageResult<LockedFile> {
        self.inner.open_for_write(path, lock)
    }

    fn open_temp_read_write(&self) -> StorageResult<TempFile> {
        self.inner.open_temp_read_write()
    }

    fn move_into(&self, temp: TempFile, destination: &Path, lock: bool) -> StorageResult<()> {
        self.inner.move_into(temp, destination, lock)?;
        self.events.lock().push(IoEvent::Move {
            destination: destination.to_path_buf(),
        });
        Ok(())
    }

    fn check_output_path(&self, path: &Path) -> StorageResult<()> {
        self.inner.check_output_path(path)
    }

    fn close_input(&self, input: Self::Input) -> StorageResult<()> {
        self.events.lock().push(IoEvent::Close {
            path: input.path.clone(),
        });
        self.inner.close_input(input.inner)
    }

    fn close_and_delete(&self, temp: TempFile) -> StorageResult<()> {
        self.inner.close_and_delete(temp)
    }
}

/// An input handle that logs its reads and seeks.
#[derive(Debug)]
pub struct RecordingInput<I> {
    inner: I,
    path: PathBuf,
    position: u64,
    events: EventLog,
}

impl<I: Read> Read for RecordingInput<I> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = self.inner.read(buf)?;
        if len > 0 {
            self.events.lock().push(IoEvent::Read {
                path: self.path.clone(),
                position: self.position,
                len,
            });
        }
        self.position += len as u64;
        Ok(len)
    }
}

impl<I: Seek> Seek for RecordingInput<I> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let position = self.inner.seek(pos)?;
        self.events.lock().push(IoEvent::Seek {
            path: self.path.clone(),
            position,
        });
        self.position = position;
        Ok(position)
    }
}

/// File resources whose inputs report end of file on their first
/// `stalls` reads.
#[derive(Debug)]
pub struct StallingResources<R: FileResources = FsResources> {
    inner: R,
    stalls: usize,
    stalled: Arc<AtomicUsize>,
}

impl<R: FileResources> StallingResources<R> {
    /// Wraps `inner`; every input opened stalls `stalls` times.
    pub fn new(inner: R, stalls: usize) -> Self {
        Self {
            inner,
            stalls,
            stalled: Arc::default(),
        }
    }

    /// Reads answered with end of file so far, across all inputs.
    pub fn stalled(&self) -> usize {
        self.stalled.load(Ordering::SeqCst)
    }
}

impl<R: FileResources> FileResources for StallingResources<R> {
    type Input = StallingInput<R::Input>;

    fn open_for_read(&self, path: &Path, lock: LockMode) -> StorageResult<Self::Input> {
        Ok(StallingInput {
            inner: self.inner.open_for_read(path, lock)?,
            remaining: self.stalls,
            stalled: Arc::clone(&self.stalled),
        })
    }

    fn open_for_write(&self, path: &Path, lock: bool) -> StorageResult<LockedFile> {
        self.inner.open_for_write(path, lock)
    }

    fn open_temp_read_write(&self) -> StorageResult<TempFile> {
        self.inner.open_temp_read_write()
    }

    fn move_into(&self, temp: TempFile, destination: &Path, lock: bool) -> StorageResult<()> {
        self.inner.move_into(temp, destination, lock)
    }

    fn check_output_path(&self, path: &Path) -> StorageResult<()> {
        self.inner.check_output_path(path)
    }

    fn close_input(&self, input: Self::Input) -> StorageResult<()> {
        self.inner.close_input(input.inner)
    }

    fn close_and_delete(&self, temp: TempFile) -> StorageResult<()> {
        self.inner.close_and_delete(temp)
    }
}

/// An input handle that answers its first reads with end of file.
#[derive(Debug)]
pub struct StallingInput<I> {
    inner: I,
    remaining: usize,
    stalled: Arc<AtomicUsize>,
}

impl<I: Read> Read for StallingInput<I> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining > 0 && !buf.is_empty() {
            self.remaining -= 1;
            self.stalled.fetch_add(1, Ordering::SeqCst);
            return Ok(0);
        }
        self.inner.read(buf)
    }
}

impl<I: Seek> Seek for StallingInput<I> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}
