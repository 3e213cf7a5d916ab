//! # Strata Storage
//!
//! File resources for the strata columnar format.
//!
//! This crate is the only place that touches file handles. It knows nothing
//! about the format itself: it opens and locks files, stages output in
//! private temp files, and copies finished output into place.
//!
//! ## Design Principles
//!
//! - Whole-file advisory locks only (shared for readers, exclusive for writers)
//! - Output is staged in a temp file and placed in one step at the end
//! - Temp files are removed on every exit path
//! - Callers depend on the [`FileResources`] trait, not on the filesystem
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::io::Write;
//! use std::path::Path;
//! use strata_storage::{FileResources, FsResources};
//!
//! let resources = FsResources::new();
//! resources.check_output_path(Path::new("out.strata")).unwrap();
//! let mut temp = resources.open_temp_read_write().unwrap();
//! temp.write_all(b"hello\n").unwrap();
//! resources.move_into(temp, Path::new("out.strata"), true).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod lock;
mod resources;
mod temp;

pub use error::{StorageError, StorageResult};
pub use lock::{LockMode, LockedFile};
pub use resources::{FileResources, FsResources};
pub use temp::TempFile;
