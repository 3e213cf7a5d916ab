//! # Strata Testkit
//!
//! Test utilities for the strata writer, reader and combiner.
//!
//! This crate provides:
//! - Scratch directories with a matching engine configuration
//! - A sample dataset with one column of every data type
//! - Property-based generators for column names, values and rows
//! - A file resource double that records every open, seek and read
//!
//! ## Usage
//!
//! ```rust,ignore
//! use strata_testkit::prelude::*;
//!
//! #[test]
//! fn reads_what_was_written() {
//!     with_test_dir(|dir| {
//!         let file = dir.write_sample("visits");
//!         let mut reader = dir.reader();
//!         reader.run(&dir.query(&file, &["country"])).unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod recording;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::recording::*;
}

pub use fixtures::*;
pub use generators::*;
pub use recording::*;
