//! # Strata Core
//!
//! Writer, reader and combiner for the strata columnar file format.
//!
//! A strata file holds one (date, metric) partition: a JSON header line
//! followed by one line per column, columns in alphabetical order. The header
//! records each column's byte offset, so a query reads only the lines it
//! needs.
//!
//! This crate provides:
//! - [`Writer`]: rows to a validated, optionally run-length compressed file
//! - [`Reader`]: column-pruned, constraint-filtered, optionally aggregated
//!   queries with a text response payload
//! - [`Combiner`]: byte-level merge of many same-schema files, from loose
//!   files or a zip archive
//! - [`Response`]: decoder for reader payloads
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use strata_core::{
//!     ColumnDefinition, Config, DataType, QueryRequest, Reader, Value, WriteOptions,
//!     WriteRequest, Writer,
//! };
//!
//! let request = WriteRequest {
//!     date: "2024-03-01".into(),
//!     metric: ColumnDefinition::metric("clicks", DataType::Int, 0)?,
//!     dimensions: vec![ColumnDefinition::dimension("country", DataType::String, "")?],
//!     headers: vec!["clicks".into(), "country".into()],
//!     rows: vec![vec![Value::Int(3), Value::from("us")]],
//! };
//! let output = Path::new("clicks.strata");
//! Writer::new(Config::default())?.write(request, output, WriteOptions::default())?;
//!
//! let mut reader = Reader::new(Config::default())?;
//! reader.run(&QueryRequest {
//!     date: "2024-03-01".into(),
//!     metric: "clicks".into(),
//!     dimensions: vec!["country".into()],
//!     constraints: Default::default(),
//!     do_aggregate: true,
//!     do_aggregate_meta: false,
//!     file: output.to_path_buf(),
//! })?;
//! println!("{}", reader.response_payload()?);
//! # Ok::<(), strata_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cardinality;
mod combiner;
mod config;
mod constraint;
mod error;
mod header;
mod predicate;
mod reader;
mod response;
mod schema;
mod timing;
mod writer;

pub use cardinality::{cardinalities, cardinality_sort, sort_order, sort_rows, CardinalityItem};
pub use combiner::{CombineOptions, CombineRequest, Combiner, PartialSources};
pub use config::Config;
pub use constraint::{Comparator, Constraint, ConstraintGroups};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use header::{
    ColumnMeta, FileHeader, FileStatus, MetricStats, Number, FILE_EXTENSION, LIB_MAJOR_VERSION,
};
pub use predicate::{CmpOp, CompiledConstraints, NumericTest, Predicate, TextTest};
pub use reader::{content_key, QueryRequest, Reader, ResultRow};
pub use response::{
    Response, ResponseColumn, ResponseMetadata, ResponseRow, ResponseStatus, KEY_COLUMN,
};
pub use schema::{validate_date, validate_name, AxisType, ColumnDefinition, Schema};
pub use timing::{Profile, Stopwatch};
pub use writer::{separate_headers_and_rows, WriteOptions, WriteRequest, WriteSummary, Writer};

pub use strata_codec::{DataType, Value};
