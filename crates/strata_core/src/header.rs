//! The JSON header line at the top of every file.

use crate::error::{CoreError, CoreResult};
use crate::schema::{ColumnDefinition, Schema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::BufRead;
use strata_codec::{DataType, Value};

/// Highest file format major version this library reads and writes.
pub const LIB_MAJOR_VERSION: u32 = 1;

/// Conventional file extension.
pub const FILE_EXTENSION: &str = "strata";

/// Whether a file carries rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    /// At least one row follows the header.
    #[serde(rename = "has data")]
    HasData,
    /// The file is a bare header.
    #[serde(rename = "no data")]
    NoData,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::HasData => "has data",
            Self::NoData => "no data",
        })
    }
}

/// A metric statistic: an integer for int metrics, a float otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    /// Integer statistic.
    Int(i64),
    /// Float statistic.
    Float(f64),
}

impl Number {
    /// Returns the value as a float.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    /// Converts a typed metric value.
    ///
    /// # Errors
    ///
    /// Fails for non-numeric or non-finite values.
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        match value {
            Value::Int(i) => Ok(Self::Int(*i)),
            Value::Float(f) if f.is_finite() => Ok(Self::Float(*f)),
            other => Err(CoreError::validation(format!(
                "metric value {other} is not a finite number"
            ))),
        }
    }

    /// Adds two numbers, staying integral when both sides are.
    ///
    /// # Errors
    ///
    /// Fails on integer overflow or a non-finite float result.
    pub fn checked_add(self, other: Self) -> CoreResult<Self> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a
                .checked_add(b)
                .map(Self::Int)
                .ok_or_else(|| CoreError::validation(format!("metric sum overflows: {a} + {b}"))),
            (a, b) => {
                let sum = a.as_f64() + b.as_f64();
                if sum.is_finite() {
                    Ok(Self::Float(sum))
                } else {
                    Err(CoreError::validation("metric sum is not finite"))
                }
            }
        }
    }

    /// The smaller of two numbers.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Self::Int(a.min(b)),
            (a, b) => Self::Float(a.as_f64().min(b.as_f64())),
        }
    }

    /// The larger of two numbers.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Self::Int(a.max(b)),
            (a, b) => Self::Float(a.as_f64().max(b.as_f64())),
        }
    }

    /// Coerces to the representation used for `data_type`.
    #[must_use]
    pub fn for_type(self, data_type: DataType) -> Self {
        match (data_type, self) {
            (DataType::Int, Self::Float(f)) => Self::Int(Value::Float(f).to_int()),
            (DataType::Int, n) => n,
            (_, n) => Self::Float(n.as_f64()),
        }
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        match n {
            Number::Int(i) => Self::Int(i),
            Number::Float(f) => Self::Float(f),
        }
    }
}

/// Min, max, sum and count of a metric column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricStats {
    /// Smallest value.
    pub min: Number,
    /// Largest value.
    pub max: Number,
    /// Sum of all values.
    pub sum: Number,
    /// Number of values.
    pub count: u64,
}

impl MetricStats {
    /// Computes statistics over typed metric values.
    ///
    /// Returns `None` for an empty input.
    ///
    /// # Errors
    ///
    /// Fails if a value is not numeric or the sum overflows.
    pub fn from_values<'a>(
        data_type: DataType,
        values: impl IntoIterator<Item = &'a Value>,
    ) -> CoreResult<Option<Self>> {
        let mut stats: Option<Self> = None;
        for value in values {
            let n = Number::from_value(value)?.for_type(data_type);
            stats = Some(match stats {
                None => Self {
                    min: n,
                    max: n,
                    sum: n,
                    count: 1,
                },
                Some(s) => Self {
                    min: s.min.min(n),
                    max: s.max.max(n),
                    sum: s.sum.checked_add(n)?,
                    count: s.count + 1,
                },
            });
        }
        Ok(stats)
    }

    /// Combines the statistics of two disjoint row sets.
    ///
    /// # Errors
    ///
    /// Fails if the sum overflows.
    pub fn merge(&self, other: &Self) -> CoreResult<Self> {
        Ok(Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            sum: self.sum.checked_add(other.sum)?,
            count: self.count + other.count,
        })
    }
}

/// Where a column lives in a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// The column's definition.
    pub definition: ColumnDefinition,
    /// Canonical (alphabetical) index.
    pub index: usize,
    /// Byte offset of the column's line, counted from the end of the header.
    pub offset: u64,
}

/// The parsed header line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    /// Partition date, `YYYY-MM-DD`.
    pub date: String,
    /// Name of the metric column.
    pub metric: String,
    /// Whether rows follow.
    pub status: FileStatus,
    /// Format major version of the writer.
    pub lib_version: u32,
    /// Smallest metric value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Number>,
    /// Largest metric value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Number>,
    /// Sum of the metric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<Number>,
    /// Row count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// Per-column definition, index and offset, keyed by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_meta: Option<BTreeMap<String, ColumnMeta>>,
}

impl FileHeader {
    /// Header of a file without rows.
    #[must_use]
    pub fn no_data(date: &str, metric: &str) -> Self {
        Self {
            date: date.to_string(),
            metric: metric.to_string(),
            status: FileStatus::NoData,
            lib_version: LIB_MAJOR_VERSION,
            min: None,
            max: None,
            sum: None,
            count: None,
            column_meta: None,
        }
    }

    /// Header of a file with rows; `offsets` are in canonical column order.
    ///
    /// # Errors
    ///
    /// Fails if `offsets` does not have one entry per schema column.
    pub fn has_data(
        date: &str,
        schema: &Schema,
        stats: MetricStats,
        offsets: &[u64],
    ) -> CoreResult<Self> {
        if offsets.len() != schema.len() {
            return Err(CoreError::integrity(
                "header",
                format!(
                    "{} column offsets for {} columns",
                    offsets.len(),
                    schema.len()
                ),
            ));
        }
        let column_meta = schema
            .columns()
            .iter()
            .zip(offsets)
            .enumerate()
            .map(|(index, (definition, offset))| {
                (
                    definition.name().to_string(),
                    ColumnMeta {
                        definition: definition.clone(),
                        index,
                        offset: *offset,
                    },
                )
            })
            .collect();
        Ok(Self {
            date: date.to_string(),
            metric: schema.metric().name().to_string(),
            status: FileStatus::HasData,
            lib_version: LIB_MAJOR_VERSION,
            min: Some(stats.min),
            max: Some(stats.max),
            sum: Some(stats.sum),
            count: Some(stats.count),
            column_meta: Some(column_meta),
        })
    }

    /// Serializes the header as a newline-terminated line.
    ///
    /// # Errors
    ///
    /// Fails if serialization fails.
    pub fn to_line(&self) -> CoreResult<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Parses a header line.
    ///
    /// # Errors
    ///
    /// Fails if the line is not a valid header object.
    pub fn parse(line: &str) -> CoreResult<Self> {
        serde_json::from_str(line.trim_end_matches('\n'))
            .map_err(|err| CoreError::validation(format!("invalid file header: {err}")))
    }

    /// Reads the header line from the start of `input`.
    ///
    /// Returns the header and its length in bytes including the newline, or
    /// `None` if the input is empty.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors, a missing newline, or an invalid header.
    pub fn read_from<R: BufRead>(input: &mut R) -> CoreResult<Option<(Self, u64)>> {
        let mut line = String::new();
        let len = input.read_line(&mut line)?;
        if len == 0 {
            return Ok(None);
        }
        if !line.ends_with('\n') {
            return Err(CoreError::validation(
                "file header is not terminated by a newline",
            ));
        }
        Ok(Some((Self::parse(&line)?, len as u64)))
    }

    /// The statistics recorded in a has-data header.
    ///
    /// # Errors
    ///
    /// Fails if any of min, max, sum or count is missing.
    pub fn stats(&self) -> CoreResult<MetricStats> {
        match (self.min, self.max, self.sum, self.count) {
            (Some(min), Some(max), Some(sum), Some(count)) => Ok(MetricStats {
                min,
                max,
                sum,
                count,
            }),
            _ => Err(CoreError::validation(
                "file header is missing one of min, max, sum or count",
            )),
        }
    }

    /// Column meta of a has-data header.
    ///
    /// # Errors
    ///
    /// Fails if the header has no column meta.
    pub fn columns(&self) -> CoreResult<&BTreeMap<String, ColumnMeta>> {
        self.column_meta
            .as_ref()
            .ok_or_else(|| CoreError::validation("file header has data but no column_meta"))
    }

    /// Checks a header before reading it for `date` and `metric`.
    ///
    /// Files written by a newer major version are rejected.
    ///
    /// # Errors
    ///
    /// Returns the first failed check.
    pub fn validate_for_read(&self, date: &str, metric: &str) -> CoreResult<()> {
        if self.lib_version > LIB_MAJOR_VERSION {
            return Err(CoreError::validation(format!(
                "file lib_version {} is newer than supported version {LIB_MAJOR_VERSION}",
                self.lib_version
            )));
        }
        self.validate_identity(date, metric)?;
        if self.status == FileStatus::HasData {
            self.columns()?;
        }
        Ok(())
    }

    /// Checks a header before merging it into a file of `schema`.
    ///
    /// The version must match exactly, and a has-data header must carry the
    /// schema's columns with identical indices and definitions.
    ///
    /// # Errors
    ///
    /// Returns a schema mismatch naming the first offending column.
    pub fn validate_for_combine(&self, date: &str, schema: &Schema) -> CoreResult<()> {
        if self.lib_version != LIB_MAJOR_VERSION {
            return Err(CoreError::schema_mismatch(format!(
                "lib_version {} does not match {LIB_MAJOR_VERSION}",
                self.lib_version
            )));
        }
        self.validate_identity(date, schema.metric().name())?;
        if self.status == FileStatus::NoData {
            return Ok(());
        }
        self.stats()?;

        let columns = self.columns()?;
        if let Some(extra) = columns.keys().find(|name| schema.index_of(name).is_none()) {
            return Err(CoreError::schema_mismatch(format!(
                "unexpected column {extra:?}"
            )));
        }
        for (index, expected) in schema.columns().iter().enumerate() {
            let name = expected.name();
            let meta = columns
                .get(name)
                .ok_or_else(|| CoreError::schema_mismatch(format!("missing column {name:?}")))?;
            if meta.index != index {
                return Err(CoreError::schema_mismatch(format!(
                    "column {name:?} has index {}, expected {index}",
                    meta.index
                )));
            }
            if &meta.definition != expected {
                return Err(CoreError::schema_mismatch(format!(
                    "column {name:?} definition differs from the target schema"
                )));
            }
        }
        Ok(())
    }

    fn validate_identity(&self, date: &str, metric: &str) -> CoreResult<()> {
        if self.date != date {
            return Err(CoreError::schema_mismatch(format!(
                "file date {:?} does not match requested date {date:?}",
                self.date
            )));
        }
        if self.metric != metric {
            return Err(CoreError::schema_mismatch(format!(
                "file metric {:?} does not match requested metric {metric:?}",
                self.metric
            )));
        }
        Ok(())
    }
}
