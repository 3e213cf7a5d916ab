//! Row-major input to columnar file.
//!
//! The writer validates and normalizes rows, optionally reorders them for
//! better run-length compression, pivots them into columns and stages the
//! result in a private temp file before placing it at the output path.

use crate::cardinality::cardinality_sort;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::header::{FileHeader, FileStatus, MetricStats, Number};
use crate::schema::{validate_date, ColumnDefinition, Schema};
use crate::timing::Stopwatch;
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;
use strata_codec::scalar::{convert, stringify};
use strata_codec::{line, rle, Value};
use strata_storage::{FileResources, FsResources, TempFile};

/// Rows to write, with their column definitions.
#[derive(Debug, Clone)]
pub struct WriteRequest {
    /// Partition date, `YYYY-MM-DD`.
    pub date: String,
    /// The metric column.
    pub metric: ColumnDefinition,
    /// The dimension columns.
    pub dimensions: Vec<ColumnDefinition>,
    /// Column names, in the order values appear in each row.
    pub headers: Vec<String>,
    /// Row-major values.
    pub rows: Vec<Vec<Value>>,
}

/// Per-write switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Run-length compress columns that meet the savings threshold.
    pub rle: bool,
    /// Reorder rows by column cardinality first. Ignored without `rle`.
    pub cardinality_sort: bool,
    /// Hold an exclusive lock on the output while placing it.
    pub lock_output: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            rle: true,
            cardinality_sort: false,
            lock_output: true,
        }
    }
}

/// Outcome of a write or combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    /// Whether the output carries rows.
    pub status: FileStatus,
    /// Wall time of the whole operation.
    pub write_time_ms: u64,
}

/// Writes columnar files.
#[derive(Debug)]
pub struct Writer<R: FileResources = FsResources> {
    resources: R,
    config: Config,
}

impl Writer<FsResources> {
    /// Creates a writer on the local filesystem.
    ///
    /// # Errors
    ///
    /// Fails if the configured temp directory is unusable.
    pub fn new(config: Config) -> CoreResult<Self> {
        Ok(Self::with_resources(config.resources()?, config))
    }
}

impl<R: FileResources> Writer<R> {
    /// Creates a writer over custom file resources.
    pub fn with_resources(resources: R, config: Config) -> Self {
        Self { resources, config }
    }

    /// Returns the file resources.
    pub fn resources(&self) -> &R {
        &self.resources
    }

    /// Writes `request` to `output`, which must not exist yet.
    ///
    /// # Errors
    ///
    /// Fails on invalid dates, schemas or rows, on codec round-trip or
    /// integrity check failures, and on I/O errors. Nothing is left at
    /// `output` and every temp file is removed on failure.
    pub fn write(
        &self,
        request: WriteRequest,
        output: &Path,
        options: WriteOptions,
    ) -> CoreResult<WriteSummary> {
        let stopwatch = Stopwatch::start();
        validate_date(&request.date)?;
        let schema = Schema::new(request.metric, request.dimensions)?;
        self.resources.check_output_path(output)?;

        if request.rows.is_empty() {
            let header = FileHeader::no_data(&request.date, schema.metric().name());
            let mut staged = self.resources.open_temp_read_write()?;
            staged.write_all(header.to_line()?.as_bytes())?;
            staged.flush()?;
            self.resources.move_into(staged, output, options.lock_output)?;
            let summary = WriteSummary {
                status: FileStatus::NoData,
                write_time_ms: stopwatch.elapsed_ms(),
            };
            tracing::info!(path = %output.display(), ms = summary.write_time_ms, "no-data file written");
            return Ok(summary);
        }

        let row_count = request.rows.len();
        let rows = align_rows(&schema, &request.headers, request.rows)?;
        let rows = normalize_rows(&schema, rows)?;
        let stats = MetricStats::from_values(
            schema.metric().data_type(),
            rows.iter().map(|row| &row[schema.metric_index()]),
        )?
        .ok_or_else(|| CoreError::integrity("write", "no metric statistics for a non-empty row set"))?;

        let mut table: Vec<Vec<String>> = rows
            .iter()
            .map(|row| row.iter().map(stringify).collect())
            .collect();
        if options.rle && options.cardinality_sort {
            let names: Vec<String> = schema.names().map(ToString::to_string).collect();
            table = cardinality_sort(&names, table)?;
        }

        let columns = transpose(&schema, table)?;
        let columns = self.encode_columns(&schema, columns, options.rle)?;
        let (body, offsets) = self.stage_columns(&columns)?;

        let header = FileHeader::has_data(&request.date, &schema, stats, &offsets)?;
        let staged = self.stage_with_header(&header, body)?;
        self.resources.move_into(staged, output, options.lock_output)?;

        let summary = WriteSummary {
            status: FileStatus::HasData,
            write_time_ms: stopwatch.elapsed_ms(),
        };
        tracing::info!(
            path = %output.display(),
            rows = row_count,
            columns = schema.len(),
            ms = summary.write_time_ms,
            "file written"
        );
        Ok(summary)
    }

    fn encode_columns(
        &self,
        schema: &Schema,
        columns: Vec<Vec<String>>,
        rle_enabled: bool,
    ) -> CoreResult<Vec<Vec<String>>> {
        schema
            .columns()
            .iter()
            .zip(columns)
            .map(|(definition, values)| {
                if rle_enabled {
                    let before = values.len();
                    let encoded = rle::compress_if_threshold_met(
                        definition.name(),
                        values,
                        self.config.rle_threshold_percent,
                    )?;
                    tracing::trace!(column = definition.name(), before, after = encoded.len(), "column encoded");
                    Ok(encoded)
                } else {
                    rle::ensure_no_separator(definition.name(), &values)?;
                    Ok(values)
                }
            })
            .collect()
    }

    /// Writes one line per column to a temp file and returns it with each
    /// line's byte offset.
    fn stage_columns(&self, columns: &[Vec<String>]) -> CoreResult<(TempFile, Vec<u64>)> {
        let mut body = self.resources.open_temp_read_write()?;
        let mut offsets = Vec::with_capacity(columns.len());
        let mut offset = 0u64;
        for values in columns {
            offsets.push(offset);
            offset += line::write_line(&mut body, values)?;
        }
        let len = body.len()?;
        if len != offset {
            return Err(CoreError::integrity(
                "write",
                format!("staged {len} bytes but column lines add up to {offset}"),
            ));
        }
        Ok((body, offsets))
    }

    fn stage_with_header(&self, header: &FileHeader, body: TempFile) -> CoreResult<TempFile> {
        let mut staged = self.resources.open_temp_read_write()?;
        staged.write_all(header.to_line()?.as_bytes())?;
        io::copy(&mut body.reopen()?, &mut staged)?;
        staged.flush()?;
        self.resources.close_and_delete(body)?;
        Ok(staged)
    }
}

/// Splits name-keyed records into a header list and row-major values.
///
/// # Errors
///
/// Fails if the records do not all list the same names in the same order.
pub fn separate_headers_and_rows(
    records: Vec<Vec<(String, Value)>>,
) -> CoreResult<(Vec<String>, Vec<Vec<Value>>)> {
    let mut records = records.into_iter();
    let Some(first) = records.next() else {
        return Ok((Vec::new(), Vec::new()));
    };
    let (headers, first_row): (Vec<String>, Vec<Value>) = first.into_iter().unzip();
    let mut rows = vec![first_row];
    for (number, record) in records.enumerate() {
        if record.len() != headers.len()
            || record.iter().zip(&headers).any(|((name, _), header)| name != header)
        {
            return Err(CoreError::validation(format!(
                "record {} does not list the columns {headers:?} in the same order",
                number + 1
            )));
        }
        rows.push(record.into_iter().map(|(_, value)| value).collect());
    }
    Ok((headers, rows))
}

/// Permutes every row into canonical column order.
fn align_rows(schema: &Schema, headers: &[String], rows: Vec<Vec<Value>>) -> CoreResult<Vec<Vec<Value>>> {
    let expected = || schema.names().collect::<Vec<_>>();
    if headers.len() != schema.len() {
        return Err(CoreError::validation(format!(
            "headers {headers:?} do not match the columns {:?}",
            expected()
        )));
    }
    // positions[canonical index] = position in the caller's rows
    let mut positions: Vec<Option<usize>> = vec![None; schema.len()];
    for (position, name) in headers.iter().enumerate() {
        let index = schema.index_of(name).ok_or_else(|| {
            CoreError::validation(format!(
                "header {name:?} is not one of the columns {:?}",
                expected()
            ))
        })?;
        if positions[index].replace(position).is_some() {
            return Err(CoreError::validation(format!("duplicate header {name:?}")));
        }
    }
    let positions: Vec<usize> = positions
        .into_iter()
        .collect::<Option<_>>()
        .ok_or_else(|| CoreError::validation("headers do not cover every column"))?;
    let in_order = positions.iter().enumerate().all(|(i, p)| i == *p);

    rows.into_iter()
        .enumerate()
        .map(|(number, mut row)| {
            if row.len() != schema.len() {
                return Err(CoreError::validation(format!(
                    "row {number} has {} values, expected {}",
                    row.len(),
                    schema.len()
                )));
            }
            if in_order {
                return Ok(row);
            }
            Ok(positions
                .iter()
                .map(|&p| std::mem::replace(&mut row[p], Value::Null))
                .collect())
        })
        .collect()
}

/// Substitutes empty values for nulls and coerces the metric to its type.
fn normalize_rows(schema: &Schema, rows: Vec<Vec<Value>>) -> CoreResult<Vec<Vec<Value>>> {
    let metric_index = schema.metric_index();
    let metric = schema.metric();
    rows.into_iter()
        .enumerate()
        .map(|(number, row)| {
            row.into_iter()
                .zip(schema.columns())
                .enumerate()
                .map(|(index, (value, definition))| {
                    if value.is_null() {
                        return Ok(definition.empty_value().clone());
                    }
                    if index != metric_index {
                        return Ok(value);
                    }
                    if !is_numeric_input(&value) {
                        return Err(CoreError::validation(format!(
                            "row {number}: metric {:?} value {value} is not numeric",
                            metric.name()
                        )));
                    }
                    let converted = convert(&value, metric.data_type(), metric.precision());
                    Number::from_value(&converted).map_err(|_| {
                        CoreError::validation(format!(
                            "row {number}: metric {:?} value {value} is not finite",
                            metric.name()
                        ))
                    })?;
                    Ok(converted)
                })
                .collect()
        })
        .collect()
}

fn is_numeric_input(value: &Value) -> bool {
    match value {
        Value::Int(_) | Value::Float(_) => true,
        Value::Text(s) => s.trim().parse::<f64>().is_ok(),
        _ => false,
    }
}

/// Pivots row-major strings into columns, checking shape and metric sum.
fn transpose(schema: &Schema, rows: Vec<Vec<String>>) -> CoreResult<Vec<Vec<String>>> {
    let width = schema.len();
    let row_count = rows.len();
    let metric_index = schema.metric_index();
    let before = metric_checksum(schema, rows.iter().map(|row| row[metric_index].as_str()))?;

    let mut columns: Vec<Vec<String>> = (0..width).map(|_| Vec::with_capacity(row_count)).collect();
    for row in rows {
        if row.len() != width {
            return Err(CoreError::integrity(
                "transpose",
                format!("row of {} values in a table of {width} columns", row.len()),
            ));
        }
        for (column, value) in columns.iter_mut().zip(row) {
            column.push(value);
        }
    }

    if columns.len() != width {
        return Err(CoreError::integrity(
            "transpose",
            format!("{} columns after transpose, expected {width}", columns.len()),
        ));
    }
    if let Some((index, column)) = columns.iter().enumerate().find(|(_, c)| c.len() != row_count) {
        return Err(CoreError::integrity(
            "transpose",
            format!(
                "column {index} has {} values, expected {row_count}",
                column.len()
            ),
        ));
    }
    let after = metric_checksum(schema, columns[metric_index].iter().map(String::as_str))?;
    if before != after {
        return Err(CoreError::integrity(
            "transpose",
            format!("metric sum changed from {before:?} to {after:?}"),
        ));
    }
    Ok(columns)
}

fn metric_checksum<'a>(schema: &Schema, mut values: impl Iterator<Item = &'a str>) -> CoreResult<Option<Number>> {
    let metric = schema.metric();
    values.try_fold(None, |sum: Option<Number>, raw| {
        let n = Number::from_value(&metric.decode(raw))?;
        Ok(Some(match sum {
            Some(s) => s.checked_add(n)?,
            None => n,
        }))
    })
}
