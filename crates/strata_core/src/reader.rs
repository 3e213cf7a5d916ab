//! Column-pruned, filtered, optionally aggregated reads.
//!
//! A run only touches the header line and the lines of the columns the
//! query needs: the metric, the requested dimensions and every column a
//! constraint mentions. Every run ends in exactly one terminal state
//! (success, empty or error), recorded before the run returns.

use crate::config::Config;
use crate::constraint::ConstraintGroups;
use crate::error::{CoreError, CoreResult};
use crate::header::{ColumnMeta, FileHeader, FileStatus, MetricStats, Number};
use crate::predicate::CompiledConstraints;
use crate::response::{ResponseColumn, ResponseMetadata, ResponseStatus, KEY_COLUMN};
use crate::schema::{validate_date, validate_name, AxisType, ColumnDefinition};
use crate::timing::{Profile, Stopwatch};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use strata_codec::scalar::{round_to, stringify};
use strata_codec::{line, rle, DataType, Value};
use strata_storage::{FileResources, FsResources, LockMode};

/// Separator between values hashed into a content key.
const KEY_SEPARATOR: char = '~';

/// A query against one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Expected partition date.
    pub date: String,
    /// Expected metric name.
    pub metric: String,
    /// Dimensions to return.
    #[serde(default)]
    pub dimensions: Vec<String>,
    /// Row filter; empty matches every row.
    #[serde(default)]
    pub constraints: ConstraintGroups,
    /// Group rows by content key.
    #[serde(default)]
    pub do_aggregate: bool,
    /// Report `{sum, min, max, cnt}` per group instead of a plain sum.
    #[serde(default)]
    pub do_aggregate_meta: bool,
    /// File to read.
    pub file: PathBuf,
}

/// Result rows of a successful query; index 0 is the content key.
pub type ResultRow = Vec<Value>;

struct Matched {
    stats: MetricStats,
    matched: u64,
    columns: Vec<ResponseColumn>,
    rows: Vec<ResultRow>,
}

/// Runs queries and keeps the outcome of the last one.
#[derive(Debug)]
pub struct Reader<R: FileResources = FsResources> {
    resources: R,
    config: Config,
    host: String,
    metadata: Option<ResponseMetadata>,
    results: Vec<ResultRow>,
}

impl Reader<FsResources> {
    /// Creates a reader on the local filesystem.
    ///
    /// # Errors
    ///
    /// Fails if the configured temp directory is unusable.
    pub fn new(config: Config) -> CoreResult<Self> {
        Ok(Self::with_resources(config.resources()?, config))
    }
}

impl<R: FileResources> Reader<R> {
    /// Creates a reader over custom file resources.
    pub fn with_resources(resources: R, config: Config) -> Self {
        let host = config.resolve_host();
        Self {
            resources,
            config,
            host,
            metadata: None,
            results: Vec::new(),
        }
    }

    /// Returns the file resources.
    pub fn resources(&self) -> &R {
        &self.resources
    }

    /// Metadata of the last run.
    #[must_use]
    pub fn metadata(&self) -> Option<&ResponseMetadata> {
        self.metadata.as_ref()
    }

    /// Result rows of the last run.
    #[must_use]
    pub fn results(&self) -> &[ResultRow] {
        &self.results
    }

    /// Runs `request`.
    ///
    /// # Errors
    ///
    /// Any failure is recorded as an error state in [`Reader::metadata`]
    /// and then returned.
    pub fn run(&mut self, request: &QueryRequest) -> CoreResult<()> {
        self.run_profiled(request, &mut Profile::disabled())
    }

    /// Runs `request`, recording laps into `profile`.
    ///
    /// # Errors
    ///
    /// See [`Reader::run`].
    pub fn run_profiled(&mut self, request: &QueryRequest, profile: &mut Profile) -> CoreResult<()> {
        let stopwatch = Stopwatch::start();
        self.metadata = None;
        self.results.clear();

        match self.execute(request, profile) {
            Ok(Some(matched)) => {
                self.finish_success(request, matched, &stopwatch);
                Ok(())
            }
            Ok(None) => {
                self.metadata = Some(self.terminal(request, ResponseStatus::Empty, &stopwatch));
                tracing::info!(path = %request.file.display(), "query matched no rows");
                Ok(())
            }
            Err(err) => {
                let mut metadata = self.terminal(request, ResponseStatus::Error, &stopwatch);
                metadata.error = Some(err.to_string());
                self.metadata = Some(metadata);
                tracing::warn!(path = %request.file.display(), error = %err, "query failed");
                Err(err)
            }
        }
    }

    /// Parses a JSON query request and runs it.
    ///
    /// # Errors
    ///
    /// A request that does not parse is recorded as an error state with an
    /// empty date and metric. Otherwise see [`Reader::run`].
    pub fn run_from_workload(&mut self, workload: &str) -> CoreResult<()> {
        self.run_from_workload_profiled(workload, &mut Profile::disabled())
    }

    /// [`Reader::run_from_workload`] with laps recorded into `profile`.
    ///
    /// # Errors
    ///
    /// See [`Reader::run_from_workload`].
    pub fn run_from_workload_profiled(&mut self, workload: &str, profile: &mut Profile) -> CoreResult<()> {
        match serde_json::from_str::<QueryRequest>(workload) {
            Ok(request) => {
                profile.lap("parse request");
                self.run_profiled(&request, profile)
            }
            Err(err) => {
                let err = CoreError::validation(format!("invalid query request: {err}"));
                self.results.clear();
                let mut metadata = ResponseMetadata::terminal("", "", ResponseStatus::Error, &self.host, 0);
                metadata.error = Some(err.to_string());
                self.metadata = Some(metadata);
                Err(err)
            }
        }
    }

    /// Renders the last run as a response payload.
    ///
    /// # Errors
    ///
    /// Fails if nothing has run yet or a row cannot be encoded.
    pub fn response_payload(&self) -> CoreResult<String> {
        let metadata = self
            .metadata
            .as_ref()
            .ok_or_else(|| CoreError::validation("no query has run"))?;
        let mut payload = serde_json::to_string(metadata)?;
        payload.push('\n');
        for row in &self.results {
            let fields: Vec<String> = row.iter().map(stringify).collect();
            payload.push_str(&line::encode_line(&fields)?);
        }
        Ok(payload.trim_end_matches('\n').to_string())
    }

    /// Reads only the header of `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing, empty or has an invalid header.
    pub fn file_metadata(&self, path: &Path) -> CoreResult<FileHeader> {
        let mut input = BufReader::new(self.resources.open_for_read(path, LockMode::Shared)?);
        let header = self.read_header(&mut input, path);
        let closed = self.resources.close_input(input.into_inner());
        let (header, _) = header?;
        closed?;
        Ok(header)
    }

    fn terminal(&self, request: &QueryRequest, status: ResponseStatus, stopwatch: &Stopwatch) -> ResponseMetadata {
        ResponseMetadata::terminal(
            &request.date,
            &request.metric,
            status,
            &self.host,
            stopwatch.elapsed_ms(),
        )
    }

    fn finish_success(&mut self, request: &QueryRequest, matched: Matched, stopwatch: &Stopwatch) {
        let row_count = matched.rows.len() as u64;
        let mut metadata = self.terminal(request, ResponseStatus::Success, stopwatch);
        metadata.min = Some(matched.stats.min);
        metadata.max = Some(matched.stats.max);
        metadata.sum = Some(matched.stats.sum);
        metadata.matched_row_count = Some(matched.matched);
        metadata.column_meta = Some(matched.columns);
        metadata.is_aggregated = Some(request.do_aggregate);
        metadata.aggregate_includes_meta = Some(request.do_aggregate && request.do_aggregate_meta);
        metadata.result_row_count = Some(row_count);
        tracing::info!(
            path = %request.file.display(),
            matched = matched.matched,
            rows = row_count,
            ms = metadata.ms_elapsed,
            "query succeeded"
        );
        self.metadata = Some(metadata);
        self.results = matched.rows;
    }

    fn execute(&self, request: &QueryRequest, profile: &mut Profile) -> CoreResult<Option<Matched>> {
        validate_date(&request.date)?;
        validate_name(&request.metric)?;
        for dimension in &request.dimensions {
            validate_name(dimension)?;
        }

        let mut input = BufReader::new(
            self.resources
                .open_for_read(&request.file, LockMode::Shared)?,
        );
        profile.lap("open");
        let loaded = self.load_columns(&mut input, request, profile);
        let closed = self.resources.close_input(input.into_inner());
        let loaded = loaded?;
        closed?;
        let Some((definitions, rows)) = loaded else {
            return Ok(None);
        };
        if rows.is_empty() {
            return Ok(None);
        }

        let constraints = CompiledConstraints::compile(&request.constraints, &definitions)?;
        let rows: Vec<Vec<Value>> = rows.into_iter().filter(|row| constraints.matches(row)).collect();
        profile.lap("filter");
        if rows.is_empty() {
            return Ok(None);
        }

        let matched = self.project(request, &definitions, rows)?;
        profile.lap("aggregate");
        Ok(Some(matched))
    }

    /// Reads the header and the required columns as rows.
    ///
    /// Returns `None` for a no-data file.
    fn load_columns(
        &self,
        input: &mut BufReader<R::Input>,
        request: &QueryRequest,
        profile: &mut Profile,
    ) -> CoreResult<Option<(Vec<ColumnDefinition>, Vec<Vec<Value>>)>> {
        let (header, header_len) = self.read_header(input, &request.file)?;
        header.validate_for_read(&request.date, &request.metric)?;
        profile.lap("header");
        if header.status == FileStatus::NoData {
            return Ok(None);
        }

        let required = required_columns(&header, request)?;
        let mut columns: Vec<Vec<Value>> = Vec::with_capacity(required.len());
        for meta in &required {
            let position = header_len + meta.offset;
            input.seek(SeekFrom::Start(position))?;
            let raw = line::read_line(input)?.ok_or_else(|| {
                CoreError::integrity(
                    "read",
                    format!(
                        "column {:?} is missing at offset {}",
                        meta.definition.name(),
                        meta.offset
                    ),
                )
            })?;
            let values = rle::decompress(raw)?;
            tracing::debug!(column = meta.definition.name(), offset = meta.offset, values = values.len(), "column read");
            columns.push(values.iter().map(|v| meta.definition.decode(v)).collect());
        }
        profile.lap("columns");

        let row_count = columns.first().map_or(0, Vec::len);
        if let Some((meta, column)) = required
            .iter()
            .zip(&columns)
            .find(|(_, c)| c.len() != row_count)
        {
            return Err(CoreError::integrity(
                "read",
                format!(
                    "column {:?} has {} values, expected {row_count}",
                    meta.definition.name(),
                    column.len()
                ),
            ));
        }
        if let Some(count) = header.count {
            if count != row_count as u64 {
                return Err(CoreError::integrity(
                    "read",
                    format!("header counts {count} rows but columns hold {row_count}"),
                ));
            }
        }

        let definitions = required.into_iter().map(|meta| meta.definition).collect();
        Ok(Some((definitions, transpose(columns, row_count))))
    }

    fn read_header(&self, input: &mut BufReader<R::Input>, path: &Path) -> CoreResult<(FileHeader, u64)> {
        if let Some(header) = FileHeader::read_from(input)? {
            return Ok(header);
        }
        tracing::warn!(
            path = %path.display(),
            delay_ms = u64::try_from(self.config.empty_file_retry_delay.as_millis()).unwrap_or(u64::MAX),
            "file looks empty, retrying once"
        );
        std::thread::sleep(self.config.empty_file_retry_delay);
        input.seek(SeekFrom::Start(0))?;
        FileHeader::read_from(input)?.ok_or_else(|| CoreError::EmptyOrInvalidFile {
            path: path.to_path_buf(),
        })
    }

    /// Narrows rows to the selected columns, keys them and aggregates.
    fn project(
        &self,
        request: &QueryRequest,
        definitions: &[ColumnDefinition],
        rows: Vec<Vec<Value>>,
    ) -> CoreResult<Matched> {
        let selected: BTreeSet<&str> = request
            .dimensions
            .iter()
            .map(String::as_str)
            .chain([request.metric.as_str()])
            .collect();
        let positions: Vec<usize> = definitions
            .iter()
            .enumerate()
            .filter(|(_, d)| selected.contains(d.name()))
            .map(|(i, _)| i)
            .collect();
        let metric_position = definitions
            .iter()
            .position(|d| d.name() == request.metric)
            .ok_or_else(|| CoreError::schema_mismatch(format!("metric {:?} was not read", request.metric)))?;
        let metric = &definitions[metric_position];
        // index of the metric within a result row, after the key
        let metric_slot = 1 + positions
            .iter()
            .position(|&p| p == metric_position)
            .ok_or_else(|| CoreError::integrity("read", "metric is not among the selected columns"))?;

        let stats = MetricStats::from_values(metric.data_type(), rows.iter().map(|row| &row[metric_position]))?
            .ok_or_else(|| CoreError::integrity("read", "no metric statistics for matched rows"))?;
        let matched = rows.len() as u64;

        let keyed: Vec<ResultRow> = rows
            .into_iter()
            .map(|mut row| {
                let key = content_key(
                    positions
                        .iter()
                        .filter(|&&p| p != metric_position)
                        .map(|&p| stringify(&row[p])),
                );
                let mut out = Vec::with_capacity(positions.len() + 1);
                out.push(Value::Text(key));
                out.extend(positions.iter().map(|&p| std::mem::replace(&mut row[p], Value::Null)));
                out
            })
            .collect();

        let rows = if request.do_aggregate {
            aggregate(keyed, metric, metric_slot, request.do_aggregate_meta)?
        } else {
            keyed
        };

        let mut columns = Vec::with_capacity(positions.len() + 1);
        columns.push(ResponseColumn {
            definition: ColumnDefinition::new(AxisType::Dimension, KEY_COLUMN, DataType::String, None, Value::from(""))?,
            index: 0,
        });
        columns.extend(positions.iter().enumerate().map(|(i, &p)| ResponseColumn {
            definition: definitions[p].clone(),
            index: i + 1,
        }));

        Ok(Matched {
            stats,
            matched,
            columns,
            rows,
        })
    }
}

/// Hex of the first 16 bytes of SHA-256 over the `~`-joined values.
#[must_use]
pub fn content_key(values: impl IntoIterator<Item = String>) -> String {
    let mut joined = String::new();
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            joined.push(KEY_SEPARATOR);
        }
        joined.push_str(&value);
    }
    let digest = Sha256::digest(joined.as_bytes());
    let mut key = String::with_capacity(32);
    for byte in &digest[..16] {
        let _ = write!(key, "{byte:02x}");
    }
    key
}

/// Metric, requested dimensions and constraint columns, in canonical order.
fn required_columns(header: &FileHeader, request: &QueryRequest) -> CoreResult<Vec<ColumnMeta>> {
    let columns = header.columns()?;
    let mut names: BTreeSet<&str> = BTreeSet::new();
    for name in request.dimensions.iter().map(String::as_str).chain([request.metric.as_str()]) {
        if !columns.contains_key(name) {
            return Err(CoreError::schema_mismatch(format!(
                "requested column {name:?} is not in the file"
            )));
        }
        names.insert(name);
    }
    for name in request.constraints.referenced_columns() {
        if !columns.contains_key(name) {
            return Err(CoreError::UnknownColumn {
                name: name.to_string(),
            });
        }
        names.insert(name);
    }
    Ok(names.into_iter().map(|name| columns[name].clone()).collect())
}

fn transpose(columns: Vec<Vec<Value>>, row_count: usize) -> Vec<Vec<Value>> {
    let mut rows: Vec<Vec<Value>> = (0..row_count).map(|_| Vec::with_capacity(columns.len())).collect();
    for column in columns {
        for (row, value) in rows.iter_mut().zip(column) {
            row.push(value);
        }
    }
    rows
}

/// Groups keyed rows, keeping first-seen order.
fn aggregate(
    rows: Vec<ResultRow>,
    metric: &ColumnDefinition,
    metric_slot: usize,
    with_meta: bool,
) -> CoreResult<Vec<ResultRow>> {
    let mut groups: Vec<(ResultRow, MetricStats)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for row in rows {
        let value = Number::from_value(&row[metric_slot])?.for_type(metric.data_type());
        let single = MetricStats {
            min: value,
            max: value,
            sum: value,
            count: 1,
        };
        let key = stringify(&row[0]);
        match positions.get(&key) {
            Some(&i) => {
                let merged = groups[i].1.merge(&single)?;
                groups[i].1 = merged;
            }
            None => {
                positions.insert(key, groups.len());
                groups.push((row, single));
            }
        }
    }

    let round = |n: Number| match (n, metric.precision()) {
        (Number::Float(f), Some(p)) => Number::Float(round_to(f, p)),
        (n, _) => n,
    };
    Ok(groups
        .into_iter()
        .map(|(mut row, stats)| {
            row[metric_slot] = if with_meta {
                Value::Json(serde_json::json!({
                    "sum": round(stats.sum),
                    "min": stats.min,
                    "max": stats.max,
                    "cnt": stats.count,
                }))
            } else {
                Value::from(round(stats.sum))
            };
            row
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{Comparator, Constraint};
    use crate::response::Response;
    use crate::writer::{WriteOptions, WriteRequest, Writer};
    use serde_json::json;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    const DATE: &str = "2024-03-01";

    fn config(dir: &Path) -> Config {
        Config::new()
            .tmp_dir(dir)
            .host_id("test-host")
            .empty_file_retry_delay(Duration::from_millis(1))
    }

    fn write(dir: &TempDir, name: &str, rows: Vec<(i64, &str, &str)>) -> PathBuf {
        let path = dir.path().join(name);
        let request = WriteRequest {
            date: DATE.to_string(),
            metric: ColumnDefinition::metric("m", DataType::Int, 0).unwrap(),
            dimensions: vec![
                ColumnDefinition::dimension("d", DataType::String, "").unwrap(),
                ColumnDefinition::dimension("e", DataType::String, "").unwrap(),
            ],
            headers: vec!["m".into(), "d".into(), "e".into()],
            rows: rows
                .into_iter()
                .map(|(m, d, e)| vec![Value::Int(m), Value::from(d), Value::from(e)])
                .collect(),
        };
        Writer::new(config(dir.path()))
            .unwrap()
            .write(request, &path, WriteOptions::default())
            .unwrap();
        path
    }

    fn query(file: &Path, dimensions: &[&str]) -> QueryRequest {
        QueryRequest {
            date: DATE.to_string(),
            metric: "m".to_string(),
            dimensions: dimensions.iter().map(ToString::to_string).collect(),
            constraints: ConstraintGroups::default(),
            do_aggregate: false,
            do_aggregate_meta: false,
            file: file.to_path_buf(),
        }
    }

    fn reader(dir: &TempDir) -> Reader {
        Reader::new(config(dir.path())).unwrap()
    }

    fn sample(dir: &TempDir) -> PathBuf {
        write(dir, "sample.strata", vec![(3, "x", "p"), (5, "x", "q"), (2, "y", "p")])
    }

    #[test]
    fn aggregates_by_selected_dimensions() {
        let dir = tempdir().unwrap();
        let file = sample(&dir);
        let mut reader = reader(&dir);
        let mut request = query(&file, &["d"]);
        request.do_aggregate = true;
        reader.run(&request).unwrap();

        let metadata = reader.metadata().unwrap();
        assert_eq!(metadata.status, ResponseStatus::Success);
        assert_eq!(metadata.sum, Some(Number::Int(10)));
        assert_eq!(metadata.matched_row_count, Some(3));
        assert_eq!(metadata.result_row_count, Some(2));
        assert_eq!(metadata.host, "test-host");

        let results = reader.results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0][1..], [Value::from("x"), Value::Int(8)]);
        assert_eq!(results[1][1..], [Value::from("y"), Value::Int(2)]);
        assert_eq!(results[0][0], Value::Text(content_key(["x".to_string()])));
    }

    #[test]
    fn aggregate_meta_reports_group_statistics() {
        let dir = tempdir().unwrap();
        let file = sample(&dir);
        let mut reader = reader(&dir);
        let mut request = query(&file, &["d"]);
        request.do_aggregate = true;
        request.do_aggregate_meta = true;
        reader.run(&request).unwrap();

        assert_eq!(reader.metadata().unwrap().aggregate_includes_meta, Some(true));
        assert_eq!(
            reader.results()[0][2],
            Value::Json(json!({"sum": 8, "min": 3, "max": 5, "cnt": 2}))
        );
    }

    #[test]
    fn unaggregated_rows_share_keys_per_dimension_value() {
        let dir = tempdir().unwrap();
        let file = sample(&dir);
        let mut reader = reader(&dir);
        reader.run(&query(&file, &["d"])).unwrap();

        let results = reader.results();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0][0], results[1][0]);
        assert_ne!(results[0][0], results[2][0]);
        assert_eq!(reader.metadata().unwrap().is_aggregated, Some(false));
    }

    #[test]
    fn constraints_filter_rows() {
        let dir = tempdir().unwrap();
        let file = write(&dir, "f.strata", vec![(2, "a", ""), (3, "b", ""), (4, "c", ""), (5, "d", "")]);
        let mut reader = reader(&dir);
        let mut request = query(&file, &["d"]);
        request.constraints = ConstraintGroups::new(vec![vec![
            Constraint::new("m", Comparator::Gt, 3).unwrap(),
        ]]);
        reader.run(&request).unwrap();

        let metrics: Vec<&Value> = reader.results().iter().map(|row| &row[2]).collect();
        assert_eq!(metrics, [&Value::Int(4), &Value::Int(5)]);
    }

    #[test]
    fn constraint_columns_are_read_but_not_returned() {
        let dir = tempdir().unwrap();
        let file = sample(&dir);
        let mut reader = reader(&dir);
        let mut request = query(&file, &["d"]);
        request.constraints = ConstraintGroups::new(vec![vec![
            Constraint::new("e", Comparator::Eq, "P").unwrap(),
        ]]);
        reader.run(&request).unwrap();

        let metadata = reader.metadata().unwrap();
        let names: Vec<&str> = metadata
            .column_meta
            .as_ref()
            .unwrap()
            .iter()
            .map(|c| c.definition.name())
            .collect();
        assert_eq!(names, ["md5", "d", "m"]);
        assert_eq!(metadata.matched_row_count, Some(2));
        assert_eq!(metadata.sum, Some(Number::Int(5)));
    }

    #[test]
    fn no_match_is_empty() {
        let dir = tempdir().unwrap();
        let file = sample(&dir);
        let mut reader = reader(&dir);
        let mut request = query(&file, &["d"]);
        request.constraints = ConstraintGroups::new(vec![vec![
            Constraint::new("d", Comparator::Eq, "zzz").unwrap(),
        ]]);
        reader.run(&request).unwrap();
        assert_eq!(reader.metadata().unwrap().status, ResponseStatus::Empty);
        assert!(reader.results().is_empty());
    }

    #[test]
    fn no_data_file_is_empty() {
        let dir = tempdir().unwrap();
        let file = write(&dir, "empty.strata", vec![]);
        let mut reader = reader(&dir);
        reader.run(&query(&file, &["d", "e"])).unwrap();

        assert_eq!(reader.metadata().unwrap().status, ResponseStatus::Empty);
        let payload = reader.response_payload().unwrap();
        assert_eq!(payload.lines().count(), 1);
    }

    #[test]
    fn failures_are_recorded_before_returning() {
        let dir = tempdir().unwrap();
        let file = sample(&dir);
        let mut reader = reader(&dir);

        let mut wrong_date = query(&file, &["d"]);
        wrong_date.date = "2024-03-02".into();
        assert!(reader.run(&wrong_date).is_err());
        let metadata = reader.metadata().unwrap();
        assert_eq!(metadata.status, ResponseStatus::Error);
        assert!(metadata.error.as_deref().unwrap().contains("2024-03-02"));

        let missing = query(&dir.path().join("missing.strata"), &["d"]);
        assert!(reader.run(&missing).is_err());
        assert_eq!(reader.metadata().unwrap().status, ResponseStatus::Error);

        let mut unknown = query(&file, &["d"]);
        unknown.constraints = ConstraintGroups::new(vec![vec![
            Constraint::new("nope", Comparator::Eq, "x").unwrap(),
        ]]);
        assert!(matches!(reader.run(&unknown), Err(CoreError::UnknownColumn { .. })));

        assert!(reader.run(&query(&file, &["nope"])).is_err());
    }

    #[test]
    fn empty_file_fails_after_retry() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("blank.strata");
        std::fs::write(&file, "").unwrap();
        let mut reader = reader(&dir);
        assert!(matches!(
            reader.run(&query(&file, &["d"])),
            Err(CoreError::EmptyOrInvalidFile { .. })
        ));
    }

    #[test]
    fn unparsable_workload_is_an_error_state() {
        let dir = tempdir().unwrap();
        let mut reader = reader(&dir);
        assert!(reader.run_from_workload("{\"date\":").is_err());
        let metadata = reader.metadata().unwrap();
        assert_eq!(metadata.status, ResponseStatus::Error);
        assert_eq!(metadata.date, "");

        let payload = reader.response_payload().unwrap();
        assert!(matches!(
            Response::parse(&payload, true),
            Err(CoreError::ReaderFailed { .. })
        ));
    }

    #[test]
    fn workload_runs_and_payload_round_trips() {
        let dir = tempdir().unwrap();
        let file = sample(&dir);
        let workload = json!({
            "date": DATE,
            "metric": "m",
            "dimensions": ["d", "e"],
            "constraints": {"0": {"0": {"name": "d", "comparator": "=", "value": "x"}}},
            "do_aggregate": true,
            "do_aggregate_meta": false,
            "file": file,
        })
        .to_string();
        let mut reader = reader(&dir);
        let mut profile = Profile::new();
        reader.run_from_workload_profiled(&workload, &mut profile).unwrap();
        assert!(!profile.laps().is_empty());

        let response = Response::parse(&reader.response_payload().unwrap(), true).unwrap();
        assert_eq!(response.rows().len(), 2);
        let key = content_key(["x".to_string(), "p".to_string()]);
        let row = response.find(&key).unwrap();
        assert_eq!(row.values, [Value::from("x"), Value::from("p"), Value::Int(3)]);
    }

    #[test]
    fn trailing_unicode_whitespace_survives_payload() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("spaces.strata");
        let request = WriteRequest {
            date: DATE.to_string(),
            metric: ColumnDefinition::metric("m", DataType::Int, 0).unwrap(),
            dimensions: vec![ColumnDefinition::dimension("z", DataType::String, "").unwrap()],
            headers: vec!["m".into(), "z".into()],
            rows: vec![
                vec![Value::Int(2), Value::from("\u{a0}\u{b}")],
                vec![Value::Int(1), Value::from("abc\u{2003}")],
            ],
        };
        Writer::new(config(dir.path()))
            .unwrap()
            .write(request, &file, WriteOptions::default())
            .unwrap();
        let mut reader = reader(&dir);
        reader.run(&query(&file, &["z"])).unwrap();

        // `z` sorts after `m`, so the last row ends with the whitespace
        let response = Response::parse(&reader.response_payload().unwrap(), true).unwrap();
        let values: Vec<&Value> = response.rows().iter().map(|row| &row.values[1]).collect();
        assert_eq!(values, [&Value::from("\u{a0}\u{b}"), &Value::from("abc\u{2003}")]);
    }

    #[test]
    fn header_only_read() {
        let dir = tempdir().unwrap();
        let file = sample(&dir);
        let header = reader(&dir).file_metadata(&file).unwrap();
        assert_eq!(header.count, Some(3));
        assert_eq!(header.columns().unwrap().len(), 3);
    }

    #[test]
    fn content_keys_are_stable_hex() {
        let key = content_key(["x".to_string()]);
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(content_key(["a~b".to_string()]), content_key(["a".to_string(), "c".to_string()]));
        assert_eq!(content_key(["a".to_string(), "b".to_string()]), content_key(["a~b".to_string()]));
    }
}
