//! Test fixtures and scratch directory helpers.

use std::path::{Path, PathBuf};
use std::time::Duration;
use strata_core::{
    ColumnDefinition, Combiner, Config, QueryRequest, Reader, WriteOptions, WriteRequest, Writer,
    FILE_EXTENSION,
};
use strata_storage::FsResources;
use tempfile::TempDir;

/// Date of every sample partition.
pub const SAMPLE_DATE: &str = "2024-03-01";

/// A scratch directory with separate data and staging areas.
///
/// Both are deleted when the fixture is dropped.
pub struct TestDir {
    _temp_dir: TempDir,
    data: PathBuf,
    tmp: PathBuf,
}

impl TestDir {
    /// Creates a fresh scratch directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let data = temp_dir.path().join("data");
        let tmp = temp_dir.path().join("tmp");
        std::fs::create_dir(&data).expect("Failed to create data dir");
        std::fs::create_dir(&tmp).expect("Failed to create staging dir");
        Self {
            _temp_dir: temp_dir,
            data,
            tmp,
        }
    }

    /// Directory for data files.
    pub fn data_dir(&self) -> &Path {
        &self.data
    }

    /// Directory for staging files.
    pub fn tmp_dir(&self) -> &Path {
        &self.tmp
    }

    /// Path of the data file called `name`.
    pub fn path(&self, name: &str) -> PathBuf {
        self.data.join(format!("{name}.{FILE_EXTENSION}"))
    }

    /// Engine configuration staging into this directory.
    pub fn config(&self) -> Config {
        Config::new()
            .tmp_dir(&self.tmp)
            .host_id("testkit")
            .empty_file_retry_delay(Duration::from_millis(1))
    }

    /// Filesystem resources staging into this directory.
    pub fn resources(&self) -> FsResources {
        FsResources::with_tmp_dir(&self.tmp).expect("Failed to open staging dir")
    }

    /// A writer staging into this directory.
    pub fn writer(&self) -> Writer {
        Writer::new(self.config()).expect("Failed to create writer")
    }

    /// A reader staging into this directory.
    pub fn reader(&self) -> Reader {
        Reader::new(self.config()).expect("Failed to create reader")
    }

    /// A combiner staging into this directory.
    pub fn combiner(&self) -> Combiner {
        Combiner::new(self.config()).expect("Failed to create combiner")
    }

    /// Writes `request` to the data file `name` with default options.
    pub fn write(&self, name: &str, request: WriteRequest) -> PathBuf {
        let path = self.path(name);
        self.writer()
            .write(request, &path, WriteOptions::default())
            .expect("Failed to write file");
        path
    }

    /// Writes the sample dataset to the data file `name`.
    pub fn write_sample(&self, name: &str) -> PathBuf {
        self.write(name, samples::request())
    }

    /// A query for the sample metric over `file`.
    pub fn query(&self, file: &Path, dimensions: &[&str]) -> QueryRequest {
        QueryRequest {
            date: SAMPLE_DATE.into(),
            metric: samples::METRIC.into(),
            dimensions: dimensions.iter().map(|d| (*d).to_string()).collect(),
            constraints: Default::default(),
            do_aggregate: false,
            do_aggregate_meta: false,
            file: file.to_path_buf(),
        }
    }

    /// Files left behind in the staging directory.
    pub fn leftover_temp_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(&self.tmp)
            .expect("Failed to list staging dir")
            .map(|entry| entry.expect("Failed to read dir entry").path())
            .collect()
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test with a fresh scratch directory.
pub fn with_test_dir<F, R>(f: F) -> R
where
    F: FnOnce(&TestDir) -> R,
{
    let dir = TestDir::new();
    f(&dir)
}

/// A small dataset with one column of every data type.
pub mod samples {
    use super::SAMPLE_DATE;
    use strata_core::{ColumnDefinition, DataType, Value, WriteRequest};

    /// Name of the sample metric.
    pub const METRIC: &str = "visits";

    /// Sum of the sample metric over [`rows`].
    pub const METRIC_SUM: i64 = 18;

    /// The sample metric column.
    pub fn metric() -> ColumnDefinition {
        ColumnDefinition::metric(METRIC, DataType::Int, 0).expect("Invalid sample metric")
    }

    /// The sample dimension columns.
    pub fn dimensions() -> Vec<ColumnDefinition> {
        vec![
            ColumnDefinition::dimension("country", DataType::String, "")
                .expect("Invalid sample dimension"),
            ColumnDefinition::dimension("device", DataType::String, "unknown")
                .expect("Invalid sample dimension"),
            ColumnDefinition::dimension("is_bot", DataType::Bool, false)
                .expect("Invalid sample dimension"),
            ColumnDefinition::dimension("revenue", DataType::Float, 0.0)
                .and_then(|d| d.with_precision(2))
                .expect("Invalid sample dimension"),
            ColumnDefinition::dimension("seen_at", DataType::Datetime, "")
                .expect("Invalid sample dimension"),
        ]
    }

    /// Row headers in the order of [`rows`].
    pub fn headers() -> Vec<String> {
        ["visits", "country", "device", "is_bot", "revenue", "seen_at"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Five rows; the fourth has a null device.
    pub fn rows() -> Vec<Vec<Value>> {
        vec![
            row(3, "us", "mobile".into(), false, 1.25, "2024-03-01 10:00:00"),
            row(5, "de", "desktop".into(), false, 0.5, "2024-03-01 11:30:00"),
            row(2, "us", "desktop".into(), true, 0.0, "2024-03-01 12:00:00"),
            row(7, "fr", Value::Null, false, 2.75, "2024-03-01 18:45:00"),
            row(1, "us", "mobile".into(), false, 1.25, "2024-03-01 23:59:59"),
        ]
    }

    /// A write request for the sample rows.
    pub fn request() -> WriteRequest {
        request_with_rows(rows())
    }

    /// A write request for `rows` under the sample schema.
    pub fn request_with_rows(rows: Vec<Vec<Value>>) -> WriteRequest {
        WriteRequest {
            date: SAMPLE_DATE.into(),
            metric: metric(),
            dimensions: dimensions(),
            headers: headers(),
            rows,
        }
    }

    fn row(
        visits: i64,
        country: &str,
        device: Value,
        is_bot: bool,
        revenue: f64,
        seen_at: &str,
    ) -> Vec<Value> {
        vec![
            Value::Int(visits),
            country.into(),
            device,
            Value::Bool(is_bot),
            Value::Float(revenue),
            seen_at.into(),
        ]
    }
}

/// Builds a string dimension with an empty default.
pub fn string_dimension(name: &str) -> ColumnDefinition {
    ColumnDefinition::dimension(name, strata_core::DataType::String, "")
        .expect("Invalid dimension name")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_layout() {
        let dir = TestDir::new();
        assert!(dir.data_dir().is_dir());
        assert!(dir.tmp_dir().is_dir());
        assert!(dir.path("x").ends_with("x.strata"));
        assert!(dir.leftover_temp_files().is_empty());
    }

    #[test]
    fn test_write_sample() {
        with_test_dir(|dir| {
            let file = dir.write_sample("visits");
            assert!(file.exists());
            assert!(dir.leftover_temp_files().is_empty());
        });
    }

    #[test]
    fn test_sample_sum_matches_rows() {
        let sum: i64 = samples::rows().iter().map(|r| r[0].to_int()).sum();
        assert_eq!(sum, samples::METRIC_SUM);
    }
}
