//! Write command implementation.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use strata_core::{
    separate_headers_and_rows, ColumnDefinition, Config, Value, WriteOptions, WriteRequest, Writer,
};
use tracing::info;

/// Input document of the write command.
#[derive(Debug, Deserialize)]
pub struct WriteDocument {
    /// Partition date.
    pub date: String,
    /// Metric definition.
    pub metric: ColumnDefinition,
    /// Dimension definitions.
    #[serde(default)]
    pub dimensions: Vec<ColumnDefinition>,
    /// One object per row, keyed by column name.
    pub rows: Vec<BTreeMap<String, Value>>,
    /// Run-length compress eligible columns.
    #[serde(default = "default_rle")]
    pub rle: bool,
    /// Reorder rows by column cardinality first.
    #[serde(default)]
    pub cardinality_sort: bool,
}

fn default_rle() -> bool {
    true
}

impl WriteDocument {
    /// Converts the document into a write request and its options.
    pub fn into_request(self) -> Result<(WriteRequest, WriteOptions), Box<dyn std::error::Error>> {
        let records = self
            .rows
            .into_iter()
            .map(|row| row.into_iter().collect())
            .collect();
        let (mut headers, rows) = separate_headers_and_rows(records)?;
        if rows.is_empty() {
            headers = std::iter::once(&self.metric)
                .chain(&self.dimensions)
                .map(|c| c.name().to_string())
                .collect();
        }
        let request = WriteRequest {
            date: self.date,
            metric: self.metric,
            dimensions: self.dimensions,
            headers,
            rows,
        };
        let options = WriteOptions {
            rle: self.rle,
            cardinality_sort: self.cardinality_sort,
            ..WriteOptions::default()
        };
        Ok((request, options))
    }
}

/// Runs the write command.
pub fn run(input: &Path, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    info!("Writing {:?} from {:?}", output, input);

    let document: WriteDocument = serde_json::from_str(&std::fs::read_to_string(input)?)?;
    let (request, options) = document.into_request()?;
    let summary = Writer::new(Config::default())?.write(request, output, options)?;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(rows: serde_json::Value) -> WriteDocument {
        serde_json::from_value(json!({
            "date": "2024-03-01",
            "metric": {"axis_type": "metric", "name": "m", "data_type": "int", "empty_value": 0},
            "dimensions": [
                {"axis_type": "dimension", "name": "d", "data_type": "string", "empty_value": ""}
            ],
            "rows": rows,
        }))
        .unwrap()
    }

    #[test]
    fn test_rows_become_headers_and_values() {
        let (request, options) = document(json!([{"m": 3, "d": "x"}, {"d": "y", "m": 2}]))
            .into_request()
            .unwrap();
        assert_eq!(request.headers, ["d", "m"]);
        assert_eq!(request.rows[1], [Value::from("y"), Value::Int(2)]);
        assert!(options.rle);
        assert!(!options.cardinality_sort);
    }

    #[test]
    fn test_rows_must_share_columns() {
        let result = document(json!([{"m": 3, "d": "x"}, {"m": 2}])).into_request();
        assert!(result.is_err());
    }

    #[test]
    fn test_no_rows_uses_schema_headers() {
        let (request, _) = document(json!([])).into_request().unwrap();
        assert_eq!(request.headers, ["m", "d"]);
        assert!(request.rows.is_empty());
    }

    #[test]
    fn test_run_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.json");
        let output = dir.path().join("out.strata");
        std::fs::write(
            &input,
            json!({
                "date": "2024-03-01",
                "metric": {"axis_type": "metric", "name": "m", "data_type": "int", "empty_value": 0},
                "dimensions": [
                    {"axis_type": "dimension", "name": "d", "data_type": "string", "empty_value": ""}
                ],
                "rows": [{"m": 1, "d": "x"}, {"m": 2, "d": "y"}],
                "rle": false,
            })
            .to_string(),
        )
        .unwrap();
        run(&input, &output).unwrap();
        let header = strata_core::Reader::new(Config::default())
            .unwrap()
            .file_metadata(&output)
            .unwrap();
        assert_eq!(header.count, Some(2));
    }
}
