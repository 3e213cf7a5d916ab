//! Query response payloads.
//!
//! A payload is a JSON metadata line followed by one safe-line encoded row
//! per result. [`Response::parse`] turns a payload back into typed rows.

use crate::error::{CoreError, CoreResult};
use crate::header::Number;
use crate::schema::{AxisType, ColumnDefinition};
use serde::{Deserialize, Serialize};
use strata_codec::line::decode_str;
use strata_codec::Value;

/// Name of the synthetic content-hash column in responses.
pub const KEY_COLUMN: &str = "md5";

/// Terminal state of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// Rows matched.
    Success,
    /// The file or the filtered row set was empty.
    Empty,
    /// The query failed; see [`ResponseMetadata::error`].
    Error,
}

/// A column of the response, with its position in each row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseColumn {
    /// The column's definition.
    #[serde(flatten)]
    pub definition: ColumnDefinition,
    /// Position in a response row; the key column is 0.
    pub index: usize,
}

/// The metadata line of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Requested date.
    pub date: String,
    /// Requested metric.
    pub metric: String,
    /// Terminal state.
    pub status: ResponseStatus,
    /// Failure message of an error response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Smallest matched metric value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Number>,
    /// Largest matched metric value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Number>,
    /// Sum of matched metric values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<Number>,
    /// Rows that passed the constraints, before aggregation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_row_count: Option<u64>,
    /// Columns of each result row, key column first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_meta: Option<Vec<ResponseColumn>>,
    /// Whether rows were grouped by key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_aggregated: Option<bool>,
    /// Whether metric cells are `{sum, min, max, cnt}` objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_includes_meta: Option<bool>,
    /// Host that ran the query.
    #[serde(default)]
    pub host: String,
    /// Number of result rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_row_count: Option<u64>,
    /// Wall time of the query.
    #[serde(default)]
    pub ms_elapsed: u64,
}

impl ResponseMetadata {
    /// Metadata with only the fields common to every terminal state.
    #[must_use]
    pub fn terminal(date: &str, metric: &str, status: ResponseStatus, host: &str, ms_elapsed: u64) -> Self {
        Self {
            date: date.to_string(),
            metric: metric.to_string(),
            status,
            error: None,
            min: None,
            max: None,
            sum: None,
            matched_row_count: None,
            column_meta: None,
            is_aggregated: None,
            aggregate_includes_meta: None,
            host: host.to_string(),
            result_row_count: None,
            ms_elapsed,
        }
    }
}

/// One decoded result row.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRow {
    /// Content-hash key.
    pub key: String,
    /// Values in `column_meta` order, without the key.
    pub values: Vec<Value>,
}

/// A decoded response payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    metadata: ResponseMetadata,
    rows: Vec<ResponseRow>,
}

impl Response {
    /// Parses a response payload.
    ///
    /// An error payload fails with [`CoreError::ReaderFailed`] when
    /// `throw_on_error` is set, and parses to a row-less response otherwise.
    ///
    /// # Errors
    ///
    /// Fails on an empty payload, an invalid status, missing or invalid
    /// success fields, or rows that do not fit `column_meta`.
    pub fn parse(payload: &str, throw_on_error: bool) -> CoreResult<Self> {
        let payload = payload.trim_end_matches('\n');
        if payload.trim().is_empty() {
            return Err(CoreError::validation("empty response payload"));
        }
        let mut lines = payload.lines();
        let first = lines.next().unwrap_or_default();
        let json: serde_json::Value = serde_json::from_str(first)
            .map_err(|err| CoreError::validation(format!("invalid response metadata: {err}")))?;

        match json.get("status").and_then(serde_json::Value::as_str) {
            Some("success" | "empty" | "error") => {}
            other => {
                return Err(CoreError::validation(format!(
                    "invalid response status {other:?}"
                )))
            }
        }
        for field in ["date", "metric"] {
            if !json.get(field).is_some_and(serde_json::Value::is_string) {
                return Err(CoreError::validation(format!(
                    "response metadata is missing a valid {field:?}"
                )));
            }
        }
        let metadata: ResponseMetadata = serde_json::from_value(json)
            .map_err(|err| CoreError::validation(format!("invalid response metadata: {err}")))?;

        match metadata.status {
            ResponseStatus::Error if throw_on_error => Err(CoreError::ReaderFailed {
                message: metadata
                    .error
                    .clone()
                    .unwrap_or_else(|| "no error message".to_string()),
            }),
            ResponseStatus::Error | ResponseStatus::Empty => Ok(Self {
                metadata,
                rows: Vec::new(),
            }),
            ResponseStatus::Success => {
                let rows = decode_rows(&metadata, lines)?;
                Ok(Self { metadata, rows })
            }
        }
    }

    /// The metadata line.
    #[must_use]
    pub fn metadata(&self) -> &ResponseMetadata {
        &self.metadata
    }

    /// Decoded rows.
    #[must_use]
    pub fn rows(&self) -> &[ResponseRow] {
        &self.rows
    }

    /// The first row with content-hash `key`.
    #[must_use]
    pub fn find(&self, key: &str) -> Option<&ResponseRow> {
        self.rows.iter().find(|row| row.key == key)
    }
}

fn decode_rows<'a>(
    metadata: &ResponseMetadata,
    lines: impl Iterator<Item = &'a str>,
) -> CoreResult<Vec<ResponseRow>> {
    let missing = |field: &str| CoreError::validation(format!("success response is missing {field:?}"));
    let columns = metadata.column_meta.as_ref().ok_or_else(|| missing("column_meta"))?;
    metadata.is_aggregated.ok_or_else(|| missing("is_aggregated"))?;
    let with_meta = metadata
        .aggregate_includes_meta
        .ok_or_else(|| missing("aggregate_includes_meta"))?;
    if columns.first().map(|c| c.definition.name()) != Some(KEY_COLUMN) {
        return Err(CoreError::validation(format!(
            "response column_meta must start with {KEY_COLUMN:?}"
        )));
    }
    if let Some((position, column)) = columns.iter().enumerate().find(|(i, c)| c.index != *i) {
        return Err(CoreError::validation(format!(
            "response column {:?} has index {}, expected {position}",
            column.definition.name(),
            column.index
        )));
    }

    let rows = lines
        .enumerate()
        .map(|(number, line)| {
            let fields = decode_str(line);
            if fields.len() != columns.len() {
                return Err(CoreError::validation(format!(
                    "response row {number} has {} fields, expected {}",
                    fields.len(),
                    columns.len()
                )));
            }
            let mut fields = fields.into_iter();
            let key = fields.next().unwrap_or_default();
            let values = fields
                .zip(&columns[1..])
                .map(|(raw, column)| decode_cell(&raw, &column.definition, with_meta, number))
                .collect::<CoreResult<Vec<_>>>()?;
            Ok(ResponseRow { key, values })
        })
        .collect::<CoreResult<Vec<_>>>()?;

    if let Some(expected) = metadata.result_row_count {
        if expected != rows.len() as u64 {
            return Err(CoreError::validation(format!(
                "response declares {expected} rows but carries {}",
                rows.len()
            )));
        }
    }
    Ok(rows)
}

fn decode_cell(
    raw: &str,
    definition: &ColumnDefinition,
    with_meta: bool,
    row: usize,
) -> CoreResult<Value> {
    if with_meta && definition.axis_type() == AxisType::Metric {
        let json: serde_json::Value = serde_json::from_str(raw).map_err(|err| {
            CoreError::validation(format!(
                "response row {row}: aggregate meta cell {raw:?} is not JSON: {err}"
            ))
        })?;
        return Ok(Value::from(json));
    }
    Ok(definition.decode(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_codec::DataType;

    fn success_line(rows: u64, with_meta: bool) -> String {
        json!({
            "date": "2024-03-01",
            "metric": "m",
            "status": "success",
            "min": 2, "max": 5, "sum": 10,
            "matched_row_count": 3,
            "column_meta": [
                {"axis_type": "dimension", "name": "md5", "data_type": "string", "precision": null, "empty_value": "", "index": 0},
                {"axis_type": "dimension", "name": "d", "data_type": "string", "precision": null, "empty_value": "", "index": 1},
                {"axis_type": "metric", "name": "m", "data_type": "int", "precision": null, "empty_value": 0, "index": 2}
            ],
            "is_aggregated": true,
            "aggregate_includes_meta": with_meta,
            "host": "h",
            "result_row_count": rows,
            "ms_elapsed": 1
        })
        .to_string()
    }

    #[test]
    fn parses_success_rows() {
        let payload = format!("{}\nk1,x,8\nk2,y,2\n", success_line(2, false));
        let response = Response::parse(&payload, true).unwrap();
        assert_eq!(response.metadata().sum, Some(Number::Int(10)));
        assert_eq!(response.rows().len(), 2);
        let row = response.find("k1").unwrap();
        assert_eq!(row.values, [Value::from("x"), Value::Int(8)]);
        assert!(response.find("zz").is_none());
    }

    #[test]
    fn aggregate_meta_cells_are_json() {
        let payload = format!(
            "{}\nk1,x,\"{{\"\"sum\"\":8,\"\"min\"\":3,\"\"max\"\":5,\"\"cnt\"\":2}}\"",
            success_line(1, true)
        );
        let response = Response::parse(&payload, true).unwrap();
        let cell = &response.rows()[0].values[1];
        assert_eq!(cell, &Value::Json(json!({"sum": 8, "min": 3, "max": 5, "cnt": 2})));
    }

    #[test]
    fn error_payload_respects_throw_flag() {
        let line = json!({"date": "", "metric": "", "status": "error", "error": "boom", "host": "h", "ms_elapsed": 0});
        let payload = line.to_string();
        match Response::parse(&payload, true) {
            Err(CoreError::ReaderFailed { message }) => assert_eq!(message, "boom"),
            other => panic!("unexpected {other:?}"),
        }
        let response = Response::parse(&payload, false).unwrap();
        assert_eq!(response.metadata().status, ResponseStatus::Error);
        assert!(response.rows().is_empty());
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(Response::parse("", true).is_err());
        assert!(Response::parse("  \n", true).is_err());
        assert!(Response::parse("not json", true).is_err());
        assert!(Response::parse(r#"{"date":"d","metric":"m","status":"weird"}"#, true).is_err());
        assert!(Response::parse(r#"{"date":"d","status":"empty"}"#, true).is_err());
        assert!(Response::parse(r#"{"date":"d","metric":"m","status":"success"}"#, true).is_err());

        let mut line: serde_json::Value = serde_json::from_str(&success_line(1, false)).unwrap();
        line.as_object_mut().unwrap().remove("is_aggregated");
        assert!(Response::parse(&format!("{line}\nk,x,1"), true).is_err());

        let payload = format!("{}\nk1,x", success_line(1, false));
        assert!(Response::parse(&payload, true).is_err());
        let payload = format!("{}\nk1,x,1", success_line(2, false));
        assert!(Response::parse(&payload, true).is_err());
    }

    #[test]
    fn empty_payload_has_no_rows() {
        let line = json!({"date": "2024-03-01", "metric": "m", "status": "empty", "host": "h", "ms_elapsed": 0});
        let response = Response::parse(&line.to_string(), true).unwrap();
        assert_eq!(response.metadata().status, ResponseStatus::Empty);
        assert!(response.rows().is_empty());
    }

    #[test]
    fn response_column_serializes_flat() {
        let column = ResponseColumn {
            definition: ColumnDefinition::dimension("md5", DataType::String, "").unwrap(),
            index: 0,
        };
        let json = serde_json::to_value(&column).unwrap();
        assert_eq!(json["name"], "md5");
        assert_eq!(json["index"], 0);
        let back: ResponseColumn = serde_json::from_value(json).unwrap();
        assert_eq!(back, column);
    }
}
