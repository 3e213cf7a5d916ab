//! Column definitions and dataset schemas.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use strata_codec::{DataType, Value};

/// Whether a column is the aggregated metric or a grouping dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisType {
    /// The single aggregatable column.
    Metric,
    /// A grouping key column.
    Dimension,
}

/// A validated column descriptor.
///
/// # Invariants
///
/// - `name` matches `[a-z][a-z0-9_]*`
/// - `precision` is only set for float columns and is positive
/// - `empty_value` has the runtime type of `data_type` (ints are widened
///   to floats for float columns)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawColumnDefinition")]
pub struct ColumnDefinition {
    axis_type: AxisType,
    name: String,
    data_type: DataType,
    precision: Option<u32>,
    empty_value: Value,
}

#[derive(Deserialize)]
struct RawColumnDefinition {
    axis_type: AxisType,
    name: String,
    data_type: String,
    #[serde(default)]
    precision: Option<i64>,
    empty_value: Value,
}

impl TryFrom<RawColumnDefinition> for ColumnDefinition {
    type Error = CoreError;

    fn try_from(raw: RawColumnDefinition) -> CoreResult<Self> {
        let data_type: DataType = raw.data_type.parse()?;
        let precision = raw
            .precision
            .map(|p| {
                u32::try_from(p).map_err(|_| {
                    CoreError::validation(format!(
                        "column {:?}: precision must be a positive integer, got {p}",
                        raw.name
                    ))
                })
            })
            .transpose()?;
        Self::new(raw.axis_type, raw.name, data_type, precision, raw.empty_value)
    }
}

impl ColumnDefinition {
    /// Creates and validates a column definition.
    ///
    /// # Errors
    ///
    /// Returns a validation error if any invariant is violated.
    pub fn new(
        axis_type: AxisType,
        name: impl Into<String>,
        data_type: DataType,
        precision: Option<u32>,
        empty_value: Value,
    ) -> CoreResult<Self> {
        let name = name.into();
        validate_name(&name)?;

        match precision {
            Some(0) => {
                return Err(CoreError::validation(format!(
                    "column {name:?}: precision must be greater than zero"
                )))
            }
            Some(_) if data_type != DataType::Float => {
                return Err(CoreError::validation(format!(
                    "column {name:?}: precision is only allowed for float columns"
                )))
            }
            _ => {}
        }

        let empty_value = match (data_type, empty_value) {
            (DataType::Float, Value::Int(i)) => Value::Float(i as f64),
            (DataType::String | DataType::Datetime, v @ Value::Text(_))
            | (DataType::Int, v @ Value::Int(_))
            | (DataType::Float, v @ Value::Float(_))
            | (DataType::Bool, v @ Value::Bool(_)) => v,
            (_, other) => {
                return Err(CoreError::validation(format!(
                    "column {name:?}: empty value of type {} does not match data type {data_type}",
                    other.kind()
                )))
            }
        };

        Ok(Self {
            axis_type,
            name,
            data_type,
            precision,
            empty_value,
        })
    }

    /// Shorthand for a metric column without precision.
    ///
    /// # Errors
    ///
    /// See [`ColumnDefinition::new`].
    pub fn metric(
        name: impl Into<String>,
        data_type: DataType,
        empty_value: impl Into<Value>,
    ) -> CoreResult<Self> {
        Self::new(AxisType::Metric, name, data_type, None, empty_value.into())
    }

    /// Shorthand for a dimension column without precision.
    ///
    /// # Errors
    ///
    /// See [`ColumnDefinition::new`].
    pub fn dimension(
        name: impl Into<String>,
        data_type: DataType,
        empty_value: impl Into<Value>,
    ) -> CoreResult<Self> {
        Self::new(AxisType::Dimension, name, data_type, None, empty_value.into())
    }

    /// Returns a copy with `precision` set.
    ///
    /// # Errors
    ///
    /// Fails for non-float columns or a zero precision.
    pub fn with_precision(self, precision: u32) -> CoreResult<Self> {
        Self::new(
            self.axis_type,
            self.name,
            self.data_type,
            Some(precision),
            self.empty_value,
        )
    }

    /// Returns the axis type.
    #[must_use]
    pub fn axis_type(&self) -> AxisType {
        self.axis_type
    }

    /// Returns the column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the data type.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns the float precision, if any.
    #[must_use]
    pub fn precision(&self) -> Option<u32> {
        self.precision
    }

    /// Returns the value substituted for nulls.
    #[must_use]
    pub fn empty_value(&self) -> &Value {
        &self.empty_value
    }

    /// Decodes an on-disk string for this column.
    #[must_use]
    pub fn decode(&self, raw: &str) -> Value {
        strata_codec::scalar::decode(raw, self.data_type, self.precision)
    }
}

/// Checks a column or constraint name against `[a-z][a-z0-9_]*`.
///
/// # Errors
///
/// Returns a validation error naming the rejected name.
pub fn validate_name(name: &str) -> CoreResult<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CoreError::validation(format!(
            "invalid column name {name:?}: must match [a-z][a-z0-9_]*"
        )))
    }
}

/// Checks that `date` is a real calendar date in `YYYY-MM-DD` form.
///
/// # Errors
///
/// Returns a validation error for any other input.
pub fn validate_date(date: &str) -> CoreResult<()> {
    let shaped = date.len() == 10
        && date.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        });
    if shaped && chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok() {
        Ok(())
    } else {
        Err(CoreError::validation(format!(
            "invalid date {date:?}: expected a calendar date as YYYY-MM-DD"
        )))
    }
}

/// The full column set of a dataset in canonical (alphabetical) order.
///
/// A column's position in [`Schema::columns`] is its on-disk index.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    columns: Vec<ColumnDefinition>,
    metric_index: usize,
}

impl Schema {
    /// Builds a schema from one metric and at least one dimension.
    ///
    /// # Errors
    ///
    /// Fails if the metric is not a numeric metric-axis column, there are no
    /// dimensions, a dimension is not on the dimension axis, or two columns
    /// share a name.
    pub fn new(metric: ColumnDefinition, dimensions: Vec<ColumnDefinition>) -> CoreResult<Self> {
        if metric.axis_type != AxisType::Metric {
            return Err(CoreError::validation(format!(
                "column {:?} is used as the metric but is not on the metric axis",
                metric.name
            )));
        }
        if !metric.data_type.is_numeric() {
            return Err(CoreError::validation(format!(
                "metric {:?} must be int or float, got {}",
                metric.name, metric.data_type
            )));
        }
        if dimensions.is_empty() {
            return Err(CoreError::validation("at least one dimension is required"));
        }
        if let Some(dim) = dimensions
            .iter()
            .find(|d| d.axis_type != AxisType::Dimension)
        {
            return Err(CoreError::validation(format!(
                "column {:?} is used as a dimension but is not on the dimension axis",
                dim.name
            )));
        }

        let metric_name = metric.name.clone();
        let mut columns = dimensions;
        columns.push(metric);
        columns.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(pair) = columns.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(CoreError::validation(format!(
                "duplicate column name {:?}",
                pair[0].name
            )));
        }
        let metric_index = columns
            .iter()
            .position(|c| c.name == metric_name)
            .ok_or_else(|| CoreError::validation("metric column lost while sorting"))?;

        Ok(Self {
            columns,
            metric_index,
        })
    }

    /// Columns in canonical order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Always false; a schema has at least a metric and one dimension.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// The metric column.
    #[must_use]
    pub fn metric(&self) -> &ColumnDefinition {
        &self.columns[self.metric_index]
    }

    /// Canonical index of the metric column.
    #[must_use]
    pub fn metric_index(&self) -> usize {
        self.metric_index
    }

    /// Canonical index of the column called `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns
            .binary_search_by(|c| c.name.as_str().cmp(name))
            .ok()
    }

    /// Column names in canonical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dim(name: &str) -> ColumnDefinition {
        ColumnDefinition::dimension(name, DataType::String, "").unwrap()
    }

    #[test]
    fn names_are_validated() {
        assert!(validate_name("country_2").is_ok());
        for bad in ["", "2x", "Country", "a-b", "_a", "é"] {
            assert!(validate_name(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn dates_are_validated() {
        assert!(validate_date("2024-02-29").is_ok());
        for bad in ["2023-02-29", "2024-13-01", "2024-1-01", "20240101", "2024-01-01 "] {
            assert!(validate_date(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn precision_rules() {
        let float = ColumnDefinition::metric("m", DataType::Float, 0.0).unwrap();
        assert_eq!(float.clone().with_precision(2).unwrap().precision(), Some(2));
        assert!(float.with_precision(0).is_err());

        let int = ColumnDefinition::metric("m", DataType::Int, 0).unwrap();
        assert!(int.with_precision(2).is_err());
    }

    #[test]
    fn empty_value_type_must_match() {
        assert!(ColumnDefinition::dimension("d", DataType::String, 0).is_err());
        assert!(ColumnDefinition::dimension("d", DataType::Bool, "no").is_err());
        assert!(ColumnDefinition::dimension("d", DataType::Int, Value::Null).is_err());

        let widened = ColumnDefinition::metric("m", DataType::Float, 3).unwrap();
        assert_eq!(widened.empty_value(), &Value::Float(3.0));
    }

    #[test]
    fn definition_json_shape() {
        let def = ColumnDefinition::dimension("country", DataType::String, "").unwrap();
        let json = serde_json::to_string(&def).unwrap();
        assert_eq!(
            json,
            r#"{"axis_type":"dimension","name":"country","data_type":"string","precision":null,"empty_value":""}"#
        );
        let back: ColumnDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, def);
    }

    #[test]
    fn invalid_definition_json_is_rejected() {
        let bad_type =
            r#"{"axis_type":"dimension","name":"d","data_type":"decimal","empty_value":""}"#;
        assert!(serde_json::from_str::<ColumnDefinition>(bad_type).is_err());
        let bad_precision =
            r#"{"axis_type":"metric","name":"m","data_type":"float","precision":-1,"empty_value":0}"#;
        assert!(serde_json::from_str::<ColumnDefinition>(bad_precision).is_err());
    }

    #[test]
    fn schema_orders_columns_alphabetically() {
        let metric = ColumnDefinition::metric("impressions", DataType::Int, 0).unwrap();
        let schema = Schema::new(metric, vec![dim("site"), dim("country")]).unwrap();

        assert_eq!(
            schema.names().collect::<Vec<_>>(),
            ["country", "impressions", "site"]
        );
        assert_eq!(schema.metric_index(), 1);
        assert_eq!(schema.metric().name(), "impressions");
        assert_eq!(schema.index_of("site"), Some(2));
        assert_eq!(schema.index_of("missing"), None);
    }

    #[test]
    fn schema_rejects_bad_shapes() {
        let metric = ColumnDefinition::metric("m", DataType::Int, 0).unwrap();
        assert!(Schema::new(metric.clone(), vec![]).is_err());
        assert!(Schema::new(metric.clone(), vec![dim("d"), dim("d")]).is_err());
        assert!(Schema::new(metric.clone(), vec![dim("m")]).is_err());
        assert!(Schema::new(dim("x"), vec![dim("d")]).is_err());
        assert!(Schema::new(metric.clone(), vec![metric]).is_err());

        let text_metric = ColumnDefinition::metric("m", DataType::String, "").unwrap();
        assert!(Schema::new(text_metric, vec![dim("d")]).is_err());
    }
}
