//! Property-based test generators using proptest.
//!
//! Generated values are already canonical for their column type, so a
//! value written and read back compares equal to the generated one.

use proptest::prelude::*;
use strata_core::{ColumnDefinition, DataType, Value, WriteRequest};

use crate::fixtures::SAMPLE_DATE;

/// Strategy for generating valid column names.
pub fn column_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating text cells.
///
/// Covers commas, quotes, backslashes and non-ASCII text; never produces
/// newlines or the run-length separator.
pub fn text_value_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("[a-z]{0,8}").expect("Invalid regex"),
        prop::string::string_regex("[ -~äöü€]{0,24}").expect("Invalid regex"),
        Just(String::new()),
        Just("a,b".to_string()),
        Just("\"quoted\"".to_string()),
        Just("back\\slash".to_string()),
    ]
}

/// Strategy for generating int cells.
pub fn int_value_strategy() -> impl Strategy<Value = i64> {
    prop_oneof![-1000i64..1000, any::<i32>().prop_map(i64::from)]
}

/// Strategy for generating a cell of `data_type`.
pub fn value_strategy(data_type: DataType) -> BoxedStrategy<Value> {
    match data_type {
        DataType::String => text_value_strategy().prop_map(Value::Text).boxed(),
        DataType::Int => int_value_strategy().prop_map(Value::Int).boxed(),
        // Quarter steps round-trip through decimal text exactly.
        DataType::Float => (-4000i64..4000)
            .prop_map(|q| Value::Float(q as f64 / 4.0))
            .boxed(),
        DataType::Bool => any::<bool>().prop_map(Value::Bool).boxed(),
        DataType::Datetime => (0u32..28, 0u32..24, 0u32..60)
            .prop_map(|(d, h, m)| Value::Text(format!("2024-02-{:02} {h:02}:{m:02}:00", d + 1)))
            .boxed(),
    }
}

/// Strategy for generating a dimension data type.
pub fn data_type_strategy() -> impl Strategy<Value = DataType> {
    prop_oneof![
        Just(DataType::String),
        Just(DataType::Int),
        Just(DataType::Float),
        Just(DataType::Bool),
        Just(DataType::Datetime),
    ]
}

/// Strategy for generating a write request with an int metric `m` and up
/// to four dimensions of random type.
///
/// Rows are listed in canonical column order.
pub fn write_request_strategy(max_rows: usize) -> impl Strategy<Value = WriteRequest> {
    prop::collection::btree_map(
        column_name_strategy().prop_filter("Reserved for the metric", |n| n != "m"),
        data_type_strategy(),
        0..4,
    )
    .prop_flat_map(move |dims| {
        let dims: Vec<(String, DataType)> = dims.into_iter().collect();
        let mut columns: Vec<(String, DataType)> = dims.clone();
        columns.push(("m".to_string(), DataType::Int));
        columns.sort_by(|a, b| a.0.cmp(&b.0));
        let cells: Vec<BoxedStrategy<Value>> = columns
            .iter()
            .map(|(_, data_type)| value_strategy(*data_type))
            .collect();
        let rows = prop::collection::vec(cells, 1..=max_rows.max(1));
        (Just(dims), Just(columns), rows)
    })
    .prop_map(|(dims, columns, rows)| WriteRequest {
        date: SAMPLE_DATE.into(),
        metric: ColumnDefinition::metric("m", DataType::Int, 0).expect("Invalid metric"),
        dimensions: dims
            .iter()
            .map(|(name, data_type)| dimension(name, *data_type))
            .collect(),
        headers: columns.into_iter().map(|(name, _)| name).collect(),
        rows,
    })
}

fn dimension(name: &str, data_type: DataType) -> ColumnDefinition {
    let empty = match data_type {
        DataType::String | DataType::Datetime => Value::Text(String::new()),
        DataType::Int => Value::Int(0),
        DataType::Float => Value::Float(0.0),
        DataType::Bool => Value::Bool(false),
    };
    ColumnDefinition::dimension(name, data_type, empty).expect("Invalid dimension")
}
