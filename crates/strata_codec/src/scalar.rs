//! Scalar codec: typed values to and from their on-disk strings.

use crate::error::{CodecError, CodecResult};
use crate::value::{truncate, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The data type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Free text.
    String,
    /// Signed integer.
    Int,
    /// Floating point, optionally rounded to a fixed precision.
    Float,
    /// Boolean, stored as `1`/`0`.
    Bool,
    /// Date or timestamp text; compared chronologically where ordering matters.
    Datetime,
}

impl DataType {
    /// Returns the lowercase name used in headers and requests.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Datetime => "datetime",
        }
    }

    /// Returns true for `int` and `float`.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "int" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            "bool" => Ok(Self::Bool),
            "datetime" => Ok(Self::Datetime),
            other => Err(CodecError::InvalidDataType {
                name: other.to_string(),
            }),
        }
    }
}

/// Decodes an on-disk string into a typed value.
///
/// Text and datetime pass through, int and float use permissive numeric
/// parsing, bool uses truthiness. Floats are rounded when `precision` is set.
#[must_use]
pub fn decode(raw: &str, data_type: DataType, precision: Option<u32>) -> Value {
    match data_type {
        DataType::String | DataType::Datetime => Value::Text(raw.to_string()),
        DataType::Int => Value::Int(coerce_int(raw)),
        DataType::Float => {
            let f = coerce_float(raw);
            Value::Float(precision.map_or(f, |p| round_to(f, p)))
        }
        DataType::Bool => Value::Bool(coerce_bool(raw)),
    }
}

/// Decodes `raw` against a data type given by name.
///
/// # Errors
///
/// Returns [`CodecError::InvalidDataType`] if `type_name` is unknown.
pub fn decode_named(raw: &str, type_name: &str, precision: Option<u32>) -> CodecResult<Value> {
    Ok(decode(raw, type_name.parse()?, precision))
}

/// Converts a typed value into its on-disk string.
///
/// Booleans become `1`/`0`; JSON values are serialized.
#[must_use]
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Converts a typed value to the column's type without going through text.
#[must_use]
pub fn convert(value: &Value, data_type: DataType, precision: Option<u32>) -> Value {
    match data_type {
        DataType::String | DataType::Datetime => Value::Text(stringify(value)),
        DataType::Int => Value::Int(value.to_int()),
        DataType::Float => {
            let f = value.to_float();
            Value::Float(precision.map_or(f, |p| round_to(f, p)))
        }
        DataType::Bool => Value::Bool(value.to_bool()),
    }
}

/// Rounds half away from zero to `precision` decimal places.
#[must_use]
pub fn round_to(value: f64, precision: u32) -> f64 {
    let exponent = i32::try_from(precision).unwrap_or(i32::MAX);
    let factor = 10f64.powi(exponent);
    if !factor.is_finite() {
        return value;
    }
    let rounded = (value * factor).round() / factor;
    if rounded.is_finite() {
        rounded
    } else {
        value
    }
}

/// Parses the leading integer of `raw`; non-numeric text is 0.
#[must_use]
pub fn coerce_int(raw: &str) -> i64 {
    let prefix = numeric_prefix(raw);
    if prefix.is_empty() {
        return 0;
    }
    if let Ok(i) = prefix.parse::<i64>() {
        return i;
    }
    prefix.parse::<f64>().map_or(0, truncate)
}

/// Parses the leading number of `raw`; non-numeric text is 0.0.
#[must_use]
pub fn coerce_float(raw: &str) -> f64 {
    let prefix = numeric_prefix(raw);
    if prefix.is_empty() {
        return 0.0;
    }
    prefix.parse().unwrap_or(0.0)
}

/// Text truthiness: only `""` and `"0"` are false.
#[must_use]
pub fn coerce_bool(raw: &str) -> bool {
    !(raw.is_empty() || raw == "0")
}

/// Returns the longest prefix of `raw` (after leading whitespace) that
/// forms a decimal number: sign, digits, fraction, exponent.
fn numeric_prefix(raw: &str) -> &str {
    let s = raw.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let int_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut digits = end - int_start;
    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        if digits > 0 || frac_end > frac_start {
            digits += frac_end - frac_start;
            end = frac_end;
        }
    }
    if digits == 0 {
        return "";
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }
    &s[..end]
}
