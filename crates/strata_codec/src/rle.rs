//! Run-length codec for column values.
//!
//! A run of `n > 1` identical values `v` is stored as the single value
//! `v<SEP>n`; singleton runs are stored as-is. `SEP` is the ASCII record
//! separator, which legitimate values may not contain.

use crate::error::{CodecError, CodecResult};

/// Separator between a run's value and its count.
pub const RLE_SEPARATOR: char = '\u{1e}';

/// Fails if any value contains [`RLE_SEPARATOR`].
///
/// # Errors
///
/// Returns [`CodecError::ContainsRleSeparator`] naming the first offender.
pub fn ensure_no_separator<S: AsRef<str>>(column: &str, values: &[S]) -> CodecResult<()> {
    match values.iter().find(|v| v.as_ref().contains(RLE_SEPARATOR)) {
        Some(value) => Err(CodecError::ContainsRleSeparator {
            column: column.to_string(),
            value: value.as_ref().to_string(),
        }),
        None => Ok(()),
    }
}

/// Compresses runs of identical adjacent values.
///
/// The output is decompressed and compared against `values` before it is
/// returned.
///
/// # Errors
///
/// Returns an error if a value contains the separator or the output does
/// not expand back to `values`.
pub fn compress(column: &str, values: &[String]) -> CodecResult<Vec<String>> {
    ensure_no_separator(column, values)?;

    let mut compressed = Vec::new();
    let mut iter = values.iter().peekable();
    while let Some(value) = iter.next() {
        let mut count = 1usize;
        while iter.peek() == Some(&value) {
            iter.next();
            count += 1;
        }
        if count == 1 {
            compressed.push(value.clone());
        } else {
            compressed.push(format!("{value}{RLE_SEPARATOR}{count}"));
        }
    }

    if expand(&compressed)? != values {
        return Err(CodecError::RleRoundTripMismatch {
            column: column.to_string(),
        });
    }
    Ok(compressed)
}

/// Expands compressed values.
///
/// Input without any separator is returned untouched.
///
/// # Errors
///
/// Returns [`CodecError::InvalidRunCount`] for a malformed run.
pub fn decompress(values: Vec<String>) -> CodecResult<Vec<String>> {
    if values.iter().any(|v| v.contains(RLE_SEPARATOR)) {
        expand(&values)
    } else {
        Ok(values)
    }
}

/// Compresses `values` and keeps the result only if it saves at least
/// `threshold_percent` of the encoded length.
///
/// Encoded length is the byte length of every value plus one separator byte
/// per value. A single value is returned unchanged.
///
/// # Errors
///
/// Returns an error for empty input, a threshold outside `1..=100`, or any
/// error from [`compress`].
pub fn compress_if_threshold_met(
    column: &str,
    values: Vec<String>,
    threshold_percent: u8,
) -> CodecResult<Vec<String>> {
    if values.is_empty() {
        return Err(CodecError::EmptyInput {
            operation: "run-length compression",
        });
    }
    if threshold_percent == 0 || threshold_percent > 100 {
        return Err(CodecError::InvalidThreshold {
            threshold: threshold_percent,
        });
    }
    if values.len() == 1 {
        ensure_no_separator(column, &values)?;
        return Ok(values);
    }

    let compressed = compress(column, &values)?;
    let original_len = encoded_len(&values);
    let compressed_len = encoded_len(&compressed);

    // savings >= threshold, kept in integers: (o - c) / o >= t / 100
    let saved = original_len.saturating_sub(compressed_len);
    if saved * 100 >= u64::from(threshold_percent) * original_len {
        Ok(compressed)
    } else {
        Ok(values)
    }
}

fn encoded_len(values: &[String]) -> u64 {
    values.iter().map(|v| v.len() as u64 + 1).sum()
}

fn expand(values: &[String]) -> CodecResult<Vec<String>> {
    let mut expanded = Vec::with_capacity(values.len());
    for value in values {
        match value.split_once(RLE_SEPARATOR) {
            None => expanded.push(value.clone()),
            Some((run, count)) => {
                let count: usize = count
                    .parse()
                    .ok()
                    .filter(|c| *c > 0)
                    .ok_or_else(|| CodecError::InvalidRunCount {
                        value: value.clone(),
                    })?;
                expanded.extend(std::iter::repeat_n(run.to_string(), count));
            }
        }
    }
    Ok(expanded)
}
