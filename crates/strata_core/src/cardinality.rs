//! Cardinality-driven row ordering.
//!
//! Rows are sorted so that low-cardinality columns come first in the sort
//! key. Adjacent equal values then form long runs, which is what the
//! run-length codec compresses.

use crate::error::{CoreError, CoreResult};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Values longer than this are hashed before counting distinct values.
const HASH_THRESHOLD: usize = 32;

/// Distinct-value count of one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardinalityItem {
    /// Canonical column index.
    pub index: usize,
    /// Column name.
    pub name: String,
    /// Number of distinct values.
    pub count: usize,
}

/// Counts the distinct values of every column in `rows`.
///
/// # Errors
///
/// Fails if a row does not have one value per column.
pub fn cardinalities(columns: &[String], rows: &[Vec<String>]) -> CoreResult<Vec<CardinalityItem>> {
    let mut seen: Vec<HashSet<Vec<u8>>> = vec![HashSet::new(); columns.len()];
    for (row_number, row) in rows.iter().enumerate() {
        if row.len() != columns.len() {
            return Err(CoreError::integrity(
                "cardinality sort",
                format!(
                    "row {row_number} has {} values, expected {}",
                    row.len(),
                    columns.len()
                ),
            ));
        }
        for (set, value) in seen.iter_mut().zip(row) {
            set.insert(distinct_key(value));
        }
    }
    Ok(columns
        .iter()
        .zip(seen)
        .enumerate()
        .map(|(index, (name, set))| CardinalityItem {
            index,
            name: name.clone(),
            count: set.len(),
        })
        .collect())
}

/// Orders columns by ascending cardinality, then by index.
///
/// # Errors
///
/// Fails if two items tie on both count and index, which means the items
/// did not come from distinct columns.
pub fn sort_order(mut items: Vec<CardinalityItem>) -> CoreResult<Vec<usize>> {
    items.sort_by(|a, b| a.count.cmp(&b.count).then(a.index.cmp(&b.index)));
    if let Some(pair) = items
        .windows(2)
        .find(|w| w[0].count == w[1].count && w[0].index == w[1].index)
    {
        return Err(CoreError::integrity(
            "cardinality sort",
            format!(
                "columns {:?} and {:?} share index {} and cardinality {}",
                pair[0].name, pair[1].name, pair[0].index, pair[0].count
            ),
        ));
    }
    Ok(items.into_iter().map(|item| item.index).collect())
}

/// Stably sorts rows by the columns in `order`, first column most significant.
pub fn sort_rows(rows: &mut [Vec<String>], order: &[usize]) {
    rows.sort_by(|a, b| {
        order
            .iter()
            .map(|&i| a[i].cmp(&b[i]))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

/// Sorts `rows` so that low-cardinality columns form the longest runs.
///
/// # Errors
///
/// See [`cardinalities`] and [`sort_order`].
pub fn cardinality_sort(columns: &[String], mut rows: Vec<Vec<String>>) -> CoreResult<Vec<Vec<String>>> {
    let order = sort_order(cardinalities(columns, &rows)?)?;
    tracing::trace!(?order, "cardinality column order");
    sort_rows(&mut rows, &order);
    Ok(rows)
}

fn distinct_key(value: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(HASH_THRESHOLD + 1);
    if value.len() > HASH_THRESHOLD {
        key.push(1);
        key.extend_from_slice(&Sha256::digest(value.as_bytes()));
    } else {
        key.push(0);
        key.extend_from_slice(value.as_bytes());
    }
    key
}
