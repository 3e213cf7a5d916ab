//! Benchmark utilities.

#![warn(missing_docs)]

use rand::seq::SliceRandom;
use rand::Rng;
use strata_core::{ColumnDefinition, DataType, Value, WriteRequest};

/// Date of every generated partition.
pub const BENCH_DATE: &str = "2024-03-01";

const COUNTRIES: [&str; 8] = ["us", "de", "fr", "gb", "jp", "br", "in", "ca"];
const DEVICES: [&str; 3] = ["mobile", "desktop", "tablet"];

/// Generate `count` random words of up to `max_len` lowercase letters.
pub fn random_words(count: usize, max_len: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let len = rng.gen_range(1..=max_len.max(1));
            (0..len).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
        })
        .collect()
}

/// Generate a column of `count` values drawn from `distinct` choices, so
/// long runs appear when `distinct` is small and rows are sorted.
pub fn low_cardinality_column(count: usize, distinct: usize) -> Vec<String> {
    let choices = random_words(distinct.max(1), 12);
    let mut rng = rand::thread_rng();
    let mut values: Vec<String> = (0..count)
        .map(|_| choices.choose(&mut rng).cloned().unwrap_or_default())
        .collect();
    values.sort();
    values
}

/// Generate a write request with an int metric `clicks` and dimensions
/// `country`, `device`, `session` (high cardinality) and `price` (float).
pub fn generate_request(rows: usize) -> WriteRequest {
    let mut rng = rand::thread_rng();
    let rows = (0..rows)
        .map(|i| {
            vec![
                Value::Int(rng.gen_range(0..1000)),
                Value::from(*COUNTRIES.choose(&mut rng).unwrap_or(&"us")),
                Value::from(*DEVICES.choose(&mut rng).unwrap_or(&"mobile")),
                Value::Text(format!("session-{i:010}")),
                Value::Float(f64::from(rng.gen_range(0u32..10_000)) / 100.0),
            ]
        })
        .collect();

    WriteRequest {
        date: BENCH_DATE.into(),
        metric: ColumnDefinition::metric("clicks", DataType::Int, 0).expect("valid metric"),
        dimensions: vec![
            ColumnDefinition::dimension("country", DataType::String, "").expect("valid dimension"),
            ColumnDefinition::dimension("device", DataType::String, "").expect("valid dimension"),
            ColumnDefinition::dimension("session", DataType::String, "").expect("valid dimension"),
            ColumnDefinition::dimension("price", DataType::Float, 0.0)
                .and_then(|d| d.with_precision(2))
                .expect("valid dimension"),
        ],
        headers: ["clicks", "country", "device", "session", "price"]
            .into_iter()
            .map(String::from)
            .collect(),
        rows,
    }
}
