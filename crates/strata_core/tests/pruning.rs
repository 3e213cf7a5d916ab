//! Queries only touch the lines of the columns they need.

use std::path::{Path, PathBuf};
use strata_core::{
    ColumnDefinition, Comparator, Constraint, ConstraintGroups, DataType, FileHeader, Reader,
    Value, WriteOptions, WriteRequest,
};
use strata_storage::{FsResources, LockMode};
use strata_testkit::prelude::*;

const ROWS: usize = 3000;

/// Writes columns `a`, `b`, `c` and metric `m`; `b` and `c` hold long
/// unique values so their lines dominate the file.
fn wide_file(dir: &TestDir) -> PathBuf {
    let rows = (0..ROWS)
        .map(|i| {
            vec![
                Value::from(if i % 2 == 0 { "even" } else { "odd" }),
                Value::Text(format!("b-value-number-{i:08}")),
                Value::Text(format!("c-value-number-{i:08}")),
                Value::Int(1),
            ]
        })
        .collect();
    let request = WriteRequest {
        date: SAMPLE_DATE.into(),
        metric: ColumnDefinition::metric("m", DataType::Int, 0).unwrap(),
        dimensions: vec![
            string_dimension("a"),
            string_dimension("b"),
            string_dimension("c"),
        ],
        headers: vec!["a".into(), "b".into(), "c".into(), "m".into()],
        rows,
    };
    let path = dir.path("wide");
    dir.writer()
        .write(request, &path, WriteOptions::default())
        .unwrap();
    path
}

/// Absolute byte range of each column line.
fn column_ranges(path: &Path) -> Vec<(String, u64, u64)> {
    let bytes = std::fs::read(path).unwrap();
    let header_len = bytes.iter().position(|&b| b == b'\n').unwrap() as u64 + 1;
    let header = FileHeader::parse(std::str::from_utf8(&bytes[..header_len as usize]).unwrap())
        .unwrap();
    let mut starts: Vec<(String, u64)> = header
        .columns()
        .unwrap()
        .iter()
        .map(|(name, meta)| (name.clone(), header_len + meta.offset))
        .collect();
    starts.sort_by_key(|(_, start)| *start);
    let file_len = bytes.len() as u64;
    starts
        .iter()
        .enumerate()
        .map(|(i, (name, start))| {
            let end = starts.get(i + 1).map_or(file_len, |(_, next)| *next);
            (name.clone(), *start, end)
        })
        .collect()
}

fn range_of(ranges: &[(String, u64, u64)], column: &str) -> (u64, u64) {
    ranges
        .iter()
        .find(|(name, _, _)| name == column)
        .map(|(_, start, end)| (*start, *end))
        .unwrap()
}

fn recording_reader(dir: &TestDir) -> Reader<RecordingResources> {
    let resources = RecordingResources::new(FsResources::with_tmp_dir(dir.tmp_dir()).unwrap());
    Reader::with_resources(resources, dir.config())
}

#[test]
fn unrequested_columns_are_never_read() {
    with_test_dir(|dir| {
        let file = wide_file(dir);
        let ranges = column_ranges(&file);
        let (skipped_start, skipped_end) = {
            let (b_start, _) = range_of(&ranges, "b");
            let (_, c_end) = range_of(&ranges, "c");
            (b_start, c_end)
        };
        let (a_start, _) = range_of(&ranges, "a");
        let (m_start, _) = range_of(&ranges, "m");

        let mut reader = recording_reader(dir);
        let mut query = dir.query(&file, &["a"]);
        query.metric = "m".into();
        query.do_aggregate = true;
        reader.run(&query).unwrap();
        assert_eq!(reader.results().len(), 2);

        let recorder = reader.resources();
        assert_eq!(recorder.seeks(&file), [a_start, m_start]);
        for (position, _) in recorder.reads(&file) {
            assert!(
                !(skipped_start..skipped_end).contains(&position),
                "read at {position} falls inside columns b and c"
            );
        }
        let file_len = std::fs::metadata(&file).unwrap().len();
        assert!(recorder.bytes_read(&file) < file_len / 2);
    });
}

#[test]
fn constraint_columns_are_read_but_not_returned() {
    with_test_dir(|dir| {
        let file = wide_file(dir);
        let ranges = column_ranges(&file);

        let mut reader = recording_reader(dir);
        let mut query = dir.query(&file, &["a"]);
        query.metric = "m".into();
        query.constraints = ConstraintGroups::new(vec![vec![Constraint::new(
            "c",
            Comparator::EndsWith,
            "00000007",
        )
        .unwrap()]]);
        reader.run(&query).unwrap();

        let results = reader.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0][1..], [Value::from("odd"), Value::Int(1)]);
        let columns = reader.metadata().unwrap().column_meta.clone().unwrap();
        assert!(columns.iter().all(|c| c.definition.name() != "c"));

        let seeks = reader.resources().seeks(&file);
        assert_eq!(
            seeks,
            [
                range_of(&ranges, "a").0,
                range_of(&ranges, "c").0,
                range_of(&ranges, "m").0
            ]
        );
        assert!(!seeks.contains(&range_of(&ranges, "b").0));
    });
}

#[test]
fn inputs_are_shared_locked_and_released() {
    with_test_dir(|dir| {
        let file = dir.write_sample("visits");
        let mut reader = recording_reader(dir);
        reader.run(&dir.query(&file, &["country"])).unwrap();
        reader.file_metadata(&file).unwrap();

        let recorder = reader.resources();
        assert_eq!(recorder.opens(&file), [LockMode::Shared, LockMode::Shared]);
        assert_eq!(recorder.open_inputs(), 0);
    });
}

#[test]
fn failed_queries_release_their_input() {
    with_test_dir(|dir| {
        let file = dir.write_sample("visits");
        let mut reader = recording_reader(dir);
        let mut query = dir.query(&file, &["country"]);
        query.date = "2024-03-02".into();
        assert!(reader.run(&query).is_err());
        assert_eq!(reader.resources().open_inputs(), 0);
    });
}

#[test]
fn header_read_touches_no_column() {
    with_test_dir(|dir| {
        let file = wide_file(dir);
        let reader = recording_reader(dir);
        reader.file_metadata(&file).unwrap();
        assert!(reader.resources().seeks(&file).is_empty());
        // one buffered read covers the header
        assert_eq!(reader.resources().reads(&file).len(), 1);
    });
}
