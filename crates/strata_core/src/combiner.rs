//! Merging partial files of one schema into a single file.
//!
//! Column lines are concatenated byte for byte; nothing is decoded. Each
//! merge step trusts the offsets recorded in its sources' headers and checks
//! that every source cursor sits exactly at the next column's offset and
//! ends exactly at end of file.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::header::{FileHeader, FileStatus, MetricStats};
use crate::schema::{validate_date, ColumnDefinition, Schema};
use crate::timing::Stopwatch;
use crate::writer::WriteSummary;
use std::collections::HashSet;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use strata_storage::{FileResources, FsResources, LockMode, TempFile};

/// Where the partial files come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialSources {
    /// Loose files on disk.
    Files(Vec<PathBuf>),
    /// Every file entry of a zip archive.
    Zip(PathBuf),
}

/// The schema the partial files must share.
#[derive(Debug, Clone)]
pub struct CombineRequest {
    /// Partition date, `YYYY-MM-DD`.
    pub date: String,
    /// The metric column.
    pub metric: ColumnDefinition,
    /// The dimension columns.
    pub dimensions: Vec<ColumnDefinition>,
}

/// Per-combine switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombineOptions {
    /// Hold an exclusive lock on the output while placing it.
    pub lock_output: bool,
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self { lock_output: true }
    }
}

/// A merge input. Only temp sources are ever deleted.
#[derive(Debug)]
enum Source {
    Caller(PathBuf),
    Temp(TempFile),
}

impl Source {
    fn path(&self) -> &Path {
        match self {
            Self::Caller(path) => path,
            Self::Temp(temp) => temp.path(),
        }
    }
}

/// Merges partial files.
#[derive(Debug)]
pub struct Combiner<R: FileResources = FsResources> {
    resources: R,
    config: Config,
}

impl Combiner<FsResources> {
    /// Creates a combiner on the local filesystem.
    ///
    /// # Errors
    ///
    /// Fails if the configured temp directory is unusable.
    pub fn new(config: Config) -> CoreResult<Self> {
        Ok(Self::with_resources(config.resources()?, config))
    }
}

impl<R: FileResources> Combiner<R> {
    /// Creates a combiner over custom file resources.
    pub fn with_resources(resources: R, config: Config) -> Self {
        Self { resources, config }
    }

    /// Merges `sources` into a new file at `output`.
    ///
    /// Sources without data are skipped; if none has data the output is a
    /// no-data file. More sources than the configured chunk size are merged
    /// in rounds through intermediate temp files.
    ///
    /// # Errors
    ///
    /// Fails on an empty or duplicate source list, a source whose header
    /// disagrees with the request, any offset or trailing-bytes check, and
    /// I/O errors. Caller files are never modified or deleted.
    pub fn combine(
        &self,
        request: CombineRequest,
        sources: &PartialSources,
        output: &Path,
        options: CombineOptions,
    ) -> CoreResult<WriteSummary> {
        let stopwatch = Stopwatch::start();
        validate_date(&request.date)?;
        let schema = Schema::new(request.metric, request.dimensions)?;
        let chunk_size = self.config.combine_chunk_size;
        if chunk_size < 2 {
            return Err(CoreError::validation(format!(
                "combine chunk size must be at least 2, got {chunk_size}"
            )));
        }
        self.resources.check_output_path(output)?;

        let sources = self.open_sources(sources)?;
        let source_count = sources.len();
        let mut level = Vec::with_capacity(sources.len());
        for source in sources {
            if self.has_data(&source, &request.date, &schema)? {
                level.push(source);
            } else {
                tracing::debug!(path = %source.path().display(), "skipping source without data");
                self.release(source)?;
            }
        }

        if level.is_empty() {
            let mut staged = self.resources.open_temp_read_write()?;
            staged.write_all(FileHeader::no_data(&request.date, schema.metric().name()).to_line()?.as_bytes())?;
            staged.flush()?;
            self.resources.move_into(staged, output, options.lock_output)?;
            return Ok(WriteSummary {
                status: FileStatus::NoData,
                write_time_ms: stopwatch.elapsed_ms(),
            });
        }

        let mut depth = 0usize;
        while level.len() > chunk_size {
            let mut next = Vec::with_capacity(level.len().div_ceil(chunk_size));
            let mut pending = level.into_iter();
            loop {
                let chunk: Vec<Source> = pending.by_ref().take(chunk_size).collect();
                if chunk.is_empty() {
                    break;
                }
                let merged = self.merge(&request.date, &schema, &chunk)?;
                for source in chunk {
                    self.release(source)?;
                }
                next.push(Source::Temp(merged));
            }
            depth += 1;
            tracing::debug!(depth, sources = next.len(), "combine round finished");
            level = next;
        }

        let merged = self.merge(&request.date, &schema, &level)?;
        for source in level {
            self.release(source)?;
        }
        self.resources.move_into(merged, output, options.lock_output)?;

        let summary = WriteSummary {
            status: FileStatus::HasData,
            write_time_ms: stopwatch.elapsed_ms(),
        };
        tracing::info!(
            path = %output.display(),
            sources = source_count,
            rounds = depth + 1,
            ms = summary.write_time_ms,
            "files combined"
        );
        Ok(summary)
    }

    fn open_sources(&self, sources: &PartialSources) -> CoreResult<Vec<Source>> {
        let opened = match sources {
            PartialSources::Files(paths) => {
                let mut seen = HashSet::new();
                if let Some(duplicate) = paths.iter().find(|path| !seen.insert(path.as_path())) {
                    return Err(CoreError::validation(format!(
                        "duplicate source {}",
                        duplicate.display()
                    )));
                }
                paths.iter().cloned().map(Source::Caller).collect()
            }
            PartialSources::Zip(archive) => self.extract_zip(archive)?,
        };
        if opened.is_empty() {
            return Err(CoreError::validation("at least one source is required"));
        }
        Ok(opened)
    }

    fn extract_zip(&self, path: &Path) -> CoreResult<Vec<Source>> {
        let input = self.resources.open_for_read(path, LockMode::Shared)?;
        let invalid = |err: zip::result::ZipError| {
            CoreError::validation(format!("invalid zip archive {}: {err}", path.display()))
        };
        let mut archive = zip::ZipArchive::new(input).map_err(invalid)?;
        let mut names = HashSet::new();
        let mut sources = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(invalid)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            if !names.insert(name.clone()) {
                return Err(CoreError::validation(format!(
                    "duplicate entry {name:?} in {}",
                    path.display()
                )));
            }
            let mut temp = self.resources.open_temp_read_write()?;
            let bytes = io::copy(&mut entry, &mut temp)?;
            temp.flush()?;
            tracing::debug!(entry = %name, bytes, "zip entry extracted");
            sources.push(Source::Temp(temp));
        }
        self.resources.close_input(archive.into_inner())?;
        Ok(sources)
    }

    /// Validates a source's header and reports whether it carries rows.
    fn has_data(&self, source: &Source, date: &str, schema: &Schema) -> CoreResult<bool> {
        let mut input = BufReader::new(self.resources.open_for_read(source.path(), LockMode::Shared)?);
        let header = read_header(&mut input, source.path());
        let closed = self.resources.close_input(input.into_inner());
        let (header, _) = header?;
        closed?;
        header
            .validate_for_combine(date, schema)
            .map_err(|err| match err {
                CoreError::SchemaMismatch { message } => CoreError::schema_mismatch(format!(
                    "{}: {message}",
                    source.path().display()
                )),
                other => other,
            })?;
        Ok(header.status == FileStatus::HasData)
    }

    fn release(&self, source: Source) -> CoreResult<()> {
        match source {
            Source::Caller(_) => Ok(()),
            Source::Temp(temp) => Ok(self.resources.close_and_delete(temp)?),
        }
    }

    /// Merges `parts` into one staged file.
    fn merge(&self, date: &str, schema: &Schema, parts: &[Source]) -> CoreResult<TempFile> {
        let mut inputs = Vec::with_capacity(parts.len());
        for part in parts {
            inputs.push(BufReader::new(
                self.resources.open_for_read(part.path(), LockMode::Shared)?,
            ));
        }
        let merged = self.merge_inputs(date, schema, parts, &mut inputs);
        let mut closed = Ok(());
        for input in inputs {
            let result = self.resources.close_input(input.into_inner());
            if closed.is_ok() {
                closed = result;
            }
        }
        let merged = merged?;
        closed?;
        Ok(merged)
    }

    fn merge_inputs(
        &self,
        date: &str,
        schema: &Schema,
        parts: &[Source],
        inputs: &mut [BufReader<R::Input>],
    ) -> CoreResult<TempFile> {
        let mut headers = Vec::with_capacity(inputs.len());
        let mut stats: Option<MetricStats> = None;
        for (part, input) in parts.iter().zip(inputs.iter_mut()) {
            let (header, _) = read_header(input, part.path())?;
            header.validate_for_combine(date, schema)?;
            if header.status != FileStatus::HasData {
                return Err(CoreError::integrity(
                    "combine",
                    format!("{} has no data but reached a merge step", part.path().display()),
                ));
            }
            let part_stats = header.stats()?;
            stats = Some(match stats {
                Some(s) => s.merge(&part_stats)?,
                None => part_stats,
            });
            headers.push(header);
        }
        let stats = stats.ok_or_else(|| CoreError::integrity("combine", "merge step without sources"))?;

        let mut body = self.resources.open_temp_read_write()?;
        let mut offsets = Vec::with_capacity(schema.len());
        let mut written = 0u64;
        // cursor of each input, relative to the end of its header
        let mut cursors = vec![0u64; inputs.len()];
        let last = inputs.len() - 1;
        let mut segment = Vec::new();
        for definition in schema.columns() {
            let name = definition.name();
            offsets.push(written);
            for (part, input) in inputs.iter_mut().enumerate() {
                let expected = headers[part].columns()?.get(name).map(|meta| meta.offset);
                if expected != Some(cursors[part]) {
                    return Err(CoreError::integrity(
                        "combine",
                        format!(
                            "offset mismatch in {} column {name:?}: cursor at {}, column starts at {expected:?}",
                            parts[part].path().display(),
                            cursors[part]
                        ),
                    ));
                }
                segment.clear();
                let read = input.read_until(b'\n', &mut segment)?;
                if segment.pop() != Some(b'\n') {
                    return Err(CoreError::integrity(
                        "combine",
                        format!(
                            "column {name:?} of {} is not newline-terminated",
                            parts[part].path().display()
                        ),
                    ));
                }
                cursors[part] += read as u64;
                body.write_all(&segment)?;
                body.write_all(if part == last { b"\n" } else { b"," })?;
                written += segment.len() as u64 + 1;
            }
        }

        for (part, input) in inputs.iter_mut().enumerate() {
            let mut probe = [0u8; 1];
            if input.read(&mut probe)? != 0 {
                return Err(CoreError::integrity(
                    "combine",
                    format!(
                        "trailing bytes after the last column of {}",
                        parts[part].path().display()
                    ),
                ));
            }
        }
        body.flush()?;
        let len = body.len()?;
        if len != written {
            return Err(CoreError::integrity(
                "combine",
                format!("staged {len} bytes but merged columns add up to {written}"),
            ));
        }

        let header = FileHeader::has_data(date, schema, stats, &offsets)?;
        let mut staged = self.resources.open_temp_read_write()?;
        staged.write_all(header.to_line()?.as_bytes())?;
        io::copy(&mut body.reopen()?, &mut staged)?;
        staged.flush()?;
        self.resources.close_and_delete(body)?;
        tracing::debug!(sources = inputs.len(), rows = stats.count, "merge step finished");
        Ok(staged)
    }
}

fn read_header<I: BufRead>(input: &mut I, path: &Path) -> CoreResult<(FileHeader, u64)> {
    FileHeader::read_from(input)?.ok_or_else(|| CoreError::EmptyOrInvalidFile {
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Number;
    use crate::reader::{QueryRequest, Reader};
    use crate::writer::{WriteOptions, WriteRequest, Writer};
    use strata_codec::{DataType, Value};
    use tempfile::{tempdir, TempDir};

    const DATE: &str = "2024-03-01";

    struct Fixture {
        data: TempDir,
        tmp: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                data: tempdir().unwrap(),
                tmp: tempdir().unwrap(),
            }
        }

        fn config(&self) -> Config {
            Config::new().tmp_dir(self.tmp.path())
        }

        fn path(&self, name: &str) -> PathBuf {
            self.data.path().join(name)
        }

        fn write(&self, name: &str, rows: &[(i64, &str)]) -> PathBuf {
            let path = self.path(name);
            let request = WriteRequest {
                date: DATE.into(),
                metric: metric(),
                dimensions: dimensions(),
                headers: vec!["m".into(), "d".into()],
                rows: rows
                    .iter()
                    .map(|(m, d)| vec![Value::Int(*m), Value::from(*d)])
                    .collect(),
            };
            Writer::new(self.config())
                .unwrap()
                .write(request, &path, WriteOptions::default())
                .unwrap();
            path
        }

        fn combine(&self, sources: PartialSources, output: &str) -> CoreResult<WriteSummary> {
            self.combine_with(self.config(), sources, output)
        }

        fn combine_with(&self, config: Config, sources: PartialSources, output: &str) -> CoreResult<WriteSummary> {
            Combiner::new(config).unwrap().combine(
                request(),
                &sources,
                &self.path(output),
                CombineOptions::default(),
            )
        }

        fn totals(&self, name: &str) -> (Option<Number>, Option<u64>) {
            let header = Reader::new(self.config())
                .unwrap()
                .file_metadata(&self.path(name))
                .unwrap();
            (header.sum, header.count)
        }

        fn tmp_is_empty(&self) -> bool {
            std::fs::read_dir(self.tmp.path()).unwrap().next().is_none()
        }
    }

    fn metric() -> ColumnDefinition {
        ColumnDefinition::metric("m", DataType::Int, 0).unwrap()
    }

    fn dimensions() -> Vec<ColumnDefinition> {
        vec![ColumnDefinition::dimension("d", DataType::String, "").unwrap()]
    }

    fn request() -> CombineRequest {
        CombineRequest {
            date: DATE.into(),
            metric: metric(),
            dimensions: dimensions(),
        }
    }

    fn column_values(fixture: &Fixture, name: &str) -> Vec<Vec<Value>> {
        let mut reader = Reader::new(fixture.config()).unwrap();
        reader
            .run(&QueryRequest {
                date: DATE.into(),
                metric: "m".into(),
                dimensions: vec!["d".into()],
                constraints: Default::default(),
                do_aggregate: false,
                do_aggregate_meta: false,
                file: fixture.path(name),
            })
            .unwrap();
        reader.results().iter().map(|row| row[1..].to_vec()).collect()
    }

    #[test]
    fn concatenates_sources_in_order() {
        let fx = Fixture::new();
        let a = fx.write("a", &[(1, "x"), (2, "x"), (3, "x")]);
        let b = fx.write("b", &[(4, "y, z")]);
        let summary = fx.combine(PartialSources::Files(vec![a.clone(), b]), "out").unwrap();

        assert_eq!(summary.status, FileStatus::HasData);
        assert_eq!(fx.totals("out"), (Some(Number::Int(10)), Some(4)));
        let rows = column_values(&fx, "out");
        let dims: Vec<&Value> = rows.iter().map(|r| &r[0]).collect();
        assert_eq!(dims, [&Value::from("x"), &Value::from("x"), &Value::from("x"), &Value::from("y, z")]);
        assert!(a.exists());
        assert!(fx.tmp_is_empty());
    }

    #[test]
    fn chunked_rounds_match_a_single_merge() {
        let fx = Fixture::new();
        let sources: Vec<PathBuf> = (0..7)
            .map(|i| fx.write(&format!("s{i}"), &[(i, "x"), (10 * i, "y")]))
            .collect();

        fx.combine(PartialSources::Files(sources.clone()), "direct").unwrap();
        fx.combine_with(fx.config().combine_chunk_size(2), PartialSources::Files(sources), "chunked")
            .unwrap();

        let direct = std::fs::read(fx.path("direct")).unwrap();
        let chunked = std::fs::read(fx.path("chunked")).unwrap();
        assert_eq!(direct, chunked);
        assert_eq!(fx.totals("direct"), (Some(Number::Int(231)), Some(14)));
        assert!(fx.tmp_is_empty());
    }

    #[test]
    fn no_data_sources_are_skipped() {
        let fx = Fixture::new();
        let empty = fx.write("empty", &[]);
        let full = fx.write("full", &[(5, "x")]);
        fx.combine(PartialSources::Files(vec![empty.clone(), full]), "out").unwrap();
        assert_eq!(fx.totals("out"), (Some(Number::Int(5)), Some(1)));

        let summary = fx.combine(PartialSources::Files(vec![empty]), "none").unwrap();
        assert_eq!(summary.status, FileStatus::NoData);
        assert_eq!(fx.totals("none"), (None, None));
    }

    #[test]
    fn schema_mismatch_names_the_column() {
        let fx = Fixture::new();
        let a = fx.write("a", &[(1, "x")]);
        let other = fx.path("other");
        Writer::new(fx.config())
            .unwrap()
            .write(
                WriteRequest {
                    date: DATE.into(),
                    metric: metric(),
                    dimensions: vec![ColumnDefinition::dimension("d", DataType::String, "n/a").unwrap()],
                    headers: vec!["m".into(), "d".into()],
                    rows: vec![vec![Value::Int(1), Value::from("x")]],
                },
                &other,
                WriteOptions::default(),
            )
            .unwrap();

        let err = fx.combine(PartialSources::Files(vec![a, other]), "out").unwrap_err();
        assert!(matches!(&err, CoreError::SchemaMismatch { message } if message.contains("\"d\"")));
        assert!(!fx.path("out").exists());
    }

    #[test]
    fn invalid_source_lists_are_rejected() {
        let fx = Fixture::new();
        let a = fx.write("a", &[(1, "x")]);
        assert!(fx.combine(PartialSources::Files(vec![]), "out").is_err());
        assert!(fx.combine(PartialSources::Files(vec![a.clone(), a.clone()]), "out").is_err());
        assert!(fx
            .combine_with(fx.config().combine_chunk_size(1), PartialSources::Files(vec![a]), "out")
            .is_err());
        assert!(fx
            .combine(PartialSources::Files(vec![fx.path("missing")]), "out")
            .is_err());
    }

    #[test]
    fn offset_mismatch_is_detected() {
        let fx = Fixture::new();
        let a = fx.write("a", &[(1, "x"), (2, "y")]);
        let content = std::fs::read_to_string(&a).unwrap();
        let (line, body) = content.split_once('\n').unwrap();
        let mut header = FileHeader::parse(line).unwrap();
        header.column_meta.as_mut().unwrap().get_mut("m").unwrap().offset += 1;
        let broken = fx.path("broken");
        std::fs::write(&broken, format!("{}{body}", header.to_line().unwrap())).unwrap();

        let err = fx.combine(PartialSources::Files(vec![broken]), "out").unwrap_err();
        assert!(matches!(err, CoreError::Integrity { .. }));
        assert!(fx.tmp_is_empty());
    }

    #[test]
    fn trailing_bytes_are_detected() {
        let fx = Fixture::new();
        let a = fx.write("a", &[(1, "x")]);
        let mut content = std::fs::read(&a).unwrap();
        content.extend_from_slice(b"junk\n");
        let padded = fx.path("padded");
        std::fs::write(&padded, content).unwrap();

        let err = fx.combine(PartialSources::Files(vec![padded]), "out").unwrap_err();
        assert!(matches!(err, CoreError::Integrity { .. }));
    }

    #[test]
    fn zip_entries_are_sources() {
        let fx = Fixture::new();
        let a = fx.write("a", &[(1, "x")]);
        let b = fx.write("b", &[(2, "y")]);
        let archive = fx.path("parts.zip");
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&archive).unwrap());
        for (name, path) in [("a.strata", &a), ("b.strata", &b)] {
            zip.start_file(name, zip::write::SimpleFileOptions::default()).unwrap();
            zip.write_all(&std::fs::read(path).unwrap()).unwrap();
        }
        zip.finish().unwrap();

        fx.combine(PartialSources::Zip(archive), "from_zip").unwrap();
        fx.combine(PartialSources::Files(vec![a, b]), "from_files").unwrap();
        assert_eq!(
            std::fs::read(fx.path("from_zip")).unwrap(),
            std::fs::read(fx.path("from_files")).unwrap()
        );
        assert!(fx.tmp_is_empty());
    }

    #[test]
    fn empty_zip_is_rejected() {
        let fx = Fixture::new();
        let archive = fx.path("empty.zip");
        zip::ZipWriter::new(std::fs::File::create(&archive).unwrap())
            .finish()
            .unwrap();
        assert!(fx.combine(PartialSources::Zip(archive), "out").is_err());
    }
}
