use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::MultiGzDecoder;

use crate::domain::{Record, SourceKey};
use crate::error::EdgeError;
use crate::merge::MergeEngine;

/// Lazy stream of canonical records produced by an adapter.
pub type RecordStream = Box<dyn Iterator<Item = Result<Record, EdgeError>> + Send>;

/// Opens a raw download, decompressing it when the name ends in `.gz`.
pub fn open_raw(path: &Path) -> Result<Box<dyn BufRead + Send>, EdgeError> {
    let file = File::open(path)
        .map_err(|err| EdgeError::Filesystem(format!("open {}: {err}", path.display())))?;
    let is_gz = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);
    let reader: Box<dyn Read + Send> = if is_gz {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

/// Turns a raw file into records one line at a time.
///
/// `parse` sees each line without its terminator and returns `Ok(None)` for
/// lines that carry no record (headers, comments). The first failure is
/// reported with its 1-based line number and ends the stream.
pub fn line_records<F>(key: SourceKey, raw: &Path, parse: F) -> Result<RecordStream, EdgeError>
where
    F: Fn(&str) -> Result<Option<Record>, String> + Send + 'static,
{
    let reader = open_raw(raw)?;
    let mut failed = false;
    let stream = reader
        .lines()
        .enumerate()
        .map_while(move |(idx, line)| {
            if failed {
                return None;
            }
            let line_no = idx + 1;
            let result = match line {
                Ok(line) => parse(line.trim_end_matches('\r')).and_then(|record| match record {
                    Some(record) => record.validate().map(|_| Some(record)),
                    None => Ok(None),
                }),
                Err(err) => Err(err.to_string()),
            };
            match result {
                Ok(record) => Some(record.map(Ok)),
                Err(message) => {
                    failed = true;
                    Some(Some(Err(EdgeError::Normalization {
                        key: key.to_string(),
                        line: line_no,
                        message,
                    })))
                }
            }
        })
        .flatten();
    Ok(Box::new(stream))
}

/// External sort-and-dedup of a record stream into one file.
///
/// Records are buffered up to `chunk_lines`, each chunk is sorted and
/// deduplicated into a run file, and the runs are merged into `output`.
#[derive(Debug, Clone)]
pub struct SortedRecordWriter {
    chunk_lines: usize,
    work_dir: Utf8PathBuf,
}

impl SortedRecordWriter {
    pub fn new(work_dir: &Utf8Path, chunk_lines: usize) -> Self {
        Self {
            chunk_lines: chunk_lines.max(1),
            work_dir: work_dir.to_owned(),
        }
    }

    /// Returns the number of unique lines written.
    pub fn write(&self, records: RecordStream, output: &Utf8Path) -> Result<u64, EdgeError> {
        std::fs::create_dir_all(self.work_dir.as_std_path())
            .map_err(|err| EdgeError::Filesystem(err.to_string()))?;
        let runs_dir = tempfile::Builder::new()
            .prefix("kira-edges-runs")
            .tempdir_in(self.work_dir.as_std_path())
            .map_err(|err| EdgeError::Filesystem(err.to_string()))?;
        let runs_root = Utf8PathBuf::from_path_buf(runs_dir.path().to_path_buf())
            .map_err(|_| EdgeError::Filesystem("non-utf8 temp dir".to_string()))?;

        let mut runs = Vec::new();
        let mut chunk = Vec::with_capacity(self.chunk_lines.min(65_536));
        for record in records {
            chunk.push(record?.to_row());
            if chunk.len() >= self.chunk_lines {
                runs.push(flush_run(&mut chunk, &runs_root, runs.len())?);
            }
        }
        if !chunk.is_empty() || runs.is_empty() {
            runs.push(flush_run(&mut chunk, &runs_root, runs.len())?);
        }

        let stats = MergeEngine::new().merge(&runs, output)?;
        Ok(stats.lines_written)
    }
}

fn flush_run(
    chunk: &mut Vec<String>,
    dir: &Utf8Path,
    index: usize,
) -> Result<Utf8PathBuf, EdgeError> {
    // rows carry no terminator, so prefix rows sort first
    chunk.sort_unstable();
    chunk.dedup();
    let path = dir.join(format!("run-{index:05}.tsv"));
    let file = File::create(path.as_std_path())
        .map_err(|err| EdgeError::Filesystem(format!("create {path}: {err}")))?;
    let mut writer = BufWriter::new(file);
    for row in chunk.drain(..) {
        writer
            .write_all(row.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .map_err(|err| EdgeError::Filesystem(err.to_string()))?;
    }
    writer
        .flush()
        .map_err(|err| EdgeError::Filesystem(err.to_string()))?;
    Ok(path)
}
