//! k-way merge with unique semantics over pre-sorted line files.
//!
//! Every input must already be sorted ascending by the raw bytes of each
//! line (terminator excluded, as `LC_ALL=C sort` orders them) and free of
//! duplicate lines. Output lines always end in `\n`. The engine keeps one line buffer per input and never
//! loads a whole file. Unsorted input is not detected unless
//! [`MergeEngine::verify_sorted`] is enabled, in which case the merge fails
//! on the first out-of-order line.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::EdgeError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub inputs: usize,
    pub lines_read: u64,
    pub lines_written: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MergeEngine {
    verify: bool,
}

struct Input {
    path: Utf8PathBuf,
    reader: BufReader<File>,
    line_no: u64,
    last: Option<Vec<u8>>,
}

impl Input {
    fn open(path: &Utf8Path) -> Result<Self, EdgeError> {
        let file = File::open(path.as_std_path())
            .map_err(|err| EdgeError::MergeIo(format!("open {path}: {err}")))?;
        Ok(Self {
            path: path.to_owned(),
            reader: BufReader::new(file),
            line_no: 0,
            last: None,
        })
    }

    /// Next line body, terminator stripped.
    fn next_line(&mut self, verify: bool) -> Result<Option<Vec<u8>>, EdgeError> {
        let mut line = Vec::new();
        let read = self
            .reader
            .read_until(b'\n', &mut line)
            .map_err(|err| EdgeError::MergeIo(format!("read {}: {err}", self.path)))?;
        if read == 0 {
            return Ok(None);
        }
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        self.line_no += 1;
        if verify {
            if let Some(previous) = &self.last {
                if line < *previous {
                    return Err(EdgeError::MergeIo(format!(
                        "{} is not sorted at line {}",
                        self.path, self.line_no
                    )));
                }
            }
            self.last = Some(line.clone());
        }
        Ok(Some(line))
    }
}

impl MergeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verify_sorted(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Merges `inputs` into `output`.
    ///
    /// The output is staged in a temporary file next to the destination and
    /// only renamed into place once every input has been drained, so a
    /// failed merge never leaves a truncated dataset behind.
    pub fn merge<P: AsRef<Utf8Path>>(
        &self,
        inputs: &[P],
        output: &Utf8Path,
    ) -> Result<MergeStats, EdgeError> {
        let parent = match output.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.to_owned(),
            _ => Utf8PathBuf::from("."),
        };
        std::fs::create_dir_all(parent.as_std_path())
            .map_err(|err| EdgeError::MergeIo(format!("create {parent}: {err}")))?;

        let mut readers = inputs
            .iter()
            .map(|path| Input::open(path.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let staged = tempfile::Builder::new()
            .prefix(".kira-edges-merge")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| EdgeError::MergeIo(format!("stage output in {parent}: {err}")))?;
        let mut writer = BufWriter::new(staged.as_file());

        let mut stats = MergeStats {
            inputs: readers.len(),
            ..MergeStats::default()
        };
        let mut heap = BinaryHeap::with_capacity(readers.len());
        for (idx, reader) in readers.iter_mut().enumerate() {
            if let Some(line) = reader.next_line(self.verify)? {
                stats.lines_read += 1;
                heap.push(Reverse((line, idx)));
            }
        }

        let mut last_written: Option<Vec<u8>> = None;
        while let Some(Reverse((line, idx))) = heap.pop() {
            if let Some(next) = readers[idx].next_line(self.verify)? {
                stats.lines_read += 1;
                heap.push(Reverse((next, idx)));
            }
            if last_written.as_deref() == Some(line.as_slice()) {
                continue;
            }
            writer
                .write_all(&line)
                .and_then(|_| writer.write_all(b"\n"))
                .map_err(|err| EdgeError::MergeIo(format!("write {output}: {err}")))?;
            stats.lines_written += 1;
            last_written = Some(line);
        }

        writer
            .flush()
            .map_err(|err| EdgeError::MergeIo(format!("flush {output}: {err}")))?;
        drop(writer);
        staged
            .persist(output.as_std_path())
            .map_err(|err| EdgeError::MergeIo(format!("persist {output}: {}", err.error)))?;

        debug!(
            inputs = stats.inputs,
            lines_read = stats.lines_read,
            "merge inputs drained"
        );
        info!(
            output = %output,
            lines = stats.lines_written,
            "merged dataset written"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn write(dir: &Utf8Path, name: &str, content: &str) -> Utf8PathBuf {
        let path = dir.join(name);
        std::fs::write(path.as_std_path(), content).unwrap();
        path
    }

    fn temp_dir() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        (temp, root)
    }

    #[test]
    fn collapses_shared_lines() {
        let (_temp, dir) = temp_dir();
        let a = write(&dir, "a.tsv", "a\tb\nc\td\n");
        let b = write(&dir, "b.tsv", "a\tb\ne\tf\n");
        let out = dir.join("out.tsv");

        let stats = MergeEngine::new().merge(&[a, b], &out).unwrap();
        let merged = std::fs::read_to_string(out.as_std_path()).unwrap();
        assert_eq!(merged, "a\tb\nc\td\ne\tf\n");
        assert_eq!(stats.lines_read, 4);
        assert_eq!(stats.lines_written, 3);
    }

    #[test]
    fn missing_final_newline_is_normalized() {
        let (_temp, dir) = temp_dir();
        let a = write(&dir, "a.tsv", "x\ny");
        let b = write(&dir, "b.tsv", "y\n");
        let out = dir.join("out.tsv");
        MergeEngine::new().merge(&[a, b], &out).unwrap();
        assert_eq!(std::fs::read_to_string(out.as_std_path()).unwrap(), "x\ny\n");
    }

    #[test]
    fn no_inputs_yield_empty_file() {
        let (_temp, dir) = temp_dir();
        let out = dir.join("out.tsv");
        let inputs: Vec<Utf8PathBuf> = Vec::new();
        let stats = MergeEngine::new().merge(&inputs, &out).unwrap();
        assert_eq!(stats.lines_written, 0);
        assert_eq!(std::fs::read(out.as_std_path()).unwrap(), b"");
    }

    #[test]
    fn verification_rejects_unsorted_input() {
        let (_temp, dir) = temp_dir();
        let a = write(&dir, "a.tsv", "b\na\n");
        let out = dir.join("out.tsv");
        let err = MergeEngine::new()
            .verify_sorted(true)
            .merge(&[a], &out)
            .unwrap_err();
        assert_matches!(err, EdgeError::MergeIo(message) if message.contains("line 2"));
        assert!(!out.as_std_path().exists());
    }

    #[test]
    fn missing_input_is_merge_error() {
        let (_temp, dir) = temp_dir();
        let out = dir.join("out.tsv");
        let err = MergeEngine::new()
            .merge(&[dir.join("absent.tsv")], &out)
            .unwrap_err();
        assert_matches!(err, EdgeError::MergeIo(_));
    }
}
