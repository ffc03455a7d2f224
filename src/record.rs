//! One record per terminally classified machine.
//!
//! Records are written as JSON lines:
//! `{"table":"1RB1LB_1LA1RZ","category":"Halt","steps":6,"score":4}`.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::SearchError;
use crate::evaluator::{InfiniteReason, UnknownReason};
use crate::machine::TransitionTable;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category")]
pub enum Outcome {
    Halt { steps: u64, score: u64 },
    Infinite { reason: InfiniteReason },
    Unknown { reason: UnknownReason, detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub table: TransitionTable,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Record {
    pub fn new(table: TransitionTable, outcome: Outcome) -> Self {
        Self { table, outcome }
    }
}

pub trait RecordSink {
    fn write_record(&mut self, record: &Record) -> Result<(), SearchError>;

    fn flush(&mut self) -> Result<(), SearchError> {
        Ok(())
    }
}

impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    fn write_record(&mut self, record: &Record) -> Result<(), SearchError> {
        (**self).write_record(record)
    }

    fn flush(&mut self) -> Result<(), SearchError> {
        (**self).flush()
    }
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn write_record(&mut self, record: &Record) -> Result<(), SearchError> {
        (**self).write_record(record)
    }

    fn flush(&mut self) -> Result<(), SearchError> {
        (**self).flush()
    }
}

/// Lets the worker threads of a cluster share one sink.
impl<S: RecordSink> RecordSink for Arc<Mutex<S>> {
    fn write_record(&mut self, record: &Record) -> Result<(), SearchError> {
        lock(self).write_record(record)
    }

    fn flush(&mut self) -> Result<(), SearchError> {
        lock(self).flush()
    }
}

// A writer that panicked mid-record leaves at worst a torn line; keep going.
fn lock<S>(sink: &Mutex<S>) -> std::sync::MutexGuard<'_, S> {
    sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Appends records to a file, one JSON object per line.
pub struct JsonLinesSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    /// Creates `path`, refusing to clobber an existing file unless `force`.
    pub fn create(path: impl AsRef<Path>, force: bool) -> Result<Self, SearchError> {
        let path = path.as_ref().to_path_buf();
        if path.exists() && !force {
            return Err(SearchError::OutputExists(path));
        }
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Continues an existing output, as when resuming from a checkpoint.
    pub fn append(path: impl AsRef<Path>) -> Result<Self, SearchError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for JsonLinesSink {
    fn write_record(&mut self, record: &Record) -> Result<(), SearchError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SearchError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<Record>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordSink for MemorySink {
    fn write_record(&mut self, record: &Record) -> Result<(), SearchError> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// Drops records; only the counters survive.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl RecordSink for NullSink {
    fn write_record(&mut self, _record: &Record) -> Result<(), SearchError> {
        Ok(())
    }
}

/// Reads back a file written by [`JsonLinesSink`].
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<Record>, SearchError> {
    let contents = std::fs::read_to_string(path)?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(SearchError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn halt_record() -> Record {
        Record::new("1RB1LB_1LA1RZ".parse().unwrap(), Outcome::Halt { steps: 6, score: 4 })
    }

    #[test]
    fn record_json_shape() {
        let json = serde_json::to_string(&halt_record()).unwrap();
        assert_eq!(json, r#"{"table":"1RB1LB_1LA1RZ","category":"Halt","steps":6,"score":4}"#);

        let unknown = Record::new(
            "1RB---_------".parse().unwrap(),
            Outcome::Unknown {
                reason: UnknownReason::NotRun,
                detail: String::new(),
            },
        );
        let back: Record = serde_json::from_str(&serde_json::to_string(&unknown).unwrap()).unwrap();
        assert_eq!(back, unknown);
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        std::fs::write(&path, "old\n").unwrap();

        let err = JsonLinesSink::create(&path, false).err().unwrap();
        assert!(matches!(err, SearchError::OutputExists(p) if p == path));

        let mut sink = JsonLinesSink::create(&path, true).unwrap();
        sink.write_record(&halt_record()).unwrap();
        sink.flush().unwrap();
        assert_eq!(read_records(&path).unwrap(), vec![halt_record()]);
    }

    #[test]
    fn append_keeps_existing_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        for _ in 0..2 {
            let mut sink = JsonLinesSink::append(&path).unwrap();
            sink.write_record(&halt_record()).unwrap();
            sink.flush().unwrap();
        }
        assert_eq!(read_records(&path).unwrap().len(), 2);
    }

    #[test]
    fn shared_sink_collects_from_clones() {
        let shared = Arc::new(Mutex::new(MemorySink::new()));
        let mut a = Arc::clone(&shared);
        let mut b = Arc::clone(&shared);
        a.write_record(&halt_record()).unwrap();
        b.write_record(&halt_record()).unwrap();
        assert_eq!(shared.lock().unwrap().records.len(), 2);
    }
}
