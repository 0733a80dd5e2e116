//! Append-only JSON-lines journal recording committed entries and recency.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::errors::{CacheError, CacheResult};

/// Journal file name inside the cache directory.
pub(super) const JOURNAL_FILE: &str = "journal.jsonl";

const JOURNAL_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(super) enum JournalRecord {
    Header { version: u32 },
    Insert { name: String, sequence: u64, size: u64 },
    Read { name: String, sequence: u64 },
    Remove { name: String },
}

/// Size and recency of one committed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct JournalEntry {
    pub size: u64,
    pub sequence: u64,
}

/// State reconstructed from a journal.
#[derive(Debug, Default)]
pub(super) struct Replayed {
    pub entries: HashMap<String, JournalEntry>,
    pub records: usize,
    pub next_sequence: u64,
}

/// Reads the journal at `path`.
///
/// Returns `Ok(None)` when there is no journal yet. Any malformed line, a
/// missing header or an unknown version is reported as [`CacheError::Journal`]
/// so the caller can rebuild from the files on disk.
pub(super) fn replay(path: &Path) -> CacheResult<Option<Replayed>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut replayed = Replayed::default();
    let mut lines = BufReader::new(file).lines();

    match lines.next().transpose()? {
        Some(line) => match serde_json::from_str(&line) {
            Ok(JournalRecord::Header { version }) if version == JOURNAL_VERSION => {}
            _ => return Err(CacheError::journal("missing or unsupported header")),
        },
        None => return Err(CacheError::journal("empty journal")),
    }

    for (index, line) in lines.enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let record: JournalRecord = serde_json::from_str(&line)
            .map_err(|e| CacheError::journal(format!("line {}: {e}", index + 2)))?;
        replayed.records += 1;
        match record {
            JournalRecord::Header { .. } => {
                return Err(CacheError::journal("unexpected header"));
            }
            JournalRecord::Insert {
                name,
                sequence,
                size,
            } => {
                replayed.next_sequence = replayed.next_sequence.max(sequence + 1);
                replayed
                    .entries
                    .insert(name, JournalEntry { size, sequence });
            }
            JournalRecord::Read { name, sequence } => {
                replayed.next_sequence = replayed.next_sequence.max(sequence + 1);
                if let Some(entry) = replayed.entries.get_mut(&name) {
                    entry.sequence = sequence;
                }
            }
            JournalRecord::Remove { name } => {
                replayed.entries.remove(&name);
            }
        }
    }

    Ok(Some(replayed))
}

/// Append handle on the journal file.
#[derive(Debug)]
pub(super) struct Journal {
    path: PathBuf,
    file: File,
    records: usize,
}

impl Journal {
    /// Opens an existing journal for appending.
    pub(super) fn open(path: PathBuf, records: usize) -> CacheResult<Self> {
        let file = OpenOptions::new().append(true).open(&path)?;
        Ok(Self {
            path,
            file,
            records,
        })
    }

    /// Atomically replaces the journal with one insert record per entry, in
    /// recency order, and reopens it for appending.
    pub(super) fn rewrite<'a>(
        path: PathBuf,
        entries: impl IntoIterator<Item = (&'a String, &'a JournalEntry)>,
    ) -> CacheResult<Self> {
        let tmp = path.with_extension("jsonl.tmp");
        let mut records = 0;
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            write_record(
                &mut writer,
                &JournalRecord::Header {
                    version: JOURNAL_VERSION,
                },
            )?;
            let mut sorted: Vec<_> = entries.into_iter().collect();
            sorted.sort_by_key(|(_, entry)| entry.sequence);
            for (name, entry) in sorted {
                write_record(
                    &mut writer,
                    &JournalRecord::Insert {
                        name: name.clone(),
                        sequence: entry.sequence,
                        size: entry.size,
                    },
                )?;
                records += 1;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Self::open(path, records)
    }

    /// Appends one record.
    pub(super) fn append(&mut self, record: &JournalRecord) -> CacheResult<()> {
        write_record(&mut self.file, record)?;
        self.records += 1;
        Ok(())
    }

    /// Number of records after the header.
    pub(super) fn records(&self) -> usize {
        self.records
    }

    pub(super) fn path(&self) -> &Path {
        &self.path
    }
}

fn write_record(writer: &mut impl Write, record: &JournalRecord) -> CacheResult<()> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    writer.write_all(line.as_bytes())?;
    Ok(())
}
