//! Append-only JSON-lines implementation of `EventLog`.
//!
//! One `AuditEvent` per line, in commit order. The file is the only
//! persisted state: the line offsets and the id/hash indexes are rebuilt
//! when the log is opened.
//!
//! Durability rules:
//! - An append writes the whole line, flushes, and optionally `fsync`s
//!   before the row is indexed and becomes visible to readers.
//! - A failed append truncates the file back to its previous length. If
//!   that truncation fails too, the log refuses further writes until it is
//!   reopened.
//! - On a read-write open, a trailing line without a newline is repaired.
//!   If it decodes to an event whose hash matches its fields, only the
//!   newline was lost and it is added back. Anything else is a torn write
//!   from a crash and is truncated away.
//! - A read-only open never creates, truncates or writes the file. An
//!   unterminated trailing line keeps its position and reads as
//!   `CorruptRecord`.

use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard},
};

use tracing::{error, info, warn};

use chainlog_contracts::{
    error::{ChainlogError, ChainlogResult},
    event::{AuditEvent, CommittedEvent, EventId},
};
use chainlog_core::{
    chain::verify_event_hash,
    traits::{EventLog, EventStream},
};

// ── Internal state ────────────────────────────────────────────────────────────

#[derive(Default)]
struct LineIndex {
    /// Byte offset of the start of each row.
    offsets: Vec<u64>,
    /// Byte length of the committed part of the file.
    end: u64,
    by_id: HashMap<EventId, u64>,
    by_hash: HashMap<String, u64>,
}

/// Bytes after the last newline.
struct UnterminatedTail {
    offset: u64,
    text: String,
}

struct Writer {
    file: File,
    /// Set when a failed append could not be rolled back.
    poisoned: bool,
}

// ── Public log ────────────────────────────────────────────────────────────────

/// A durable, append-only row log stored as JSON lines.
pub struct JsonlEventLog {
    path: PathBuf,
    sync_on_append: bool,
    /// `None` when the log was opened read-only.
    writer: Option<Mutex<Writer>>,
    index: RwLock<LineIndex>,
}

impl JsonlEventLog {
    /// Open (or create) the log at `path` for appending.
    ///
    /// Rebuilds the in-memory index by reading every line once. Rows that
    /// fail to decode keep their position and are reported as
    /// `CorruptRecord` when read; they are never dropped.
    pub fn open(path: impl AsRef<Path>, sync_on_append: bool) -> ChainlogResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| io_error(&path, "create directory", e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .map_err(|e| io_error(&path, "open", e))?;

        let (mut index, tail) = build_index(&path)?;
        if let Some(tail) = tail {
            repair_tail(&path, &mut file, &mut index, tail, sync_on_append)?;
        }

        info!(
            path = %path.display(),
            rows = index.offsets.len(),
            "jsonl event log opened"
        );

        Ok(Self {
            path,
            sync_on_append,
            writer: Some(Mutex::new(Writer { file, poisoned: false })),
            index: RwLock::new(index),
        })
    }

    /// Open an existing log for reading only.
    ///
    /// Fails with `NotFound` when `path` does not exist. Appends fail with
    /// `Storage`.
    pub fn open_read_only(path: impl AsRef<Path>) -> ChainlogResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(ChainlogError::not_found(format!("chain log {}", path.display())));
        }

        let (mut index, tail) = build_index(&path)?;
        if let Some(tail) = tail {
            warn!(
                path = %path.display(),
                position = index.offsets.len(),
                bytes = tail.text.len(),
                "unterminated trailing row left in place"
            );
            index.offsets.push(tail.offset);
        }

        info!(
            path = %path.display(),
            rows = index.offsets.len(),
            "jsonl event log opened read-only"
        );

        Ok(Self {
            path,
            sync_on_append: false,
            writer: None,
            index: RwLock::new(index),
        })
    }

    pub fn is_read_only(&self) -> bool {
        self.writer.is_none()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_index(&self) -> ChainlogResult<RwLockReadGuard<'_, LineIndex>> {
        self.index
            .read()
            .map_err(|e| ChainlogError::storage(format!("jsonl index lock poisoned: {}", e)))
    }

    fn lock_writer(&self) -> ChainlogResult<MutexGuard<'_, Writer>> {
        let writer = self.writer.as_ref().ok_or_else(|| {
            ChainlogError::storage(format!("{} is open read-only", self.path.display()))
        })?;
        writer
            .lock()
            .map_err(|e| ChainlogError::storage(format!("jsonl writer lock poisoned: {}", e)))
    }

    /// Open a fresh read handle positioned at byte `offset`.
    fn reader_at(&self, offset: u64) -> ChainlogResult<BufReader<File>> {
        let mut file = File::open(&self.path).map_err(|e| io_error(&self.path, "open for read", e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| io_error(&self.path, "seek", e))?;
        Ok(BufReader::new(file))
    }
}

impl EventLog for JsonlEventLog {
    fn len(&self) -> ChainlogResult<u64> {
        Ok(self.read_index()?.offsets.len() as u64)
    }

    fn append(&self, event: &AuditEvent) -> ChainlogResult<u64> {
        let mut line = serde_json::to_string(event)
            .map_err(|e| ChainlogError::storage(format!("failed to encode event {}: {}", event.id, e)))?;
        line.push('\n');

        let mut writer = self.lock_writer()?;
        if writer.poisoned {
            return Err(ChainlogError::storage(format!(
                "{} is in an unknown state after a failed rollback; reopen the log",
                self.path.display()
            )));
        }

        let start = self.read_index()?.end;
        if let Err(e) = write_line(&mut writer.file, line.as_bytes(), self.sync_on_append) {
            if let Err(rollback) = writer.file.set_len(start) {
                writer.poisoned = true;
                error!(
                    path = %self.path.display(),
                    error = %rollback,
                    "rollback after failed append failed; log refuses further writes"
                );
            }
            return Err(io_error(&self.path, "append", e));
        }

        let mut index = self
            .index
            .write()
            .map_err(|e| ChainlogError::storage(format!("jsonl index lock poisoned: {}", e)))?;
        let position = index.offsets.len() as u64;
        index.offsets.push(start);
        index.end = start + line.len() as u64;
        index.by_id.insert(event.id, position);
        index.by_hash.insert(event.event_hash.clone(), position);

        Ok(position)
    }

    fn read(&self, position: u64) -> ChainlogResult<Option<AuditEvent>> {
        let offset = match self.read_index()?.offsets.get(position as usize) {
            Some(offset) => *offset,
            None => return Ok(None),
        };
        let mut reader = self.reader_at(offset)?;
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .map_err(|e| io_error(&self.path, "read", e))?;
        decode_row(position, &line).map(Some)
    }

    /// Streams rows with one open file handle and one line buffer, so memory
    /// stays constant regardless of range size.
    fn scan(&self, from: u64, to: u64) -> EventStream<'_> {
        let (start_offset, end) = match self.read_index() {
            Ok(index) => {
                let end = to.min(index.offsets.len() as u64);
                match index.offsets.get(from as usize) {
                    Some(offset) if from < end => (*offset, end),
                    _ => return Box::new(std::iter::empty()),
                }
            }
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };

        match self.reader_at(start_offset) {
            Ok(reader) => Box::new(JsonlScan {
                reader,
                line: String::new(),
                position: from,
                end,
                path: self.path.clone(),
                done: false,
            }),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn position_of_id(&self, id: &EventId) -> ChainlogResult<Option<u64>> {
        Ok(self.read_index()?.by_id.get(id).copied())
    }

    fn position_of_hash(&self, hash: &str) -> ChainlogResult<Option<u64>> {
        Ok(self.read_index()?.by_hash.get(hash).copied())
    }
}

// ── Streaming reader ──────────────────────────────────────────────────────────

struct JsonlScan {
    reader: BufReader<File>,
    line: String,
    position: u64,
    end: u64,
    path: PathBuf,
    done: bool,
}

impl Iterator for JsonlScan {
    type Item = ChainlogResult<CommittedEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.position >= self.end {
            return None;
        }

        self.line.clear();
        let position = self.position;
        match self.reader.read_line(&mut self.line) {
            Ok(0) => {
                self.done = true;
                Some(Err(ChainlogError::CorruptRecord {
                    position,
                    reason: format!("{} ended before this row", self.path.display()),
                }))
            }
            Ok(_) => {
                self.position += 1;
                Some(decode_row(position, &self.line).map(|event| CommittedEvent { position, event }))
            }
            Err(e) => {
                self.done = true;
                Some(Err(io_error(&self.path, "read", e)))
            }
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn write_line(file: &mut File, bytes: &[u8], sync: bool) -> std::io::Result<()> {
    file.write_all(bytes)?;
    file.flush()?;
    if sync {
        file.sync_data()?;
    }
    Ok(())
}

fn decode_line(position: u64, line: &str) -> ChainlogResult<AuditEvent> {
    serde_json::from_str(line.trim_end_matches(['\n', '\r'])).map_err(|e| {
        ChainlogError::CorruptRecord {
            position,
            reason: e.to_string(),
        }
    })
}

/// Decode a row read back from the file. A row must end in a newline.
fn decode_row(position: u64, line: &str) -> ChainlogResult<AuditEvent> {
    if !line.ends_with('\n') {
        return Err(ChainlogError::CorruptRecord {
            position,
            reason: "row is not newline-terminated".to_string(),
        });
    }
    decode_line(position, line)
}

/// Make the trailing line of a writable log whole again.
///
/// A tail that decodes and hashes correctly is a committed row that lost
/// its newline. Anything else is cut back to the last complete row.
fn repair_tail(
    path: &Path,
    file: &mut File,
    index: &mut LineIndex,
    tail: UnterminatedTail,
    sync: bool,
) -> ChainlogResult<()> {
    let position = index.offsets.len() as u64;
    match decode_line(position, &tail.text) {
        Ok(event) if verify_event_hash(&event) => {
            warn!(
                path = %path.display(),
                position,
                "terminating complete row that lost its newline"
            );
            write_line(file, b"\n", sync).map_err(|e| io_error(path, "terminate trailing row", e))?;
            index.offsets.push(tail.offset);
            index.end = tail.offset + tail.text.len() as u64 + 1;
            index.by_id.insert(event.id, position);
            index.by_hash.insert(event.event_hash, position);
        }
        _ => {
            warn!(
                path = %path.display(),
                torn_bytes = tail.text.len(),
                committed_bytes = index.end,
                "truncating torn trailing write"
            );
            file.set_len(index.end)
                .map_err(|e| io_error(path, "truncate torn write", e))?;
        }
    }
    Ok(())
}

/// Read the file once and index every complete line.
///
/// Returns the index and the unterminated trailing line, if any.
fn build_index(path: &Path) -> ChainlogResult<(LineIndex, Option<UnterminatedTail>)> {
    let file = File::open(path).map_err(|e| io_error(path, "open for indexing", e))?;
    let mut reader = BufReader::new(file);
    let mut index = LineIndex::default();
    let mut line = String::new();
    let mut offset = 0u64;

    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|e| io_error(path, "read while indexing", e))? as u64;
        if read == 0 {
            return Ok((index, None));
        }
        if !line.ends_with('\n') {
            let tail = UnterminatedTail {
                offset,
                text: std::mem::take(&mut line),
            };
            return Ok((index, Some(tail)));
        }

        let position = index.offsets.len() as u64;
        index.offsets.push(offset);
        match decode_line(position, &line) {
            Ok(event) => {
                index.by_id.insert(event.id, position);
                index.by_hash.insert(event.event_hash, position);
            }
            Err(e) => {
                warn!(path = %path.display(), position, error = %e, "undecodable row kept in place");
            }
        }
        offset += read;
        index.end = offset;
    }
}

fn io_error(path: &Path, op: &str, e: std::io::Error) -> ChainlogError {
    ChainlogError::storage(format!("{} {}: {}", op, path.display(), e))
}
