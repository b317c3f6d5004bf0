//! JSONL-based journal store.
//!
//! Every state change is one line: a `pending` entry when a point is
//! emitted and a `resolved` entry when its integral completes. Replaying
//! the file rebuilds the store; a point with a resolved entry is never
//! integrated again, which is what makes a restarted run resume at the
//! generation level.
//!
//! ```text
//! {"kind":"pending","point":{"id":0,"params":[1.41,1.27],"generation":0,"parent":null}}
//! {"kind":"resolved","id":0,"result":{"status":"converged","log_evidence":-3.2,...}}
//! ```

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::memory::{check_resolvable, next_id_after};
use super::{GridStore, MemoryStore};
use crate::error::{Error, Result};
use crate::point::{GridRecord, IntegralResult, IntrinsicPoint, PointId};

/// One line of the journal.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum JournalEntry {
    Pending { point: IntrinsicPoint },
    Resolved { id: PointId, result: IntegralResult },
}

/// A grid store that appends every change as a JSON line to a file.
///
/// Records are kept in memory for fast reads and persisted as they
/// change. Several processes can share one file: writes take an exclusive
/// file lock, reads a shared one.
///
/// # Examples
///
/// ```no_run
/// use rapid_pe::store::JournalStore;
///
/// // Loads whatever a previous run left behind.
/// let store = JournalStore::open("event-grid.jsonl").unwrap();
/// ```
pub struct JournalStore {
    memory: MemoryStore,
    path: PathBuf,
    /// Serialises in-process writes so the file lock is held briefly.
    write_lock: Mutex<()>,
}

impl JournalStore {
    /// Creates a journal store writing to `path`.
    ///
    /// The file is created on the first write. Existing entries are not
    /// loaded until [`refresh`](GridStore::refresh) is called; use
    /// [`JournalStore::open`] to load them up front.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            memory: MemoryStore::new(),
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Opens a journal file and replays every entry.
    ///
    /// A missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` if the file exists but cannot be read or
    /// parsed, or refers to a point it never declared.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = load_records_from_file(&path)?;
        Ok(Self {
            memory: MemoryStore::with_records(records),
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// The journal file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, entry: &JournalEntry) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(storage)?;

        file.lock_exclusive().map_err(storage)?;

        let line = serde_json::to_string(entry).map_err(storage)?;
        writeln!(file, "{line}").map_err(storage)?;
        file.flush().map_err(storage)?;

        file.unlock().map_err(storage)?;
        Ok(())
    }
}

impl GridStore for JournalStore {
    fn insert(&self, point: IntrinsicPoint) -> Result<bool> {
        let _guard = self.write_lock.lock();
        if self.memory.contains(point.id) {
            return Ok(false);
        }
        self.append(&JournalEntry::Pending {
            point: point.clone(),
        })?;
        self.memory.insert(point)
    }

    fn resolve(&self, id: PointId, result: IntegralResult) -> Result<bool> {
        check_resolvable(&result)?;
        let _guard = self.write_lock.lock();
        if self.memory.is_resolved(id)? {
            return Ok(false);
        }
        self.append(&JournalEntry::Resolved {
            id,
            result: result.clone(),
        })?;
        self.memory.resolve(id, result)
    }

    fn records_arc(&self) -> &Arc<RwLock<Vec<GridRecord>>> {
        self.memory.records_arc()
    }

    fn next_point_id(&self) -> PointId {
        self.memory.next_point_id()
    }

    fn peek_next_point_id(&self) -> PointId {
        self.memory.peek_next_point_id()
    }

    fn refresh(&self) -> bool {
        let Ok(loaded) = load_records_from_file(&self.path) else {
            return false;
        };
        let _guard = self.write_lock.lock();
        let mut records = self.memory.records_arc().write();
        if progress(&loaded) > progress(&records) {
            self.memory.bump_next_id(next_id_after(&loaded));
            *records = loaded;
            true
        } else {
            false
        }
    }
}

/// `(points, resolved points)`; compared lexicographically.
fn progress(records: &[GridRecord]) -> (usize, usize) {
    let resolved = records
        .iter()
        .filter(|r| r.status().is_resolved())
        .count();
    (records.len(), resolved)
}

#[allow(clippy::needless_pass_by_value)]
fn storage(e: impl ToString) -> Error {
    Error::Storage(e.to_string())
}

/// Replays a journal file. Returns an empty vec if the file does not exist.
fn load_records_from_file(path: &Path) -> Result<Vec<GridRecord>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(storage(e)),
    };

    file.lock_shared().map_err(storage)?;

    let reader = BufReader::new(&file);
    let mut records: Vec<GridRecord> = Vec::new();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(storage)?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry: JournalEntry = serde_json::from_str(line)
            .map_err(|e| storage(format!("line {}: {e}", lineno + 1)))?;
        match entry {
            JournalEntry::Pending { point } => {
                if !records.iter().any(|r| r.point.id == point.id) {
                    records.push(GridRecord::pending(point));
                }
            }
            JournalEntry::Resolved { id, result } => {
                let record = records
                    .iter_mut()
                    .find(|r| r.point.id == id)
                    .ok_or_else(|| {
                        storage(format!("line {}: result for undeclared point {id}", lineno + 1))
                    })?;
                if !record.status().is_resolved() {
                    record.result = result;
                }
            }
        }
    }

    file.unlock().map_err(storage)?;

    Ok(records)
}
