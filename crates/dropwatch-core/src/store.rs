//! Persisted watcher state: the seen-set of product handles and the update
//! cursor.
//!
//! Each piece has exactly one owner at runtime (the poll scheduler owns the
//! [`SeenSet`], the command responder owns the [`Cursor`]). The only cross-task
//! read is the seen-set size, published through a [`SeenGauge`].

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Result;

/// Durable read/write contract for the two state blobs.
///
/// Saves are plain overwrites; nothing here is atomic across a crash.
pub trait StateStore: Send + Sync {
    fn load_seen(&self) -> Result<Vec<String>>;
    fn save_seen(&self, handles: &[String]) -> Result<()>;

    fn load_cursor(&self) -> Result<i64>;
    fn save_cursor(&self, cursor: i64) -> Result<()>;
}

/// JSON files on local disk: a sorted array of handles and `{"offset": N}`.
#[derive(Clone, Debug)]
pub struct FileStateStore {
    seen_path: PathBuf,
    cursor_path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CursorFileData {
    #[serde(default)]
    offset: i64,
}

impl FileStateStore {
    pub fn new(seen_path: impl Into<PathBuf>, cursor_path: impl Into<PathBuf>) -> Self {
        Self {
            seen_path: seen_path.into(),
            cursor_path: cursor_path.into(),
        }
    }
}

impl StateStore for FileStateStore {
    fn load_seen(&self) -> Result<Vec<String>> {
        if !self.seen_path.exists() {
            return Ok(Vec::new());
        }
        let txt = fs::read_to_string(&self.seen_path)?;
        Ok(serde_json::from_str(&txt)?)
    }

    fn save_seen(&self, handles: &[String]) -> Result<()> {
        write_file(&self.seen_path, &serde_json::to_string_pretty(handles)?)
    }

    fn load_cursor(&self) -> Result<i64> {
        if !self.cursor_path.exists() {
            return Ok(0);
        }
        let txt = fs::read_to_string(&self.cursor_path)?;
        let data: CursorFileData = serde_json::from_str(&txt)?;
        Ok(data.offset)
    }

    fn save_cursor(&self, cursor: i64) -> Result<()> {
        write_file(
            &self.cursor_path,
            &serde_json::to_string(&CursorFileData { offset: cursor })?,
        )
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, contents)?;
    Ok(())
}

/// Lock-free view of the seen-set size for readers on other tasks.
#[derive(Clone, Debug, Default)]
pub struct SeenGauge(Arc<AtomicUsize>);

impl SeenGauge {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    fn set(&self, n: usize) {
        self.0.store(n, Ordering::Relaxed);
    }
}

/// Handles already observed. Empty means the watcher has never completed an
/// indexing pass.
#[derive(Debug, Default)]
pub struct SeenSet {
    handles: BTreeSet<String>,
    gauge: SeenGauge,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_handles<I, S>(handles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = Self {
            handles: handles.into_iter().map(Into::into).collect(),
            gauge: SeenGauge::default(),
        };
        set.gauge.set(set.handles.len());
        set
    }

    /// Load from the store. A blob that cannot be read is logged and treated as
    /// empty: the next pass then re-indexes silently instead of re-notifying.
    pub fn load(store: &dyn StateStore) -> Self {
        match store.load_seen() {
            Ok(handles) => Self::from_handles(handles),
            Err(e) => {
                warn!(error = %e, "could not load seen-set; starting empty");
                Self::new()
            }
        }
    }

    pub fn save(&self, store: &dyn StateStore) -> Result<()> {
        store.save_seen(&self.to_vec())
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.handles.contains(handle)
    }

    /// Returns `true` if the handle was not seen before.
    pub fn insert(&mut self, handle: &str) -> bool {
        let added = self.handles.insert(handle.to_string());
        if added {
            self.gauge.set(self.handles.len());
        }
        added
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn gauge(&self) -> SeenGauge {
        self.gauge.clone()
    }

    /// Sorted.
    pub fn to_vec(&self) -> Vec<String> {
        self.handles.iter().cloned().collect()
    }
}

/// Next unprocessed update id. Never moves backwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cursor(i64);

impl Cursor {
    pub fn new(offset: i64) -> Self {
        Self(offset.max(0))
    }

    pub fn load(store: &dyn StateStore) -> Self {
        match store.load_cursor() {
            Ok(offset) => Self::new(offset),
            Err(e) => {
                warn!(error = %e, "could not load update cursor; starting from 0");
                Self::default()
            }
        }
    }

    pub fn value(self) -> i64 {
        self.0
    }

    /// Move past `update_id`. Returns `true` if the cursor changed.
    pub fn advance(&mut self, update_id: i64) -> bool {
        let next = update_id.saturating_add(1);
        if next > self.0 {
            self.0 = next;
            true
        } else {
            false
        }
    }
}

/// In-memory store for tests.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemoryStateStore {
    pub seen: std::sync::Mutex<Vec<String>>,
    pub cursor_saves: std::sync::Mutex<Vec<i64>>,
    pub seen_saves: AtomicUsize,
    pub fail_saves: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl StateStore for MemoryStateStore {
    fn load_seen(&self) -> Result<Vec<String>> {
        Ok(self.seen.lock().unwrap().clone())
    }

    fn save_seen(&self, handles: &[String]) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(crate::Error::Io(std::io::Error::other("disk full")));
        }
        self.seen_saves.fetch_add(1, Ordering::SeqCst);
        *self.seen.lock().unwrap() = handles.to_vec();
        Ok(())
    }

    fn load_cursor(&self) -> Result<i64> {
        Ok(self.cursor_saves.lock().unwrap().last().copied().unwrap_or(0))
    }

    fn save_cursor(&self, cursor: i64) -> Result<()> {
        self.cursor_saves.lock().unwrap().push(cursor);
        Ok(())
    }
}
