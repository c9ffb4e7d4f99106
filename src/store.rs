//! Durable snapshot storage
//!
//! Storage is a set of named slots holding serialized snapshots. Only the
//! derived snapshot is ever written; raw click history and timestamps stay in
//! memory.

use crate::error::SentinelError;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// A key-value slot store for serialized snapshots
pub trait SnapshotStore {
    /// Read a slot; `Ok(None)` when it has never been written or was removed
    fn load(&self, key: &str) -> Result<Option<String>, SentinelError>;

    fn save(&mut self, key: &str, payload: &str) -> Result<(), SentinelError>;

    fn remove(&mut self, key: &str) -> Result<(), SentinelError>;
}

impl<T: SnapshotStore + ?Sized> SnapshotStore for Box<T> {
    fn load(&self, key: &str) -> Result<Option<String>, SentinelError> {
        (**self).load(key)
    }

    fn save(&mut self, key: &str, payload: &str) -> Result<(), SentinelError> {
        (**self).save(key, payload)
    }

    fn remove(&mut self, key: &str) -> Result<(), SentinelError> {
        (**self).remove(key)
    }
}

/// In-memory store.
///
/// Clones share the same slots, which lets a test hold on to a handle while
/// the session owns another. Every successful `save` bumps a write counter.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    slots: HashMap<String, String>,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes performed through any clone of this store
    pub fn write_count(&self) -> usize {
        self.inner.borrow().writes
    }

    /// Raw slot content, bypassing decoding
    pub fn raw(&self, key: &str) -> Option<String> {
        self.inner.borrow().slots.get(key).cloned()
    }

    /// Put arbitrary content into a slot without counting it as a write
    pub fn seed(&self, key: &str, payload: &str) {
        self.inner
            .borrow_mut()
            .slots
            .insert(key.to_string(), payload.to_string());
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, SentinelError> {
        Ok(self.raw(key))
    }

    fn save(&mut self, key: &str, payload: &str) -> Result<(), SentinelError> {
        let mut inner = self.inner.borrow_mut();
        inner.slots.insert(key.to_string(), payload.to_string());
        inner.writes += 1;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), SentinelError> {
        self.inner.borrow_mut().slots.remove(key);
        Ok(())
    }
}

/// Store that keeps each slot as `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn slot_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SnapshotStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>, SentinelError> {
        match fs::read_to_string(self.slot_path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, key: &str, payload: &str) -> Result<(), SentinelError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.slot_path(key);
        // Write-then-rename so a reader never sees a torn snapshot
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, payload)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), SentinelError> {
        match fs::remove_file(self.slot_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
