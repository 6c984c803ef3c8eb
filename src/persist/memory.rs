//! In-process snapshot store and sink.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::core::store::RecordStore;

use super::{PersistError, PersistResult, SnapshotStore, SnapshotToken, StoreSink};

/// Keeps deep copies of the store keyed by token.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    next: u64,
    snapshots: HashMap<u64, RecordStore>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots not yet discarded.
    pub fn live(&self) -> usize {
        self.snapshots.len()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&mut self, store: &RecordStore) -> PersistResult<SnapshotToken> {
        self.next += 1;
        self.snapshots.insert(self.next, store.clone());
        Ok(SnapshotToken(self.next))
    }

    fn restore(&mut self, token: SnapshotToken) -> PersistResult<RecordStore> {
        self.snapshots
            .get(&token.0)
            .cloned()
            .ok_or(PersistError::MissingSnapshot(token.0))
    }

    fn discard(&mut self, token: SnapshotToken) -> PersistResult<()> {
        self.snapshots.remove(&token.0);
        Ok(())
    }
}

/// Sink that keeps the last serialized text.
///
/// Clones share state, so a test can hold one clone while the engine owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    last: Arc<Mutex<Option<String>>>,
    writes: Arc<Mutex<usize>>,
    fail: Arc<AtomicBool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `persist` call fail until reset.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn last_text(&self) -> Option<String> {
        self.last.lock().clone()
    }

    /// Parses the last written text back into a store.
    pub fn last_store(&self) -> PersistResult<Option<RecordStore>> {
        match self.last_text() {
            Some(text) => Ok(Some(RecordStore::load(&text)?)),
            None => Ok(None),
        }
    }

    /// Successful writes so far.
    pub fn writes(&self) -> usize {
        *self.writes.lock()
    }
}

impl StoreSink for MemorySink {
    fn persist(&mut self, store: &RecordStore) -> PersistResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PersistError::Message("memory sink set to fail".to_string()));
        }
        *self.last.lock() = Some(store.serialize());
        *self.writes.lock() += 1;
        Ok(())
    }
}

/// Snapshot store whose `restore` can be made to fail. Used to exercise
/// the fatal rollback path.
#[derive(Debug, Clone, Default)]
pub struct FlakySnapshotStore {
    inner: Arc<Mutex<MemorySnapshotStore>>,
    fail_save: Arc<AtomicBool>,
    fail_restore: Arc<AtomicBool>,
}

impl FlakySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_save(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_restore(&self, fail: bool) {
        self.fail_restore.store(fail, Ordering::SeqCst);
    }

    pub fn live(&self) -> usize {
        self.inner.lock().live()
    }
}

impl SnapshotStore for FlakySnapshotStore {
    fn save(&mut self, store: &RecordStore) -> PersistResult<SnapshotToken> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(PersistError::Message("snapshot save disabled".to_string()));
        }
        self.inner.lock().save(store)
    }

    fn restore(&mut self, token: SnapshotToken) -> PersistResult<RecordStore> {
        if self.fail_restore.load(Ordering::SeqCst) {
            return Err(PersistError::Message("snapshot restore disabled".to_string()));
        }
        self.inner.lock().restore(token)
    }

    fn discard(&mut self, token: SnapshotToken) -> PersistResult<()> {
        self.inner.lock().discard(token)
    }
}
