use std::{sync::Arc, time::Instant};

use hashbrown::HashSet;
use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, error, info, warn};

use crate::{
    config::{BatchConfig, Settings},
    core::{merge::MergePolicy, store::RecordStore},
    mark::split_tokens,
    op::{MutationOp, MutationRequest},
    persist::{
        SnapshotStore, SnapshotToken, StoreSink, file::AtomicFileSink,
        memory::MemorySnapshotStore, sqlite::SqliteSnapshotStore,
    },
    query::{SharedStore, StockCache},
    types::{Section, StockKey},
    validate::{RuleValidator, Validator},
};

use super::{
    BatchError,
    report::{BatchReport, ChunkReport, ChunkStatus, ItemOutcome, ItemStatus, percent},
};

const DEFAULT_CACHE_CAPACITY: usize = 100;

type VerifyFn = fn(&RecordStore, Section, &StockKey, &MutationOp) -> bool;

/// Exclusive writer over a record store.
///
/// Chunks are staged on a private working copy. A chunk becomes visible to
/// readers of [`BatchEngine::shared`] and [`BatchEngine::cache`] only when it
/// is published, which happens after the sink has persisted it.
pub struct BatchEngine {
    working: RecordStore,
    shared: SharedStore,
    cache: Arc<StockCache>,
    sink: Box<dyn StoreSink>,
    snapshots: Box<dyn SnapshotStore>,
    validator: Box<dyn Validator>,
    config: BatchConfig,
    /// Chunk whose rollback failed. Set once, never cleared.
    poisoned: Option<usize>,
    verify: VerifyFn,
}

/// Result of staging one chunk on the working copy.
struct Staged {
    items: Vec<ItemOutcome>,
    touched: HashSet<StockKey>,
}

impl BatchEngine {
    pub fn new(
        store: RecordStore,
        sink: Box<dyn StoreSink>,
        snapshots: Box<dyn SnapshotStore>,
    ) -> Self {
        let shared: SharedStore = Arc::new(RwLock::new(store.clone()));
        let cache = Arc::new(StockCache::new(shared.clone(), DEFAULT_CACHE_CAPACITY));
        Self {
            working: store,
            shared,
            cache,
            sink,
            snapshots,
            validator: Box::new(RuleValidator::default()),
            config: BatchConfig::default(),
            poisoned: None,
            verify,
        }
    }

    /// Loads the mark file and wires sink, snapshot store, validator and
    /// cache from `settings`.
    pub fn open(settings: &Settings) -> Result<Self, BatchError> {
        settings.validate()?;
        let sink = AtomicFileSink::new(&settings.paths.mark_file).with_encoding(settings.paths.encoding);
        let store = sink.load()?;
        let snapshots: Box<dyn SnapshotStore> = match &settings.paths.backup_db {
            Some(path) => Box::new(SqliteSnapshotStore::open(path, settings.backup.max_backups)?),
            None => Box::new(MemorySnapshotStore::new()),
        };
        info!(
            mark_file = %settings.paths.mark_file.display(),
            entries = store.len(),
            "opened mark store"
        );
        Ok(Self::new(store, Box::new(sink), snapshots)
            .with_validator(Box::new(RuleValidator::new(settings.validation)))
            .with_cache_capacity(settings.cache.capacity)
            .with_config(settings.batch))
    }

    pub fn with_validator(mut self, validator: Box<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    /// Replaces the cache. Handles to the previous cache stop being
    /// invalidated.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = Arc::new(StockCache::new(self.shared.clone(), capacity));
        self
    }

    pub fn with_config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Default configuration used by the runtime.
    pub fn config(&self) -> BatchConfig {
        self.config
    }

    pub fn shared(&self) -> SharedStore {
        self.shared.clone()
    }

    pub fn cache(&self) -> Arc<StockCache> {
        self.cache.clone()
    }

    /// Read access to the published store.
    pub fn store(&self) -> RwLockReadGuard<'_, RecordStore> {
        self.shared.read()
    }

    pub fn version(&self) -> u64 {
        self.working.version()
    }

    /// True after a failed rollback. Every later run is refused.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    pub fn run(
        &mut self,
        requests: &[MutationRequest],
        config: &BatchConfig,
    ) -> Result<BatchReport, BatchError> {
        self.run_with(requests, config, |_| {})
    }

    /// Like [`BatchEngine::run`], calling `observer` with each chunk report as
    /// soon as the chunk is decided.
    pub fn run_with(
        &mut self,
        requests: &[MutationRequest],
        config: &BatchConfig,
        mut observer: impl FnMut(&ChunkReport),
    ) -> Result<BatchReport, BatchError> {
        if let Some(chunk) = self.poisoned {
            return Err(BatchError::Poisoned { chunk });
        }
        config.validate()?;
        let started = Instant::now();
        let mut chunks = Vec::with_capacity(requests.len().div_ceil(config.chunk_size));
        let mut stopped = false;

        for (index, chunk) in requests.chunks(config.chunk_size).enumerate() {
            let offset = index * config.chunk_size;
            let report = if stopped {
                skipped_chunk(index, offset, chunk)
            } else {
                let report = self.run_chunk(index, offset, chunk, config)?;
                if report.status != ChunkStatus::Committed && !config.continue_on_failure {
                    warn!(chunk = index, "stopping batch after uncommitted chunk");
                    stopped = true;
                }
                report
            };
            observer(&report);
            chunks.push(report);
        }

        let report = BatchReport::finalize(chunks, self.working.version(), started.elapsed());
        info!(
            items = report.total_items,
            chunks = report.total_chunks,
            committed = report.committed_chunks,
            rolled_back = report.rolled_back_chunks,
            failed = report.failed_chunks,
            skipped = report.skipped_chunks,
            success_rate = report.overall_success_rate,
            version = report.version,
            "batch finished"
        );
        Ok(report)
    }

    fn run_chunk(
        &mut self,
        index: usize,
        offset: usize,
        chunk: &[MutationRequest],
        config: &BatchConfig,
    ) -> Result<ChunkReport, BatchError> {
        let token = match self.snapshots.save(&self.working) {
            Ok(token) => token,
            Err(err) => {
                error!(chunk = index, error = %err, "snapshot failed, chunk not applied");
                let reason = format!("snapshot failed: {err}");
                let items = chunk
                    .iter()
                    .enumerate()
                    .map(|(i, req)| outcome(offset + i, req, None, ItemStatus::Failed(reason.clone())))
                    .collect();
                return Ok(ChunkReport {
                    index,
                    items,
                    status: ChunkStatus::Failed,
                    success_rate: 0.0,
                    version: None,
                    error: Some(err.to_string()),
                });
            }
        };

        let Staged { mut items, touched } = self.stage(offset, chunk);
        let applied = items.iter().filter(|i| i.is_applied()).count();
        let success_rate = percent(applied, chunk.len());
        let mut report = ChunkReport {
            index,
            items: Vec::new(),
            status: ChunkStatus::Committed,
            success_rate,
            version: None,
            error: None,
        };

        let meets_threshold = success_rate >= config.success_threshold;
        if !meets_threshold && config.auto_rollback {
            self.rollback(index, token)?;
            mark_rolled_back(&mut items);
            warn!(chunk = index, success_rate, "chunk rolled back");
            report.status = ChunkStatus::RolledBack;
            report.items = items;
            return Ok(report);
        }

        if let Err(err) = self.sink.persist(&self.working) {
            error!(chunk = index, error = %err, "persist failed, rolling back chunk");
            self.rollback(index, token)?;
            mark_rolled_back(&mut items);
            report.status = ChunkStatus::RolledBack;
            report.error = Some(err.to_string());
            report.items = items;
            return Ok(report);
        }

        let version = self.publish(&touched);
        if let Err(err) = self.snapshots.discard(token) {
            warn!(chunk = index, error = %err, "failed to discard snapshot");
        }
        report.version = Some(version);
        report.items = items;
        if meets_threshold {
            info!(chunk = index, success_rate, version, "chunk committed");
        } else {
            warn!(chunk = index, success_rate, version, "chunk below threshold kept without rollback");
            report.status = ChunkStatus::Failed;
        }
        Ok(report)
    }

    /// Applies each request to the working copy. A request either applies
    /// and verifies, or leaves the working copy untouched.
    fn stage(&mut self, offset: usize, chunk: &[MutationRequest]) -> Staged {
        let mut items = Vec::with_capacity(chunk.len());
        let mut touched = HashSet::new();

        for (i, req) in chunk.iter().enumerate() {
            let index = offset + i;
            let key = match self.validator.validate_key(&req.code) {
                Ok(key) => key,
                Err(err) => {
                    warn!(item = index, code = %req.code, error = %err, "rejected request");
                    items.push(outcome(index, req, None, ItemStatus::Failed(err.to_string())));
                    continue;
                }
            };
            let status = self.apply_one(index, req, &key);
            if status == ItemStatus::Applied {
                touched.insert(key.clone());
            }
            items.push(outcome(index, req, Some(key), status));
        }

        Staged { items, touched }
    }

    fn apply_one(&mut self, index: usize, req: &MutationRequest, key: &StockKey) -> ItemStatus {
        if let Err(err) = self.validator.validate(req.section, key, &req.op) {
            warn!(item = index, key = %key, error = %err, "rejected request");
            return ItemStatus::Failed(err.to_string());
        }
        let change = match self.working.apply(req.section, key, &req.op) {
            Ok(change) => change,
            Err(err) => {
                warn!(item = index, key = %key, error = %err, "rejected request");
                return ItemStatus::Failed(err.to_string());
            }
        };
        // Built-in merge policies always satisfy their post-condition; this
        // catches a policy that does not.
        if !(self.verify)(&self.working, req.section, key, &req.op) {
            self.working.revert(&change);
            warn!(item = index, key = %key, section = %req.section, "verification failed");
            return ItemStatus::Failed("verification failed".to_string());
        }
        debug!(item = index, key = %key, section = %req.section, noop = change.is_noop(), "staged request");
        ItemStatus::Applied
    }

    /// Makes the working copy the published store. The cache is invalidated
    /// inside the same write-locked section.
    fn publish(&mut self, touched: &HashSet<StockKey>) -> u64 {
        let version = self.working.bump_version();
        let mut shared = self.shared.write();
        *shared = self.working.clone();
        let evicted = self.cache.invalidate(touched);
        debug!(version, touched = touched.len(), evicted, "published store");
        version
    }

    fn rollback(&mut self, index: usize, token: SnapshotToken) -> Result<(), BatchError> {
        match self.snapshots.restore(token) {
            Ok(store) => {
                self.working = store;
                if let Err(err) = self.snapshots.discard(token) {
                    warn!(chunk = index, error = %err, "failed to discard snapshot");
                }
                Ok(())
            }
            Err(source) => {
                // The published store is the last persisted state; the
                // staged chunk must never reach the sink.
                self.working = self.shared.read().clone();
                self.poisoned = Some(index);
                error!(chunk = index, error = %source, "rollback failed, engine poisoned");
                Err(BatchError::RollbackFailed {
                    chunk: index,
                    source,
                })
            }
        }
    }
}

fn outcome(index: usize, req: &MutationRequest, key: Option<StockKey>, status: ItemStatus) -> ItemOutcome {
    ItemOutcome {
        index,
        section: req.section,
        code: req.code.clone(),
        key,
        status,
    }
}

fn skipped_chunk(index: usize, offset: usize, chunk: &[MutationRequest]) -> ChunkReport {
    ChunkReport {
        index,
        items: chunk
            .iter()
            .enumerate()
            .map(|(i, req)| outcome(offset + i, req, None, ItemStatus::Skipped))
            .collect(),
        status: ChunkStatus::Skipped,
        success_rate: 0.0,
        version: None,
        error: None,
    }
}

fn mark_rolled_back(items: &mut [ItemOutcome]) {
    for item in items.iter_mut().filter(|i| i.is_applied()) {
        item.status = ItemStatus::RolledBack;
    }
}

/// Re-reads the post-condition of `op` from `store`.
fn verify(store: &RecordStore, section: Section, key: &StockKey, op: &MutationOp) -> bool {
    match op {
        MutationOp::Set(value) => match MergePolicy::for_section(section) {
            MergePolicy::Replace => {
                let value = value.trim();
                match store.get_text(section, key) {
                    Some(stored) => stored == value,
                    None => value.is_empty(),
                }
            }
            MergePolicy::DelimitedTokenMerge => {
                let tokens = store.get_tokens(key);
                split_tokens(value).all(|t| tokens.is_some_and(|set| set.contains(t)))
            }
        },
        MutationOp::DeleteValue => store.get(section, key).is_none(),
        MutationOp::DeleteTokens(gone) => store
            .get_tokens(key)
            .is_none_or(|set| gone.iter().all(|t| !set.contains(t))),
        MutationOp::DeleteAllForKey => store.view(key).is_none(),
    }
}
