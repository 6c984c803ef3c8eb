use std::time::Duration;

use crate::types::{Section, StockKey};

/// Final state of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    /// Applied and left in the store.
    Applied,
    /// Rejected or not applied.
    Failed(String),
    /// Applied, then undone with the rest of its chunk.
    RolledBack,
    /// Never attempted because an earlier chunk stopped the batch.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    /// Position in the submitted request list.
    pub index: usize,
    pub section: Section,
    pub code: String,
    /// Resolved key, when the code resolved.
    pub key: Option<StockKey>,
    pub status: ItemStatus,
}

impl ItemOutcome {
    pub fn is_applied(&self) -> bool {
        self.status == ItemStatus::Applied
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.status {
            ItemStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Committed,
    RolledBack,
    /// Missed the threshold without rollback, or could not be snapshotted.
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkReport {
    /// 0-based chunk number.
    pub index: usize,
    pub items: Vec<ItemOutcome>,
    pub status: ChunkStatus,
    /// Items that applied successfully over chunk length, in percent,
    /// measured before the commit decision.
    pub success_rate: f64,
    /// Store version published by this chunk.
    pub version: Option<u64>,
    /// Snapshot or persistence error that decided the outcome.
    pub error: Option<String>,
}

impl ChunkReport {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items left applied in the store.
    pub fn applied(&self) -> usize {
        self.items.iter().filter(|i| i.is_applied()).count()
    }
}

/// Outcome of one [`crate::engine::BatchEngine::run`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub total_items: usize,
    pub total_chunks: usize,
    pub committed_chunks: usize,
    pub rolled_back_chunks: usize,
    pub failed_chunks: usize,
    pub skipped_chunks: usize,
    pub chunks: Vec<ChunkReport>,
    /// Items left applied over total items, in percent; 0.0 for an empty
    /// batch.
    pub overall_success_rate: f64,
    /// Store version after the batch.
    pub version: u64,
    pub duration: Duration,
}

impl BatchReport {
    pub(crate) fn finalize(chunks: Vec<ChunkReport>, version: u64, duration: Duration) -> Self {
        let count = |status: ChunkStatus| chunks.iter().filter(|c| c.status == status).count();
        let total_items: usize = chunks.iter().map(ChunkReport::len).sum();
        let applied: usize = chunks.iter().map(ChunkReport::applied).sum();
        Self {
            total_items,
            total_chunks: chunks.len(),
            committed_chunks: count(ChunkStatus::Committed),
            rolled_back_chunks: count(ChunkStatus::RolledBack),
            failed_chunks: count(ChunkStatus::Failed),
            skipped_chunks: count(ChunkStatus::Skipped),
            overall_success_rate: percent(applied, total_items),
            chunks,
            version,
            duration,
        }
    }

    /// Every item outcome in submission order.
    pub fn items(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.chunks.iter().flat_map(|c| c.items.iter())
    }

    pub fn applied_items(&self) -> usize {
        self.chunks.iter().map(ChunkReport::applied).sum()
    }

    /// `(index, reason)` for every rejected item.
    pub fn failures(&self) -> Vec<(usize, &str)> {
        self.items()
            .filter_map(|item| item.failure_reason().map(|r| (item.index, r)))
            .collect()
    }

    /// True when every chunk committed.
    pub fn is_clean(&self) -> bool {
        self.committed_chunks == self.total_chunks
    }
}

pub(crate) fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}
