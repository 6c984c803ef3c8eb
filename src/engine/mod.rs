//! Chunked batch transactions over the record store.

mod batch;
/// Per-item, per-chunk and per-batch outcomes.
pub mod report;

use thiserror::Error;

use crate::{config::ConfigError, persist::PersistError};

pub use batch::BatchEngine;
pub use report::{BatchReport, ChunkReport, ChunkStatus, ItemOutcome, ItemStatus};

/// Errors that abort a batch call. Per-item problems never surface here;
/// they are recorded in the [`BatchReport`].
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to open store: {0}")]
    Open(#[from] PersistError),
    /// The snapshot of a chunk that must not stay applied could not be
    /// restored. The engine is poisoned and must be reopened.
    #[error("rollback of chunk {chunk} failed: {source}")]
    RollbackFailed {
        chunk: usize,
        #[source]
        source: PersistError,
    },
    #[error("engine poisoned by failed rollback of chunk {chunk}; reopen it")]
    Poisoned { chunk: usize },
}
