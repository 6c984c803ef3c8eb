pub mod file;
pub mod memory;
pub mod sqlite;

use thiserror::Error;

use crate::core::{codec::FormatError, store::RecordStore};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{encoding} cannot represent the mark file: {reason}")]
    Encoding {
        encoding: &'static str,
        reason: String,
    },
    #[error("malformed mark file: {0}")]
    Format(#[from] FormatError),
    #[error("no snapshot for token {0}")]
    MissingSnapshot(u64),
    #[error("{0}")]
    Message(String),
}

pub type PersistResult<T> = Result<T, PersistError>;

/// Handle returned by [`SnapshotStore::save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotToken(pub u64);

/// Durable destination for committed store state.
pub trait StoreSink: Send {
    /// Writes the full store. Must leave either the old or the new state
    /// behind, never a mix.
    fn persist(&mut self, store: &RecordStore) -> PersistResult<()>;
}

/// Captures and restores whole-store state around a chunk.
pub trait SnapshotStore: Send {
    fn save(&mut self, store: &RecordStore) -> PersistResult<SnapshotToken>;
    /// Returns a store equal to the one passed to the matching `save`.
    fn restore(&mut self, token: SnapshotToken) -> PersistResult<RecordStore>;
    /// Releases the snapshot. Unknown tokens are ignored.
    fn discard(&mut self, token: SnapshotToken) -> PersistResult<()>;
}
