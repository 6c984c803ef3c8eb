//! Runtime event stream payloads.

use crate::engine::{BatchReport, ChunkReport, ChunkStatus};

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkEvent {
    /// A batch was accepted and is about to run.
    BatchStarted {
        /// Runtime-assigned batch number.
        batch: u64,
        /// Submitted requests.
        items: usize,
    },
    /// A chunk was persisted and published.
    ChunkCommitted {
        batch: u64,
        chunk: usize,
        /// Store version the chunk published.
        version: u64,
    },
    /// A chunk was restored from its snapshot.
    ChunkRolledBack { batch: u64, chunk: usize },
    /// A chunk missed the threshold without rollback, or could not be
    /// snapshotted.
    ChunkFailed { batch: u64, chunk: usize },
    /// A chunk was not attempted.
    ChunkSkipped { batch: u64, chunk: usize },
    /// The batch returned a report.
    BatchFinished {
        batch: u64,
        success_rate: f64,
        version: u64,
    },
}

impl MarkEvent {
    pub(crate) fn for_chunk(batch: u64, report: &ChunkReport) -> Self {
        let chunk = report.index;
        match report.status {
            ChunkStatus::Committed => MarkEvent::ChunkCommitted {
                batch,
                chunk,
                version: report.version.unwrap_or_default(),
            },
            ChunkStatus::RolledBack => MarkEvent::ChunkRolledBack { batch, chunk },
            ChunkStatus::Failed => MarkEvent::ChunkFailed { batch, chunk },
            ChunkStatus::Skipped => MarkEvent::ChunkSkipped { batch, chunk },
        }
    }

    pub(crate) fn finished(batch: u64, report: &BatchReport) -> Self {
        MarkEvent::BatchFinished {
            batch,
            success_rate: report.overall_success_rate,
            version: report.version,
        }
    }
}
