//! SQLite-backed snapshot history.
//!
//! Every chunk snapshot becomes a row. Discarding marks the row released
//! instead of deleting it, so the newest `max_backups` released rows double
//! as a backup history that can be listed and restored.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::store::{RecordStore, StoreSnapshotV1};

use super::{PersistError, PersistResult, SnapshotStore, SnapshotToken};

const SNAPSHOT_FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEnvelope {
    format_version: u16,
    snapshot: StoreSnapshotV1,
}

/// One row of the backup history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub token: SnapshotToken,
    pub ts_ms: u64,
    pub store_version: u64,
    pub entries: usize,
    pub released: bool,
}

/// SQLite implementation of [`crate::persist::SnapshotStore`].
pub struct SqliteSnapshotStore {
    conn: Connection,
    max_backups: usize,
}

impl SqliteSnapshotStore {
    /// Opens or creates the history database at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>, max_backups: usize) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn, max_backups)
    }

    pub fn open_in_memory(max_backups: usize) -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn, max_backups)
    }

    fn init_connection(conn: Connection, max_backups: usize) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self {
            conn,
            max_backups: max_backups.max(1),
        })
    }

    /// History rows, newest first.
    pub fn history(&self) -> PersistResult<Vec<BackupInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, ts_ms, store_version, entries, released FROM snapshots ORDER BY id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let ts_ms: i64 = row.get(1)?;
            let store_version: i64 = row.get(2)?;
            let entries: i64 = row.get(3)?;
            let released: bool = row.get(4)?;
            Ok(BackupInfo {
                token: SnapshotToken(id as u64),
                ts_ms: ts_ms as u64,
                store_version: store_version as u64,
                entries: entries as usize,
                released,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Most recent snapshot, if any.
    pub fn latest(&self) -> PersistResult<Option<RecordStore>> {
        let payload: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT payload FROM snapshots ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        payload.map(|p| decode(&p)).transpose()
    }

    /// Deletes released rows beyond the newest `max_backups`. Rows still
    /// held by an in-flight chunk are never pruned.
    pub fn prune(&mut self) -> PersistResult<usize> {
        let pruned = self.conn.execute(
            "DELETE FROM snapshots WHERE released = 1 AND id NOT IN \
             (SELECT id FROM snapshots ORDER BY id DESC LIMIT ?1)",
            params![self.max_backups as i64],
        )?;
        if pruned > 0 {
            debug!(pruned, "pruned backup history");
        }
        Ok(pruned)
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn save(&mut self, store: &RecordStore) -> PersistResult<SnapshotToken> {
        let env = SnapshotEnvelope {
            format_version: SNAPSHOT_FORMAT_VERSION,
            snapshot: store.export_snapshot(),
        };
        let payload = serde_json::to_vec(&env)?;
        self.conn.execute(
            "INSERT INTO snapshots(ts_ms, store_version, entries, payload) VALUES (?1, ?2, ?3, ?4)",
            params![
                now_ms() as i64,
                store.version() as i64,
                store.len() as i64,
                payload
            ],
        )?;
        let token = SnapshotToken(self.conn.last_insert_rowid() as u64);
        self.prune()?;
        Ok(token)
    }

    fn restore(&mut self, token: SnapshotToken) -> PersistResult<RecordStore> {
        let payload: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT payload FROM snapshots WHERE id = ?1",
                params![token.0 as i64],
                |row| row.get(0),
            )
            .optional()?;
        let payload = payload.ok_or(PersistError::MissingSnapshot(token.0))?;
        decode(&payload)
    }

    fn discard(&mut self, token: SnapshotToken) -> PersistResult<()> {
        self.conn.execute(
            "UPDATE snapshots SET released = 1 WHERE id = ?1",
            params![token.0 as i64],
        )?;
        self.prune()?;
        Ok(())
    }
}

fn decode(payload: &[u8]) -> PersistResult<RecordStore> {
    let env: SnapshotEnvelope = serde_json::from_slice(payload)?;
    if env.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(PersistError::Message(format!(
            "unsupported snapshot format version: {}",
            env.format_version
        )));
    }
    Ok(RecordStore::from_snapshot(env.snapshot))
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
