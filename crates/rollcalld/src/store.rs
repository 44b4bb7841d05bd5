use std::path::Path;

use rollcall_core::engine::{AttendanceSink, SinkError};
use rollcall_core::types::AttendanceRecord;
use thiserror::Error;
use tokio_rusqlite::Connection;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] tokio_rusqlite::Error),
    #[error("rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
}

/// SQLite-backed attendance record storage.
#[derive(Clone)]
pub struct AttendanceStore {
    conn: Connection,
}

impl AttendanceStore {
    /// Open (or create) the database at the given path and run migrations.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 CREATE TABLE IF NOT EXISTS attendance (
                     id TEXT PRIMARY KEY,
                     identity TEXT NOT NULL,
                     display_name TEXT NOT NULL,
                     session TEXT,
                     evidence_path TEXT NOT NULL,
                     confidence INTEGER NOT NULL,
                     marked_at TEXT NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_attendance_identity ON attendance(identity);
                 CREATE INDEX IF NOT EXISTS idx_attendance_session ON attendance(session);",
            )?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Insert one attendance record. Returns the generated record ID.
    pub async fn insert(&self, record: &AttendanceRecord) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let id_clone = id.clone();
        let identity = record.identity.clone();
        let display_name = record.display_name.clone();
        let session = record.session.clone();
        let evidence_path = record.evidence_path.to_string_lossy().into_owned();
        let confidence = record.confidence as i64;
        let marked_at = record.marked_at.to_rfc3339();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO attendance
                         (id, identity, display_name, session, evidence_path, confidence, marked_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        id_clone,
                        identity,
                        display_name,
                        session,
                        evidence_path,
                        confidence,
                        marked_at
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(id)
    }

    /// True when the identity already has a record for this session.
    /// Backs the once-per-session guard the daemon enforces before running
    /// the engine.
    pub async fn has_marked(
        &self,
        identity: &str,
        session: Option<&str>,
    ) -> Result<bool, StoreError> {
        let identity = identity.to_string();
        let session = session.map(str::to_string);
        self.conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM attendance WHERE identity = ?1 AND session IS ?2",
                    rusqlite::params![identity, session],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(StoreError::from)
    }

    /// Most recent attendance events, newest first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<AttendanceEvent>, StoreError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, identity, display_name, session, evidence_path, confidence, marked_at
                     FROM attendance ORDER BY marked_at DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map([limit], |row| {
                    Ok(AttendanceEvent {
                        id: row.get(0)?,
                        identity: row.get(1)?,
                        display_name: row.get(2)?,
                        session: row.get(3)?,
                        evidence_path: row.get(4)?,
                        confidence: row.get(5)?,
                        marked_at: row.get(6)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(StoreError::from)
    }

    /// Count all recorded attendance events.
    pub async fn count_all(&self) -> Result<u64, StoreError> {
        self.conn
            .call(|conn| {
                let count: u64 =
                    conn.query_row("SELECT COUNT(*) FROM attendance", [], |row| row.get(0))?;
                Ok(count)
            })
            .await
            .map_err(StoreError::from)
    }
}

/// One attendance event as reported to clients (no embedding data involved).
#[derive(Debug, Clone, serde::Serialize)]
pub struct AttendanceEvent {
    pub id: String,
    pub identity: String,
    pub display_name: String,
    pub session: Option<String>,
    pub evidence_path: String,
    pub confidence: i64,
    pub marked_at: String,
}

/// Synchronous [`AttendanceSink`] adapter for the engine thread. The engine
/// runs on its own OS thread, so blocking on the runtime handle is safe.
pub struct StoreSink {
    store: AttendanceStore,
    rt: tokio::runtime::Handle,
}

impl StoreSink {
    pub fn new(store: AttendanceStore, rt: tokio::runtime::Handle) -> Self {
        Self { store, rt }
    }
}

impl AttendanceSink for StoreSink {
    fn mark(&mut self, record: &AttendanceRecord) -> Result<(), SinkError> {
        self.rt
            .block_on(self.store.insert(record))
            .map(|_| ())
            .map_err(|e| SinkError(e.to_string()))
    }
}
