//! SQLite checkpoint store
//!
//! Keeps the checkpoints of all jobs in a single database file. Resetting a
//! job means deleting its row.

use crate::state::{Checkpoint, JobKey, PageIndex};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{CheckpointStore, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite checkpoint backend
pub struct SqliteCheckpointStore {
    conn: Connection,
}

impl SqliteCheckpointStore {
    /// Opens or creates the checkpoint database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn to_column(page: PageIndex) -> StorageResult<i64> {
    i64::try_from(page).map_err(|_| StorageError::PageOutOfRange(page))
}

fn from_column(value: i64) -> rusqlite::Result<PageIndex> {
    PageIndex::try_from(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Integer, Box::new(e))
    })
}

impl CheckpointStore for SqliteCheckpointStore {
    fn load(&self, job: &JobKey) -> StorageResult<Option<PageIndex>> {
        let page = self
            .conn
            .query_row(
                "SELECT last_committed_page FROM checkpoints WHERE job_key = ?1",
                params![job.as_str()],
                |row| from_column(row.get(0)?),
            )
            .optional()?;

        Ok(page)
    }

    fn save(&mut self, job: &JobKey, page: PageIndex) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO checkpoints (job_key, last_committed_page, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(job_key) DO UPDATE SET
                 last_committed_page = excluded.last_committed_page,
                 updated_at = excluded.updated_at",
            params![job.as_str(), to_column(page)?, now],
        )?;
        Ok(())
    }

    fn reset(&mut self, job: &JobKey) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM checkpoints WHERE job_key = ?1",
            params![job.as_str()],
        )?;
        Ok(())
    }

    fn list(&self) -> StorageResult<Vec<Checkpoint>> {
        let mut stmt = self.conn.prepare(
            "SELECT job_key, last_committed_page, updated_at FROM checkpoints ORDER BY job_key",
        )?;

        let rows = stmt.query_map([], |row| {
            let updated_at: String = row.get(2)?;
            Ok(Checkpoint {
                job_key: JobKey::new(row.get::<_, String>(0)?),
                last_committed_page: from_column(row.get(1)?)?,
                updated_at: DateTime::parse_from_rfc3339(&updated_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        })?;

        let mut checkpoints = Vec::new();
        for row in rows {
            checkpoints.push(row?);
        }
        Ok(checkpoints)
    }
}
