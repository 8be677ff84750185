//! Storage module for persisting harvest progress
//!
//! This module handles everything that must survive a restart:
//! - Per-job checkpoints (JSON files or a SQLite database)
//! - Per-job record journals written alongside the checkpoints
//! - In-memory variants of both for tests and embedding

mod journal;
mod json_file;
mod memory;
mod schema;
mod sqlite;
mod traits;

pub use journal::JsonlJournal;
pub use json_file::JsonCheckpointStore;
pub(crate) use json_file::write_atomic;
pub use memory::{MemoryCheckpointStore, MemoryJournal};
pub use sqlite::SqliteCheckpointStore;
pub use traits::{
    CheckpointStore, JournalEntry, RecordJournal, StorageError, StorageResult,
};

use crate::config::{CheckpointBackend, CheckpointConfig};
use std::path::Path;

/// Opens the checkpoint store selected by the configuration
///
/// # Arguments
///
/// * `config` - The checkpoint section of the configuration
///
/// # Returns
///
/// * `Ok(Box<dyn CheckpointStore>)` - The opened store
/// * `Err(StorageError)` - The directory or database could not be opened
pub fn open_checkpoint_store(config: &CheckpointConfig) -> StorageResult<Box<dyn CheckpointStore>> {
    match config.backend {
        CheckpointBackend::Json => Ok(Box::new(JsonCheckpointStore::new(&config.dir)?)),
        CheckpointBackend::Sqlite => Ok(Box::new(SqliteCheckpointStore::new(Path::new(
            &config.database_path,
        ))?)),
    }
}

/// Opens the record journal, which always lives next to the checkpoints
pub fn open_journal(config: &CheckpointConfig) -> StorageResult<Box<dyn RecordJournal>> {
    Ok(Box::new(JsonlJournal::new(&config.dir)?))
}
