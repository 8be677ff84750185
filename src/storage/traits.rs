//! Storage traits and error types
//!
//! This module defines the trait interfaces for checkpoint stores and
//! record journals, and the error type they share.

use crate::state::{Checkpoint, JobKey, PageIndex, Record};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Corrupt file {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("Page index {0} does not fit the database column")]
    PageOutOfRange(PageIndex),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable record of the highest committed page per job
///
/// Only the single scheduler driving a job writes its checkpoint, so
/// implementations need no internal locking.
pub trait CheckpointStore: Send {
    /// Returns the last committed page for `job`, or `None` if the job has
    /// never committed a page
    fn load(&self, job: &JobKey) -> StorageResult<Option<PageIndex>>;

    /// Durably overwrites the checkpoint for `job`
    ///
    /// Saving the same page twice leaves the checkpoint unchanged.
    fn save(&mut self, job: &JobKey, page: PageIndex) -> StorageResult<()>;

    /// Deletes the checkpoint so the job restarts from its first page
    fn reset(&mut self, job: &JobKey) -> StorageResult<()>;

    /// Lists every stored checkpoint, ordered by job key
    fn list(&self) -> StorageResult<Vec<Checkpoint>>;
}

/// One journaled record together with the page it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub page: PageIndex,
    pub record: Record,
}

/// Durable append log of committed records
///
/// Records are appended before the checkpoint that covers them is saved.
/// On recovery, entries above the checkpoint are discarded: they belong to
/// pages that will be fetched again.
pub trait RecordJournal: Send {
    /// Returns the journaled records of pages `<= committed`, in append order,
    /// and drops every other entry
    fn recover(&mut self, job: &JobKey, committed: Option<PageIndex>)
        -> StorageResult<Vec<Record>>;

    /// Durably appends entries for `job`
    fn append(&mut self, job: &JobKey, entries: &[JournalEntry]) -> StorageResult<()>;

    /// Deletes the journal of `job`
    fn reset(&mut self, job: &JobKey) -> StorageResult<()>;
}
