//! Result sink trait and error types

use crate::state::{JobKey, Record};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize records: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Destination of harvested records
///
/// The sink is called once per finished job and once more with every job's
/// records combined, after all jobs ran.
pub trait ResultSink: Send {
    /// Persists the records of one job
    ///
    /// Returns the written location, or `None` when nothing was written
    /// (a job without records).
    fn write_job(&mut self, job: &JobKey, records: &[Record]) -> OutputResult<Option<PathBuf>>;

    /// Persists the combined records of all jobs
    fn write_combined(&mut self, records: &[Record]) -> OutputResult<PathBuf>;
}
