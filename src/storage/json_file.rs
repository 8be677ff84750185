//! JSON file checkpoint store
//!
//! One small, human-readable file per job:
//!
//! ```json
//! {
//!   "jobKey": "android-phones",
//!   "lastCommittedPage": 12,
//!   "updatedAt": "2024-09-24T11:04:15Z"
//! }
//! ```
//!
//! Deleting the file restarts the job. Hand-written files holding only
//! `lastCommittedPage` are accepted.

use crate::state::{Checkpoint, JobKey, PageIndex};
use crate::storage::traits::{CheckpointStore, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const FILE_PREFIX: &str = "checkpoint_";
const FILE_SUFFIX: &str = ".json";

/// On-disk layout, lenient about everything but the page
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckpointFile {
    #[serde(default)]
    job_key: Option<JobKey>,
    last_committed_page: PageIndex,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// Checkpoint store keeping one JSON file per job in a directory
pub struct JsonCheckpointStore {
    dir: PathBuf,
}

impl JsonCheckpointStore {
    /// Creates a store rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Returns the file holding the checkpoint of `job`
    pub fn path_for(&self, job: &JobKey) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", FILE_PREFIX, job.file_stem(), FILE_SUFFIX))
    }

    fn read(&self, path: &Path) -> StorageResult<CheckpointFile> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| StorageError::Corrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Writes `bytes` to `path` through a synced temporary file and a rename
///
/// Readers see either the old or the new content, never a torn write.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

impl CheckpointStore for JsonCheckpointStore {
    fn load(&self, job: &JobKey) -> StorageResult<Option<PageIndex>> {
        let path = self.path_for(job);
        if !path.exists() {
            return Ok(None);
        }

        Ok(Some(self.read(&path)?.last_committed_page))
    }

    fn save(&mut self, job: &JobKey, page: PageIndex) -> StorageResult<()> {
        let checkpoint = Checkpoint::new(job.clone(), page);
        let json = serde_json::to_string_pretty(&checkpoint)?;
        write_atomic(&self.path_for(job), json.as_bytes())?;
        Ok(())
    }

    fn reset(&mut self, job: &JobKey) -> StorageResult<()> {
        let path = self.path_for(job);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn list(&self) -> StorageResult<Vec<Checkpoint>> {
        let mut checkpoints = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(stem) = name
                .strip_prefix(FILE_PREFIX)
                .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
            else {
                continue;
            };

            let file = self.read(&path)?;
            checkpoints.push(Checkpoint {
                job_key: file.job_key.unwrap_or_else(|| JobKey::new(stem)),
                last_committed_page: file.last_committed_page,
                updated_at: file.updated_at.unwrap_or_else(Utc::now),
            });
        }

        checkpoints.sort_by(|a, b| a.job_key.cmp(&b.job_key));
        Ok(checkpoints)
    }
}
