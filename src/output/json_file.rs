//! JSON file sink
//!
//! Each job is written to `<dir>/<prefix>_<file_stem>.json` as a pretty
//! printed array; the combined array goes to `<dir>/<combined-file>`.

use crate::config::OutputConfig;
use crate::output::traits::{OutputError, OutputResult, ResultSink};
use crate::state::{JobKey, Record};
use crate::storage::write_atomic;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes records as JSON arrays on disk
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
    prefix: String,
    combined_file: String,
}

impl JsonFileSink {
    pub fn new(dir: impl AsRef<Path>, prefix: impl Into<String>, combined_file: impl Into<String>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            prefix: prefix.into(),
            combined_file: combined_file.into(),
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(&config.dir, config.prefix.clone(), config.combined_file.clone())
    }

    /// Returns the file a job's records are written to
    pub fn path_for(&self, job: &JobKey) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", self.prefix, job.file_stem()))
    }

    pub fn combined_path(&self) -> PathBuf {
        self.dir.join(&self.combined_file)
    }

    fn write(&self, path: &Path, records: &[Record]) -> OutputResult<()> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(records)?;
        write_atomic(path, json.as_bytes()).map_err(|source| OutputError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl ResultSink for JsonFileSink {
    fn write_job(&mut self, job: &JobKey, records: &[Record]) -> OutputResult<Option<PathBuf>> {
        if records.is_empty() {
            return Ok(None);
        }

        let path = self.path_for(job);
        self.write(&path, records)?;
        tracing::info!("Data saved to {} ({} records)", path.display(), records.len());
        Ok(Some(path))
    }

    fn write_combined(&mut self, records: &[Record]) -> OutputResult<PathBuf> {
        let path = self.combined_path();
        self.write(&path, records)?;
        tracing::info!(
            "Combined data saved to {} ({} records)",
            path.display(),
            records.len()
        );
        Ok(path)
    }
}
