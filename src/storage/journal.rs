//! JSON Lines record journal
//!
//! Each committed record is appended as one line `{"page": n, "record": ...}`
//! to `journal_<job>.jsonl`. Appends are synced before the checkpoint that
//! covers them is written.

use crate::state::{JobKey, PageIndex, Record};
use crate::storage::json_file::write_atomic;
use crate::storage::traits::{JournalEntry, RecordJournal, StorageResult};
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Record journal keeping one JSON Lines file per job in a directory
pub struct JsonlJournal {
    dir: PathBuf,
}

impl JsonlJournal {
    /// Creates a journal rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Returns the journal file of `job`
    pub fn path_for(&self, job: &JobKey) -> PathBuf {
        self.dir.join(format!("journal_{}.jsonl", job.file_stem()))
    }
}

impl RecordJournal for JsonlJournal {
    fn recover(
        &mut self,
        job: &JobKey,
        committed: Option<PageIndex>,
    ) -> StorageResult<Vec<Record>> {
        let path = self.path_for(job);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path)?;
        let mut kept: Vec<JournalEntry> = Vec::new();
        let mut dropped = 0usize;

        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<JournalEntry>(line) {
                Ok(entry) if committed.is_some_and(|c| entry.page <= c) => kept.push(entry),
                Ok(_) => dropped += 1,
                Err(e) => {
                    tracing::warn!("Dropping unreadable journal line in {}: {}", path.display(), e);
                    dropped += 1;
                }
            }
        }

        if dropped > 0 {
            tracing::info!(
                "Discarding {} journaled records of uncommitted pages for job {}",
                dropped,
                job
            );
            let mut rewritten = Vec::new();
            for entry in &kept {
                serde_json::to_writer(&mut rewritten, entry)?;
                rewritten.push(b'\n');
            }
            write_atomic(&path, &rewritten)?;
        }

        Ok(kept.into_iter().map(|entry| entry.record).collect())
    }

    fn append(&mut self, job: &JobKey, entries: &[JournalEntry]) -> StorageResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(job))?;
        let mut writer = BufWriter::new(file);

        for entry in entries {
            serde_json::to_writer(&mut writer, entry)?;
            writer.write_all(b"\n")?;
        }

        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_data()?;
        Ok(())
    }

    fn reset(&mut self, job: &JobKey) -> StorageResult<()> {
        let path = self.path_for(job);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn entry(page: PageIndex, sku: &str) -> JournalEntry {
        JournalEntry {
            page,
            record: json!({ "sku": sku }),
        }
    }

    #[test]
    fn test_recover_missing_journal() {
        let dir = TempDir::new().unwrap();
        let mut journal = JsonlJournal::new(dir.path()).unwrap();

        let records = journal.recover(&JobKey::new("ipads"), Some(3)).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_append_then_recover_in_order() {
        let dir = TempDir::new().unwrap();
        let mut journal = JsonlJournal::new(dir.path()).unwrap();
        let job = JobKey::new("ipads");

        journal.append(&job, &[entry(1, "a"), entry(1, "b")]).unwrap();
        journal.append(&job, &[entry(2, "c")]).unwrap();

        let records = journal.recover(&job, Some(2)).unwrap();
        assert_eq!(
            records,
            vec![json!({"sku": "a"}), json!({"sku": "b"}), json!({"sku": "c"})]
        );
    }

    #[test]
    fn test_recover_drops_uncommitted_pages() {
        let dir = TempDir::new().unwrap();
        let mut journal = JsonlJournal::new(dir.path()).unwrap();
        let job = JobKey::new("ipads");

        journal
            .append(&job, &[entry(1, "a"), entry(2, "b"), entry(3, "c")])
            .unwrap();

        let records = journal.recover(&job, Some(2)).unwrap();
        assert_eq!(records.len(), 2);

        // The file itself is truncated, so a later append cannot duplicate page 3
        let content = fs::read_to_string(journal.path_for(&job)).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_recover_without_checkpoint_drops_everything() {
        let dir = TempDir::new().unwrap();
        let mut journal = JsonlJournal::new(dir.path()).unwrap();
        let job = JobKey::new("ipads");

        journal.append(&job, &[entry(0, "a")]).unwrap();

        assert!(journal.recover(&job, None).unwrap().is_empty());
    }

    #[test]
    fn test_recover_skips_torn_line() {
        let dir = TempDir::new().unwrap();
        let mut journal = JsonlJournal::new(dir.path()).unwrap();
        let job = JobKey::new("ipads");

        journal.append(&job, &[entry(1, "a")]).unwrap();
        let mut file = OpenOptions::new()
            .append(true)
            .open(journal.path_for(&job))
            .unwrap();
        file.write_all(br#"{"page": 2, "rec"#).unwrap();

        let records = journal.recover(&job, Some(5)).unwrap();
        assert_eq!(records, vec![json!({"sku": "a"})]);
    }

    #[test]
    fn test_reset() {
        let dir = TempDir::new().unwrap();
        let mut journal = JsonlJournal::new(dir.path()).unwrap();
        let job = JobKey::new("ipads");

        journal.append(&job, &[entry(1, "a")]).unwrap();
        journal.reset(&job).unwrap();

        assert!(!journal.path_for(&job).exists());
    }
}
