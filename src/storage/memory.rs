//! In-memory checkpoint store and journal
//!
//! Both types are cheap handles over shared state, so a caller can keep a
//! clone to inspect what a scheduler wrote.

use crate::state::{Checkpoint, JobKey, PageIndex, Record};
use crate::storage::traits::{CheckpointStore, JournalEntry, RecordJournal, StorageResult};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the lock cannot leave a map half-written
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Checkpoint store backed by a shared map
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    inner: Arc<Mutex<BTreeMap<JobKey, PageIndex>>>,
    saves: Arc<Mutex<Vec<(JobKey, PageIndex)>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every save in call order
    pub fn save_history(&self) -> Vec<(JobKey, PageIndex)> {
        lock(&self.saves).clone()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, job: &JobKey) -> StorageResult<Option<PageIndex>> {
        Ok(lock(&self.inner).get(job).copied())
    }

    fn save(&mut self, job: &JobKey, page: PageIndex) -> StorageResult<()> {
        lock(&self.inner).insert(job.clone(), page);
        lock(&self.saves).push((job.clone(), page));
        Ok(())
    }

    fn reset(&mut self, job: &JobKey) -> StorageResult<()> {
        lock(&self.inner).remove(job);
        Ok(())
    }

    fn list(&self) -> StorageResult<Vec<Checkpoint>> {
        Ok(lock(&self.inner)
            .iter()
            .map(|(job_key, page)| Checkpoint {
                job_key: job_key.clone(),
                last_committed_page: *page,
                updated_at: Utc::now(),
            })
            .collect())
    }
}

/// Record journal backed by a shared map
#[derive(Debug, Clone, Default)]
pub struct MemoryJournal {
    inner: Arc<Mutex<HashMap<JobKey, Vec<JournalEntry>>>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the journaled entries of `job`
    pub fn entries(&self, job: &JobKey) -> Vec<JournalEntry> {
        lock(&self.inner).get(job).cloned().unwrap_or_default()
    }
}

impl RecordJournal for MemoryJournal {
    fn recover(
        &mut self,
        job: &JobKey,
        committed: Option<PageIndex>,
    ) -> StorageResult<Vec<Record>> {
        let mut inner = lock(&self.inner);
        let entries = inner.entry(job.clone()).or_default();
        entries.retain(|entry| committed.is_some_and(|c| entry.page <= c));
        Ok(entries.iter().map(|entry| entry.record.clone()).collect())
    }

    fn append(&mut self, job: &JobKey, entries: &[JournalEntry]) -> StorageResult<()> {
        lock(&self.inner)
            .entry(job.clone())
            .or_default()
            .extend_from_slice(entries);
        Ok(())
    }

    fn reset(&mut self, job: &JobKey) -> StorageResult<()> {
        lock(&self.inner).remove(job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clones_share_state() {
        let handle = MemoryCheckpointStore::new();
        let mut store = handle.clone();
        let job = JobKey::new("konga");

        store.save(&job, 4).unwrap();

        assert_eq!(handle.load(&job).unwrap(), Some(4));
        assert_eq!(handle.save_history(), vec![(job, 4)]);
    }

    #[test]
    fn test_journal_recover_truncates() {
        let mut journal = MemoryJournal::new();
        let job = JobKey::new("konga");
        journal
            .append(
                &job,
                &[
                    JournalEntry { page: 0, record: json!(1) },
                    JournalEntry { page: 1, record: json!(2) },
                ],
            )
            .unwrap();

        assert_eq!(journal.recover(&job, Some(0)).unwrap(), vec![json!(1)]);
        assert_eq!(journal.entries(&job).len(), 1);
    }
}
