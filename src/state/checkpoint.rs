//! Checkpoint value type

use crate::state::{JobKey, PageIndex};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable marker of the last fully committed page of a job
///
/// `last_committed_page = k` means every page up to and including `k` has
/// been fetched, parsed and journaled. A resumed run starts at `k + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// The job this checkpoint belongs to
    pub job_key: JobKey,

    /// Highest committed page (inclusive)
    pub last_committed_page: PageIndex,

    /// When the checkpoint was last written
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Creates a checkpoint stamped with the current time
    pub fn new(job_key: JobKey, last_committed_page: PageIndex) -> Self {
        Self {
            job_key,
            last_committed_page,
            updated_at: Utc::now(),
        }
    }

    /// Returns the page a resumed run starts from
    pub fn resume_page(&self) -> PageIndex {
        self.last_committed_page.saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_page_is_next() {
        let checkpoint = Checkpoint::new(JobKey::new("firms"), 7);
        assert_eq!(checkpoint.resume_page(), 8);
    }

    #[test]
    fn test_serialized_layout() {
        let checkpoint = Checkpoint::new(JobKey::new("ipads"), 12);
        let json = serde_json::to_value(&checkpoint).unwrap();

        assert_eq!(json["jobKey"], "ipads");
        assert_eq!(json["lastCommittedPage"], 12);
        assert!(json["updatedAt"].is_string());
    }
}
