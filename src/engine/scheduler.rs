//! Batch scheduler for one job
//!
//! This module drives a single job through its page range:
//! - Loading the checkpoint and recovering journaled records
//! - Dispatching each batch of pages concurrently with per-page retry,
//!   following detail links when the job has a detail stage
//! - Waiting for the whole batch, then committing the contiguous prefix of
//!   successful pages (journal first, checkpoint second)
//! - Pausing between batches
//!
//! A page that exhausts its retries fails the run once its batch has been
//! committed up to the page below it. No later batch is dispatched.

use crate::config::{EngineConfig, JobConfig};
use crate::engine::details::DetailStage;
use crate::engine::fetcher::PageFetcher;
use crate::engine::retry::{Attempted, PageError, RetryError, RetryPolicy};
use crate::extract::Extractor;
use crate::state::{BatchPlan, JobKey, PageIndex, PageResult, Record, RunState};
use crate::storage::{CheckpointStore, JournalEntry, RecordJournal};
use crate::{HarvestError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

type PageAttempt = (
    PageIndex,
    std::result::Result<Attempted<PageResult>, RetryError<PageError>>,
);

/// Tuning of one scheduler run
#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    /// Index of the job's first page
    pub first_page: PageIndex,
    /// Pages per batch
    pub batch_size: usize,
    /// Pause after every batch
    pub batch_delay: Duration,
    /// Per-page retry policy
    pub retry: RetryPolicy,
    /// Whether unparseable payloads are fetched again
    pub retry_parse_failures: bool,
}

impl SchedulerSettings {
    /// Combines engine defaults with a job's overrides
    pub fn for_job(engine: &EngineConfig, job: &JobConfig) -> Self {
        Self {
            first_page: job.first_page,
            batch_size: job.batch_size.unwrap_or(engine.batch_size),
            batch_delay: Duration::from_millis(engine.batch_delay_ms),
            retry: RetryPolicy::new(engine.page_attempts)
                .with_delay(Duration::from_millis(engine.retry_delay_ms)),
            retry_parse_failures: engine.retry_parse_failures,
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            first_page: 1,
            batch_size: engine.batch_size,
            batch_delay: Duration::from_millis(engine.batch_delay_ms),
            retry: RetryPolicy::new(engine.page_attempts),
            retry_parse_failures: engine.retry_parse_failures,
        }
    }
}

/// Result of a completed job run
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub job_key: JobKey,

    /// Size of the job's range
    pub total_pages: u64,

    /// Checkpoint found when the run started
    pub resumed_from: Option<PageIndex>,

    /// Checkpoint when the run finished
    pub last_committed_page: Option<PageIndex>,

    /// Every record of the job in page order: journaled records of earlier
    /// runs followed by this run's records
    pub records: Vec<Record>,

    /// How many of `records` were recovered from the journal
    pub recovered_records: usize,

    /// Pages committed by this run
    pub pages_committed: u64,

    /// Committed pages that held no records
    pub empty_pages: u64,

    /// Batches dispatched by this run
    pub batches: u64,

    /// Retried page and detail attempts across the run
    pub retries: u64,

    /// Inter-batch pauses taken
    pub pacing_delays: u64,
}

impl JobOutcome {
    fn new(job_key: JobKey, total_pages: u64, resumed_from: Option<PageIndex>) -> Self {
        Self {
            job_key,
            total_pages,
            resumed_from,
            last_committed_page: resumed_from,
            records: Vec::new(),
            recovered_records: 0,
            pages_committed: 0,
            empty_pages: 0,
            batches: 0,
            retries: 0,
            pacing_delays: 0,
        }
    }

    /// Records extracted by this run
    pub fn new_records(&self) -> usize {
        self.records.len().saturating_sub(self.recovered_records)
    }
}

/// Last page of a range of `total_pages` pages starting at `first_page`
pub fn last_page_of(first_page: PageIndex, total_pages: u64) -> Option<PageIndex> {
    total_pages
        .checked_sub(1)
        .map(|offset| first_page.saturating_add(offset))
}

/// Drives one job from its checkpoint to the end of its range
pub struct BatchScheduler<'a> {
    job_key: JobKey,
    fetcher: Arc<PageFetcher>,
    extractor: Arc<dyn Extractor>,
    details: Option<Arc<DetailStage>>,
    store: &'a mut dyn CheckpointStore,
    journal: &'a mut dyn RecordJournal,
    settings: SchedulerSettings,
    state: RunState,
}

impl<'a> BatchScheduler<'a> {
    pub fn new(
        fetcher: Arc<PageFetcher>,
        extractor: Arc<dyn Extractor>,
        store: &'a mut dyn CheckpointStore,
        journal: &'a mut dyn RecordJournal,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            job_key: fetcher.job_key().clone(),
            fetcher,
            extractor,
            details: None,
            store,
            journal,
            settings,
            state: RunState::Idle,
        }
    }

    /// Enriches every page's records through `details` before commit
    pub fn with_details(mut self, details: Arc<DetailStage>) -> Self {
        self.details = Some(details);
        self
    }

    /// Returns the current run state
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Runs the job over `total_pages` pages starting at the first page
    ///
    /// # Returns
    ///
    /// * `Ok(JobOutcome)` - Every page of the range is committed
    /// * `Err(HarvestError)` - A page exhausted its retries or storage
    ///   failed; everything committed before the failure stays committed
    pub async fn run(&mut self, total_pages: u64) -> Result<JobOutcome> {
        match self.drive(total_pages).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if !self.state.is_terminal() {
                    self.state = RunState::Failed;
                }
                Err(e)
            }
        }
    }

    async fn drive(&mut self, total_pages: u64) -> Result<JobOutcome> {
        self.transition(RunState::Resuming)?;

        let committed = self.store.load(&self.job_key)?;
        let recovered = self.journal.recover(&self.job_key, committed)?;

        let mut outcome = JobOutcome::new(self.job_key.clone(), total_pages, committed);
        outcome.recovered_records = recovered.len();
        outcome.records = recovered;

        let first_page = self.settings.first_page;
        let mut next = match committed {
            Some(page) => page.saturating_add(1).max(first_page),
            None => first_page,
        };
        let last_page = last_page_of(first_page, total_pages);

        match (committed, last_page) {
            (_, None) => tracing::info!("{} has no pages", self.job_key),
            (Some(page), Some(last)) => tracing::info!(
                "Resuming {} from page {} (checkpoint {}, {} records recovered, last page {})",
                self.job_key,
                next,
                page,
                outcome.recovered_records,
                last
            ),
            (None, Some(last)) => {
                tracing::info!("Starting {} at page {} (last page {})", self.job_key, next, last)
            }
        }

        while let Some(plan) =
            last_page.and_then(|last| BatchPlan::next(next, last, self.settings.batch_size))
        {
            self.transition(RunState::Dispatching)?;
            let results = self.dispatch(plan).await?;

            self.transition(RunState::Committing)?;
            self.commit(plan, results, &mut outcome)?;

            self.transition(RunState::Pacing)?;
            self.pace(&mut outcome).await;

            match plan.end.checked_add(1) {
                Some(page) => next = page,
                None => break,
            }
        }

        self.transition(RunState::Done)?;
        tracing::info!(
            "Finished {}: {} new records from {} pages ({} total)",
            self.job_key,
            outcome.new_records(),
            outcome.pages_committed,
            outcome.records.len()
        );

        Ok(outcome)
    }

    /// Fetches and extracts every page of `plan` concurrently
    ///
    /// Waits for all pages; results are returned in page order. A page whose
    /// task panicked counts as a failed page.
    async fn dispatch(&self, plan: BatchPlan) -> Result<Vec<PageAttempt>> {
        tracing::info!(
            "Dispatching pages {}-{} of {}",
            plan.start,
            plan.end,
            self.job_key
        );

        let mut tasks = JoinSet::new();
        let mut pages = HashMap::with_capacity(plan.len());
        for page in plan.pages() {
            let fetcher = Arc::clone(&self.fetcher);
            let extractor = Arc::clone(&self.extractor);
            let details = self.details.clone();
            let settings = self.settings;

            let handle = tasks.spawn(async move {
                let result = process_page(fetcher, extractor, details, page, settings).await;
                (page, result)
            });
            pages.insert(handle.id(), page);
        }

        let mut results = Vec::with_capacity(plan.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(attempt) => results.push(attempt),
                Err(e) => {
                    let Some(&page) = pages.get(&e.id()) else {
                        return Err(e.into());
                    };
                    tracing::error!("Task for page {} of {} failed: {}", page, self.job_key, e);
                    let source = PageError::Task(e.to_string());
                    results.push((page, Err(RetryError::Aborted { attempt: 1, source })));
                }
            }
        }
        results.sort_by_key(|(page, _)| *page);

        Ok(results)
    }

    /// Persists the successful prefix of a resolved batch
    ///
    /// Records are journaled before the checkpoint moves. Pages above the
    /// lowest failed page are discarded even if they succeeded.
    fn commit(
        &mut self,
        plan: BatchPlan,
        results: Vec<PageAttempt>,
        outcome: &mut JobOutcome,
    ) -> Result<()> {
        let mut entries = Vec::new();
        let mut highest = None;
        let mut failure = None;
        let mut discarded = 0;

        for (page, result) in results {
            if failure.is_some() {
                if result.is_ok() {
                    discarded += 1;
                }
                continue;
            }

            match result {
                Ok(attempted) => {
                    outcome.retries += u64::from(attempted.retries());
                    let page_result = attempted.value;

                    if page_result.empty {
                        tracing::warn!("No records found on page {} of {}", page, self.job_key);
                        outcome.empty_pages += 1;
                    } else {
                        tracing::debug!(
                            "Page {} of {}: {} records",
                            page,
                            self.job_key,
                            page_result.records.len()
                        );
                    }

                    entries.extend(
                        page_result
                            .records
                            .into_iter()
                            .map(|record| JournalEntry { page, record }),
                    );
                    highest = Some(page);
                    outcome.pages_committed += 1;
                }
                Err(e) => failure = Some((page, e)),
            }
        }

        outcome.batches += 1;

        if let Some(page) = highest {
            self.journal.append(&self.job_key, &entries)?;
            self.store.save(&self.job_key, page)?;
            outcome.last_committed_page = Some(page);
            outcome
                .records
                .extend(entries.into_iter().map(|entry| entry.record));
            tracing::info!(
                "Committed pages {}-{} of {} (checkpoint {})",
                plan.start,
                page,
                self.job_key,
                page
            );
        }

        match failure {
            Some((page, source)) => {
                tracing::error!(
                    "Page {} of {} failed after {} attempts: {}",
                    page,
                    self.job_key,
                    source.attempts(),
                    source.last_error()
                );
                if discarded > 0 {
                    tracing::warn!(
                        "Discarding {} fetched pages of {} above failed page {}",
                        discarded,
                        self.job_key,
                        page
                    );
                }
                Err(HarvestError::PageFailed {
                    job: self.job_key.to_string(),
                    page,
                    source,
                })
            }
            None => Ok(()),
        }
    }

    async fn pace(&mut self, outcome: &mut JobOutcome) {
        outcome.pacing_delays += 1;
        if !self.settings.batch_delay.is_zero() {
            tracing::debug!(
                "Pausing {}ms after batch of {}",
                self.settings.batch_delay.as_millis(),
                self.job_key
            );
            tokio::time::sleep(self.settings.batch_delay).await;
        }
    }

    fn transition(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!("{}: {} -> {}", self.job_key, self.state, next);
        self.state = next;
        Ok(())
    }
}

/// Fetches a page under the retry policy, then enriches its records
async fn process_page(
    fetcher: Arc<PageFetcher>,
    extractor: Arc<dyn Extractor>,
    details: Option<Arc<DetailStage>>,
    page: PageIndex,
    settings: SchedulerSettings,
) -> std::result::Result<Attempted<PageResult>, RetryError<PageError>> {
    let label = format!("page {} of {}", page, fetcher.job_key());
    let mut attempted = settings
        .retry
        .execute(&label, |_| {
            fetch_page(&fetcher, extractor.as_ref(), page, settings.retry_parse_failures)
        })
        .await?;

    if let Some(details) = details {
        let retries = details
            .enrich(
                Arc::clone(&fetcher),
                &mut attempted.value.records,
                settings.retry,
                settings.retry_parse_failures,
            )
            .await?;
        attempted.attempts += retries;
    }

    Ok(attempted)
}

/// One attempt at a page: fetch the payload and extract its records
async fn fetch_page(
    fetcher: &PageFetcher,
    extractor: &dyn Extractor,
    page: PageIndex,
    retry_parse_failures: bool,
) -> std::result::Result<PageResult, PageError> {
    let payload = fetcher.fetch(page).await?;
    let records = extractor
        .extract(&payload.body)
        .map_err(|source| PageError::Extract {
            source,
            retryable: retry_parse_failures,
        })?;

    Ok(PageResult::new(page, records))
}
