//! Harvester - runs every configured job
//!
//! This module coordinates a whole invocation:
//! - Opening the transport, checkpoint store, journal and result sink
//! - Selecting and optionally resetting jobs
//! - Discovering each job's page count (retried at the job level)
//! - Running one batch scheduler per job, one job after another
//! - Merging job outcomes into a report and writing the results
//!
//! A failed job is recorded in the report; the remaining jobs still run.

use crate::config::{Config, JobConfig};
use crate::engine::details::DetailStage;
use crate::engine::discovery::PageCountDiscovery;
use crate::engine::fetcher::{HttpTransport, PageFetcher, RequestTemplate, Transport};
use crate::engine::retry::RetryPolicy;
use crate::engine::scheduler::{last_page_of, BatchScheduler, JobOutcome, SchedulerSettings};
use crate::extract::build_extractor;
use crate::output::{HarvestReport, JsonFileSink, ResultSink};
use crate::state::{plan_batches, BatchPlan, Checkpoint, JobKey, PageIndex};
use crate::storage::{open_checkpoint_store, open_journal, CheckpointStore, RecordJournal};
use crate::{ConfigError, HarvestError, Result};
use std::sync::Arc;
use std::time::Duration;

/// What a run of one job would do, computed without network access
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPlan {
    pub name: String,
    pub job_key: JobKey,
    pub discovery: String,
    pub batch_size: usize,
    pub checkpoint: Option<PageIndex>,
    pub resume_page: PageIndex,
    /// Remaining batches, known only for fixed page counts
    pub batches: Option<Vec<BatchPlan>>,
    /// Detail stage, if the job follows detail links
    pub details: Option<String>,
}

/// Main harvest coordinator
pub struct Harvester {
    config: Config,
    transport: Arc<dyn Transport>,
    store: Box<dyn CheckpointStore>,
    journal: Box<dyn RecordJournal>,
    sink: Box<dyn ResultSink>,
}

impl Harvester {
    /// Creates a harvester from explicit components
    pub fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        store: Box<dyn CheckpointStore>,
        journal: Box<dyn RecordJournal>,
        sink: Box<dyn ResultSink>,
    ) -> Self {
        Self {
            config,
            transport,
            store,
            journal,
            sink,
        }
    }

    /// Creates a harvester with the HTTP transport and the stores and sink
    /// selected by the configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Harvester)` - Successfully created harvester
    /// * `Err(HarvestError)` - The HTTP client or a store could not be opened
    pub fn from_config(config: Config) -> Result<Self> {
        let transport = Arc::new(HttpTransport::from_config(&config.http)?);
        let store = open_checkpoint_store(&config.checkpoint)?;
        let journal = open_journal(&config.checkpoint)?;
        let sink = Box::new(JsonFileSink::from_config(&config.output));

        Ok(Self::new(config, transport, store, journal, sink))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the jobs named in `names`, or every job if `names` is empty
    pub fn select_jobs(&self, names: &[String]) -> Result<Vec<JobConfig>> {
        if names.is_empty() {
            return Ok(self.config.jobs.clone());
        }

        names
            .iter()
            .map(|name| {
                self.config
                    .jobs
                    .iter()
                    .find(|job| &job.name == name)
                    .cloned()
                    .ok_or_else(|| {
                        HarvestError::from(ConfigError::Validation(format!(
                            "Unknown job '{}'",
                            name
                        )))
                    })
            })
            .collect()
    }

    /// Deletes the checkpoints and journals of `jobs`
    pub fn reset(&mut self, jobs: &[JobConfig]) -> Result<()> {
        for job in jobs {
            let key = job.job_key();
            tracing::info!("Resetting progress of {}", key);
            self.store.reset(&key)?;
            self.journal.reset(&key)?;
        }
        Ok(())
    }

    /// Lists every stored checkpoint
    pub fn checkpoints(&self) -> Result<Vec<Checkpoint>> {
        Ok(self.store.list()?)
    }

    /// Describes what running `jobs` would do
    pub fn plan(&self, jobs: &[JobConfig]) -> Result<Vec<JobPlan>> {
        jobs.iter().map(|job| self.plan_job(job)).collect()
    }

    fn plan_job(&self, job: &JobConfig) -> Result<JobPlan> {
        let key = job.job_key();
        let discovery = PageCountDiscovery::from_config(&job.discovery)?;
        let settings = SchedulerSettings::for_job(&self.config.engine, job);
        let checkpoint = self.store.load(&key)?;
        let resume_page = match checkpoint {
            Some(page) => page.saturating_add(1).max(job.first_page),
            None => job.first_page,
        };

        let details = self
            .detail_stage(job, settings.batch_size)?
            .map(|stage| stage.to_string());

        let batches = match &discovery {
            PageCountDiscovery::Fixed(pages) => Some(
                last_page_of(job.first_page, *pages)
                    .map(|last| plan_batches(resume_page, last, settings.batch_size))
                    .unwrap_or_default(),
            ),
            _ => None,
        };

        Ok(JobPlan {
            name: job.name.clone(),
            job_key: key,
            discovery: discovery.to_string(),
            batch_size: settings.batch_size,
            checkpoint,
            resume_page,
            batches,
            details,
        })
    }

    fn detail_stage(&self, job: &JobConfig, batch_size: usize) -> Result<Option<DetailStage>> {
        job.details
            .as_ref()
            .map(|details| DetailStage::from_config(details, &job.base_url, batch_size))
            .transpose()
            .map_err(HarvestError::from)
    }

    /// Runs `jobs` one after another and writes their results
    ///
    /// Job failures are collected in the report. Only sink failures abort
    /// the whole run.
    pub async fn run(&mut self, jobs: &[JobConfig]) -> Result<HarvestReport> {
        let mut report = HarvestReport::new();

        for job in jobs {
            let key = job.job_key();
            tracing::info!("Starting job '{}' ({})", job.name, key);

            match self.run_job(job).await {
                Ok(outcome) => {
                    if outcome.records.is_empty() {
                        tracing::warn!("No records found for {}", key);
                    }
                    self.sink.write_job(&key, &outcome.records)?;
                    report.record_success(&job.name, outcome);
                }
                Err(e) => {
                    tracing::error!("Job '{}' failed: {}", job.name, e);
                    report.record_failure(&job.name, key, &e);
                }
            }
        }

        self.sink.write_combined(&report.combined_records())?;
        report.finish();

        tracing::info!(
            "Harvest finished: {} jobs completed, {} failed, {} records",
            report.completed.len(),
            report.failures.len(),
            report.total_records()
        );

        Ok(report)
    }

    /// Runs a single job from its checkpoint to its last page
    pub async fn run_job(&mut self, job: &JobConfig) -> Result<JobOutcome> {
        let key = job.job_key();
        let template = RequestTemplate::from_job(job, &self.config.http.headers);
        let fetcher = Arc::new(PageFetcher::new(
            key.clone(),
            template,
            Arc::clone(&self.transport),
        ));
        let extractor = build_extractor(&job.extractor)?;
        let discovery = PageCountDiscovery::from_config(&job.discovery)?;

        let total_pages = self.discover(job, &discovery, &fetcher).await?;
        tracing::info!("Scraping {}, total pages: {}", key, total_pages);

        let settings = SchedulerSettings::for_job(&self.config.engine, job);
        let details = self.detail_stage(job, settings.batch_size)?;
        let mut scheduler = BatchScheduler::new(
            fetcher,
            extractor,
            self.store.as_mut(),
            self.journal.as_mut(),
            settings,
        );
        if let Some(stage) = details {
            tracing::info!("Following detail links of {}: {}", key, stage);
            scheduler = scheduler.with_details(Arc::new(stage));
        }
        scheduler.run(total_pages).await
    }

    async fn discover(
        &self,
        job: &JobConfig,
        discovery: &PageCountDiscovery,
        fetcher: &PageFetcher,
    ) -> Result<u64> {
        let request = match &job.discovery_url {
            Some(url) => fetcher.template().render_url(url),
            None => fetcher.template().render(job.first_page),
        };
        let policy = RetryPolicy::new(self.config.engine.discovery_attempts)
            .with_delay(Duration::from_millis(self.config.engine.retry_delay_ms));

        discovery
            .discover(fetcher, &request, &policy)
            .await
            .map_err(|source| HarvestError::Discovery {
                job: job.name.clone(),
                source,
            })
    }
}
