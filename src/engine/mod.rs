//! Pagination engine
//!
//! This module contains the moving parts of a harvest:
//! - Fetching page payloads through a pluggable transport
//! - Retrying failed pages under a bounded policy
//! - Discovering each job's page count
//! - Following detail links of listed records
//! - Scheduling pages in checkpointed batches
//! - Running all configured jobs

mod details;
mod discovery;
mod fetcher;
mod harvester;
mod retry;
mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use details::DetailStage;
pub use discovery::{DiscoveryError, PageCountDiscovery};
pub use fetcher::{
    build_http_client, FetchError, HttpTransport, PageFetcher, PageRequest, Payload,
    RequestTemplate, Transport,
};
pub use harvester::{Harvester, JobPlan};
pub use retry::{Attempted, PageError, RetryError, RetryPolicy, Retryable};
pub use scheduler::{last_page_of, BatchScheduler, JobOutcome, SchedulerSettings};
