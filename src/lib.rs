//! Catalog-Harvest: a resumable, batched pagination engine
//!
//! This crate pages through a remote catalog or registry in fixed-size
//! batches, hands every page payload to a pluggable extractor, and persists
//! the extracted records. Progress is checkpointed per job so that an
//! interrupted run resumes where it stopped.

pub mod config;
pub mod engine;
pub mod extract;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

use engine::{DiscoveryError, PageError, RetryError};
use state::{PageIndex, RunState};

/// Main error type for Catalog-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Page {page} of job '{job}' failed: {source}")]
    PageFailed {
        job: String,
        page: PageIndex,
        source: RetryError<PageError>,
    },

    #[error("Could not determine page count for job '{job}': {source}")]
    Discovery {
        job: String,
        source: RetryError<DiscoveryError>,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: RunState, to: RunState },

    #[error("Page task could not be joined: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
}

/// Result type alias for Catalog-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use engine::{BatchScheduler, Harvester, JobOutcome, RetryPolicy};
pub use state::{BatchPlan, Checkpoint, JobKey, PageResult, Record};
