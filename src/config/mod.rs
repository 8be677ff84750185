//! Configuration module for Catalog-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use catalog_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Batch size: {}", config.engine.batch_size);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CheckpointBackend, CheckpointConfig, Config, DetailsConfig, DiscoveryConfig, EngineConfig,
    ExtractorConfig, FieldConfig, HttpConfig, HttpMethod, JobConfig, OutputConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
