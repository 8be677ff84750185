//! Output module for harvested records and run summaries
//!
//! This module handles:
//! - Writing per-job and combined record files
//! - Merging job outcomes into a harvest report
//! - Printing reports, checkpoint listings and dry-run plans

mod json_file;
pub mod report;
mod traits;

pub use json_file::JsonFileSink;
pub use report::{print_checkpoints, print_plan, print_report, HarvestReport, JobFailure};
pub use traits::{OutputError, OutputResult, ResultSink};
