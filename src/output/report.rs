//! Harvest report and console summaries
//!
//! This module merges per-job outcomes into a single report and prints the
//! report, the checkpoint listing (`--status`) and the dry-run plan.

use crate::engine::{JobOutcome, JobPlan};
use crate::state::{Checkpoint, JobKey, Record};
use chrono::{DateTime, Utc};

/// A job that did not finish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub name: String,
    pub job_key: JobKey,
    pub error: String,
}

/// Outcomes of every job of one invocation
#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Completed jobs in run order, with their names
    pub completed: Vec<(String, JobOutcome)>,
    pub failures: Vec<JobFailure>,
}

impl HarvestReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            completed: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn record_success(&mut self, name: &str, outcome: JobOutcome) {
        self.completed.push((name.to_string(), outcome));
    }

    pub fn record_failure(&mut self, name: &str, job_key: JobKey, error: &crate::HarvestError) {
        self.failures.push(JobFailure {
            name: name.to_string(),
            job_key,
            error: error.to_string(),
        });
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Records of all completed jobs, in run order
    pub fn combined_records(&self) -> Vec<Record> {
        self.completed
            .iter()
            .flat_map(|(_, outcome)| outcome.records.iter().cloned())
            .collect()
    }

    pub fn total_records(&self) -> usize {
        self.completed
            .iter()
            .map(|(_, outcome)| outcome.records.len())
            .sum()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Wall-clock duration in seconds, once finished
    pub fn duration_seconds(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_seconds())
    }
}

impl Default for HarvestReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Prints the report to stdout
pub fn print_report(report: &HarvestReport) {
    println!("=== Harvest Summary ===\n");

    if !report.completed.is_empty() {
        println!("Completed jobs:");
        for (name, outcome) in &report.completed {
            let checkpoint = outcome
                .last_committed_page
                .map(|page| page.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {} ({}): {} records ({} new), {} pages, {} empty, {} retries, checkpoint {}",
                name,
                outcome.job_key,
                outcome.records.len(),
                outcome.new_records(),
                outcome.pages_committed,
                outcome.empty_pages,
                outcome.retries,
                checkpoint
            );
        }
        println!();
    }

    if !report.failures.is_empty() {
        println!("Failed jobs ({}):", report.failures.len());
        for failure in &report.failures {
            println!("  {} ({}): {}", failure.name, failure.job_key, failure.error);
        }
        println!();
    }

    println!("Total records: {}", report.total_records());
    if let Some(seconds) = report.duration_seconds() {
        println!("Duration: {} seconds", seconds);
    }
}

/// Prints stored checkpoints (`--status`)
pub fn print_checkpoints(checkpoints: &[Checkpoint]) {
    if checkpoints.is_empty() {
        println!("No checkpoints stored.");
        return;
    }

    println!("=== Checkpoints ===\n");
    for checkpoint in checkpoints {
        println!(
            "  {}: last committed page {} (updated {})",
            checkpoint.job_key,
            checkpoint.last_committed_page,
            checkpoint.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
}

/// Prints what a run would do without touching the network (`--dry-run`)
pub fn print_plan(plans: &[JobPlan]) {
    println!("=== Harvest Plan ===\n");

    for plan in plans {
        println!("{} ({})", plan.name, plan.job_key);
        println!("  Discovery: {}", plan.discovery);
        println!("  Batch size: {}", plan.batch_size);
        if let Some(details) = &plan.details {
            println!("  Details: {}", details);
        }
        match plan.checkpoint {
            Some(page) => println!("  Resume at page {} (checkpoint {})", plan.resume_page, page),
            None => println!("  Start at page {}", plan.resume_page),
        }
        if let Some(batches) = &plan.batches {
            if batches.is_empty() {
                println!("  Nothing left to fetch");
            } else {
                let ranges: Vec<String> = batches
                    .iter()
                    .map(|batch| format!("[{}-{}]", batch.start, batch.end))
                    .collect();
                println!("  Batches: {}", ranges.join(" "));
            }
        }
        println!();
    }
}
