//! State module for tracking harvest progress
//!
//! This module provides the value types that flow through the engine.
//!
//! # Components
//!
//! - `JobKey`: identifies one pagination stream and names its files
//! - `BatchPlan`: a contiguous range of pages dispatched together
//! - `PageResult`: the records extracted from one page
//! - `Checkpoint`: the durable marker of the last committed page
//! - `RunState`: the state machine of one scheduler run

mod batch;
mod checkpoint;
mod job_key;
mod run_state;

// Re-export main types
pub use batch::{plan_batches, BatchPlan, PageIndex, PageResult, Record};
pub use checkpoint::Checkpoint;
pub use job_key::JobKey;
pub use run_state::RunState;
