//! Batch generation engine: fan a set of inputs out into indexed jobs, run
//! them through a bounded worker pool, and aggregate per-job outcomes.

mod controller;
mod job;
mod pool;
mod progress;
mod state;

pub use controller::{BatchController, BatchHandle, finalize, run_batch};
pub use job::{InputItem, Job, JobEvent, JobStatus, submit};
pub use pool::{BatchOptions, run_pool};
pub use progress::ProgressEstimate;
pub use state::{Aggregator, BatchState, JobFailure, JobOutcome, JobSuccess};
