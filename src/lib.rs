//! Bounded batch engine for hosted AI photo generation.
//!
//! Inputs fan out into indexed [`engine::Job`]s, run through a worker pool
//! capped at `max_concurrent` calls to a [`generator::Generator`], and settle
//! into a [`engine::BatchState`] of per-index successes and failures.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod features;
pub mod generator;
pub mod history;
pub mod logging;
pub mod photo;
pub mod ui;
pub mod variation;

pub use engine::{BatchController, BatchHandle, BatchOptions, BatchState, Job, run_batch, submit};
pub use error::{EngineError, GenerateError, ValidationError};
