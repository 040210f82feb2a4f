use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Something that can be submitted as the input of a job.
///
/// `is_absent` lets an input describe itself as missing (an empty photo, a
/// blank path). Absent inputs are rejected at submission time.
pub trait InputItem {
    fn is_absent(&self) -> bool {
        false
    }
}

impl InputItem for String {
    fn is_absent(&self) -> bool {
        self.trim().is_empty()
    }
}

/// One unit of work: a stable index, its input, and the shared parameter set.
#[derive(Debug, Clone)]
pub struct Job<I, P> {
    pub index: usize,
    pub input: I,
    pub params: Arc<P>,
}

/// Lifecycle of a job inside one run.
///
/// PENDING → RUNNING → SUCCEEDED | FAILED. Both terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Succeeded => write!(f, "SUCCEEDED"),
            JobStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Events that move a job through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    Dispatched,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Compute the status after `event`, or `None` if the transition is illegal.
    pub fn next(self, event: JobEvent) -> Option<JobStatus> {
        match (self, event) {
            (JobStatus::Pending, JobEvent::Dispatched) => Some(JobStatus::Running),
            (JobStatus::Running, JobEvent::Succeeded) => Some(JobStatus::Succeeded),
            (JobStatus::Running, JobEvent::Failed) => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// Fan a list of inputs out into jobs indexed `0..items.len()` in input order.
///
/// Every job shares the same parameter set. Fails before producing any job if
/// the list is empty or any item is absent.
pub fn submit<I: InputItem, P>(items: Vec<I>, params: P) -> Result<Vec<Job<I, P>>, ValidationError> {
    if items.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }
    if let Some(index) = items.iter().position(InputItem::is_absent) {
        return Err(ValidationError::EmptyItem { index });
    }

    let params = Arc::new(params);
    let jobs = items
        .into_iter()
        .enumerate()
        .map(|(index, input)| Job {
            index,
            input,
            params: Arc::clone(&params),
        })
        .collect();
    Ok(jobs)
}
