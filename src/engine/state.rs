use serde::Serialize;
use tracing::warn;

use super::job::{JobEvent, JobStatus};
use super::progress::ProgressEstimate;

/// A job that produced output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSuccess<O> {
    pub index: usize,
    pub output: O,
}

/// A job whose `generate` call failed, with the error text shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFailure {
    pub index: usize,
    pub error: String,
}

/// Exactly one of these is produced per job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome<O> {
    Success(JobSuccess<O>),
    Failure(JobFailure),
}

impl<O> JobOutcome<O> {
    pub fn index(&self) -> usize {
        match self {
            JobOutcome::Success(s) => s.index,
            JobOutcome::Failure(f) => f.index,
        }
    }
}

/// Observable state of one batch run.
///
/// `successes` and `failures` are in completion order. Use the `*_by_index`
/// helpers when the original submission order matters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchState<O> {
    pub is_running: bool,
    pub total: usize,
    pub completed: usize,
    pub current_index: usize,
    pub successes: Vec<JobSuccess<O>>,
    pub failures: Vec<JobFailure>,
    /// Heuristic only; never derived from the generator.
    pub estimated_progress_percent: u8,
}

impl<O> Default for BatchState<O> {
    fn default() -> Self {
        Self {
            is_running: false,
            total: 0,
            completed: 0,
            current_index: 0,
            successes: Vec::new(),
            failures: Vec::new(),
            estimated_progress_percent: 0,
        }
    }
}

impl<O> BatchState<O> {
    pub fn is_done(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }

    pub fn all_failed(&self) -> bool {
        self.is_done() && self.successes.is_empty() && self.failures.len() == self.total
    }

    pub fn successes_by_index(&self) -> Vec<&JobSuccess<O>> {
        let mut out: Vec<_> = self.successes.iter().collect();
        out.sort_by_key(|s| s.index);
        out
    }

    pub fn failures_by_index(&self) -> Vec<&JobFailure> {
        let mut out: Vec<_> = self.failures.iter().collect();
        out.sort_by_key(|f| f.index);
        out
    }

    /// Consume the state, returning outputs in submission order.
    pub fn into_outputs_by_index(self) -> Vec<O> {
        let mut successes = self.successes;
        successes.sort_by_key(|s| s.index);
        successes.into_iter().map(|s| s.output).collect()
    }

    /// "k of N succeeded" line for UI display.
    pub fn summary(&self) -> String {
        format!("{} of {} succeeded", self.successes.len(), self.total)
    }
}

/// Folds dispatch and settle events into a [`BatchState`].
///
/// Enforces the per-job lifecycle, so an index can only be settled once and
/// only after it was dispatched. Events violating that are dropped.
#[derive(Debug)]
pub struct Aggregator<O> {
    state: BatchState<O>,
    statuses: Vec<JobStatus>,
    in_flight: usize,
    estimate: ProgressEstimate,
}

impl<O> Aggregator<O> {
    pub fn new(total: usize) -> Self {
        Self {
            state: BatchState {
                is_running: true,
                total,
                ..BatchState::default()
            },
            statuses: vec![JobStatus::Pending; total],
            in_flight: 0,
            estimate: ProgressEstimate::new(),
        }
    }

    pub fn state(&self) -> &BatchState<O> {
        &self.state
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn status(&self, index: usize) -> Option<JobStatus> {
        self.statuses.get(index).copied()
    }

    /// Mark `index` as running and make it the current item.
    pub fn dispatched(&mut self, index: usize) -> bool {
        if !self.transition(index, JobEvent::Dispatched) {
            return false;
        }
        self.in_flight += 1;
        self.state.current_index = index;
        true
    }

    /// Record a settled job. Returns `false` if the outcome was rejected.
    pub fn record(&mut self, outcome: JobOutcome<O>) -> bool {
        let index = outcome.index();
        let event = match &outcome {
            JobOutcome::Success(_) => JobEvent::Succeeded,
            JobOutcome::Failure(_) => JobEvent::Failed,
        };
        if !self.transition(index, event) {
            return false;
        }

        self.in_flight -= 1;
        self.state.completed += 1;
        match outcome {
            JobOutcome::Success(s) => self.state.successes.push(s),
            JobOutcome::Failure(f) => self.state.failures.push(f),
        }
        self.estimate.settle(self.state.completed, self.state.total);
        self.state.estimated_progress_percent = self.estimate.percent();
        true
    }

    pub fn tick(&mut self) {
        self.estimate
            .tick(self.state.completed, self.in_flight, self.state.total);
        self.state.estimated_progress_percent = self.estimate.percent();
    }

    pub fn finish(mut self) -> BatchState<O> {
        self.state.is_running = false;
        self.state
    }

    fn transition(&mut self, index: usize, event: JobEvent) -> bool {
        let Some(status) = self.statuses.get_mut(index) else {
            warn!(index, ?event, "event for unknown job index");
            return false;
        };
        match status.next(event) {
            Some(next) => {
                *status = next;
                true
            }
            None => {
                warn!(index, ?event, from = %status, "illegal job transition dropped");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(index: usize) -> JobOutcome<&'static str> {
        JobOutcome::Success(JobSuccess { index, output: "img" })
    }

    fn fail(index: usize) -> JobOutcome<&'static str> {
        JobOutcome::Failure(JobFailure {
            index,
            error: "boom".into(),
        })
    }

    #[test]
    fn empty_state_matches_reset_shape() {
        let state = BatchState::<String>::default();
        assert!(!state.is_running);
        assert_eq!(state.total, 0);
        assert_eq!(state.completed, 0);
        assert_eq!(state.current_index, 0);
        assert!(state.successes.is_empty());
        assert!(state.failures.is_empty());
    }

    #[test]
    fn aggregates_in_completion_order() {
        let mut agg = Aggregator::new(3);
        for i in 0..3 {
            assert!(agg.dispatched(i));
        }
        assert!(agg.record(ok(2)));
        assert!(agg.record(fail(0)));
        assert!(agg.record(ok(1)));

        let state = agg.finish();
        assert_eq!(state.completed, 3);
        assert!(!state.is_running);
        let order: Vec<usize> = state.successes.iter().map(|s| s.index).collect();
        assert_eq!(order, vec![2, 1]);
        let sorted: Vec<usize> = state.successes_by_index().iter().map(|s| s.index).collect();
        assert_eq!(sorted, vec![1, 2]);
        assert_eq!(state.estimated_progress_percent, 100);
        assert_eq!(state.summary(), "2 of 3 succeeded");
    }

    #[test]
    fn duplicate_outcome_is_dropped() {
        let mut agg = Aggregator::new(1);
        agg.dispatched(0);
        assert!(agg.record(ok(0)));
        assert!(!agg.record(fail(0)));
        assert_eq!(agg.state().completed, 1);
        assert!(agg.state().failures.is_empty());
    }

    #[test]
    fn outcome_before_dispatch_is_dropped() {
        let mut agg = Aggregator::new(2);
        assert!(!agg.record(ok(1)));
        assert_eq!(agg.state().completed, 0);
        assert_eq!(agg.status(1), Some(JobStatus::Pending));
    }

    #[test]
    fn unknown_index_is_dropped() {
        let mut agg = Aggregator::<&str>::new(2);
        assert!(!agg.dispatched(7));
    }

    #[test]
    fn current_index_tracks_latest_dispatch() {
        let mut agg = Aggregator::<&str>::new(3);
        agg.dispatched(0);
        agg.dispatched(1);
        assert_eq!(agg.state().current_index, 1);
        assert_eq!(agg.in_flight(), 2);
    }

    #[test]
    fn all_failed_detection() {
        let mut agg = Aggregator::new(2);
        agg.dispatched(0);
        agg.dispatched(1);
        agg.record(fail(0));
        assert!(!agg.state().all_failed());
        agg.record(fail(1));
        assert!(agg.state().all_failed());
    }

    #[test]
    fn outputs_by_index() {
        let mut agg = Aggregator::new(3);
        for i in 0..3 {
            agg.dispatched(i);
        }
        agg.record(JobOutcome::Success(JobSuccess { index: 2, output: "c" }));
        agg.record(JobOutcome::Success(JobSuccess { index: 0, output: "a" }));
        agg.record(fail(1));
        assert_eq!(agg.finish().into_outputs_by_index(), vec!["a", "c"]);
    }
}
