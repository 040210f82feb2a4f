use std::marker::PhantomData;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use super::job::{InputItem, submit};
use super::pool::{BatchOptions, run_pool};
use super::state::BatchState;
use crate::error::{EngineError, ValidationError};
use crate::generator::Generator;

/// Convert a finished run into the caller-facing result.
///
/// A run where every job failed is the only run-level failure.
pub fn finalize<O>(state: BatchState<O>) -> Result<BatchState<O>, EngineError> {
    if state.all_failed() {
        return Err(EngineError::AllFailed {
            total: state.total,
            failures: state.failures,
        });
    }
    Ok(state)
}

/// Submit `items` and run them to completion without a controller.
pub async fn run_batch<G, I, P>(
    items: Vec<I>,
    params: P,
    max_concurrent: usize,
    generator: Arc<G>,
    options: &BatchOptions<G::Output>,
) -> Result<BatchState<G::Output>, EngineError>
where
    G: Generator<I, P> + 'static,
    G::Output: Clone + Send + 'static,
    I: InputItem + Send + 'static,
    P: Send + Sync + 'static,
{
    if max_concurrent == 0 {
        return Err(ValidationError::ZeroConcurrency.into());
    }
    let jobs = submit(items, params)?;
    let state = run_pool(jobs, max_concurrent, generator, options, |_| {}).await?;
    finalize(state)
}

/// Owns the observable state of successive batch runs.
///
/// One run at a time: [`start`](Self::start) refuses while a run is active,
/// and [`reset`](Self::reset) clears a finished run back to the empty state.
pub struct BatchController<G, I, P>
where
    G: Generator<I, P>,
{
    generator: Arc<G>,
    options: Arc<BatchOptions<G::Output>>,
    state: Arc<watch::Sender<BatchState<G::Output>>>,
    _inputs: PhantomData<fn(I, P)>,
}

/// A running batch. Dropping the handle does not stop the run.
pub struct BatchHandle<O> {
    updates: watch::Receiver<BatchState<O>>,
    task: JoinHandle<Result<BatchState<O>, EngineError>>,
}

impl<G, I, P> BatchController<G, I, P>
where
    G: Generator<I, P> + 'static,
    G::Output: Clone + Send + Sync + 'static,
    I: InputItem + Send + 'static,
    P: Send + Sync + 'static,
{
    pub fn new(generator: Arc<G>, options: BatchOptions<G::Output>) -> Self {
        let (state, _) = watch::channel(BatchState::default());
        Self {
            generator,
            options: Arc::new(options),
            state: Arc::new(state),
            _inputs: PhantomData,
        }
    }

    /// Validate and launch a run. Indices start at 0 for every run.
    pub fn start(
        &self,
        items: Vec<I>,
        params: P,
        max_concurrent: usize,
    ) -> Result<BatchHandle<G::Output>, EngineError> {
        if max_concurrent == 0 {
            return Err(ValidationError::ZeroConcurrency.into());
        }
        let jobs = submit(items, params)?;
        let total = jobs.len();

        // Check and claim in one step so concurrent starts cannot both win.
        let claimed = self.state.send_if_modified(|s| {
            if s.is_running {
                return false;
            }
            *s = BatchState {
                is_running: true,
                total,
                ..BatchState::default()
            };
            true
        });
        if !claimed {
            return Err(EngineError::AlreadyRunning);
        }
        let updates = self.state.subscribe();

        let generator = Arc::clone(&self.generator);
        let options = Arc::clone(&self.options);
        let state = Arc::clone(&self.state);
        let task = tokio::spawn(async move {
            let guard = RunGuard(Arc::clone(&state));
            let result = run_pool(jobs, max_concurrent, generator, &options, |s| {
                state.send_replace(s.clone());
            })
            .await;
            drop(guard);
            finalize(result?)
        });

        Ok(BatchHandle { updates, task })
    }

    /// Latest state of the current or last run.
    pub fn snapshot(&self) -> BatchState<G::Output> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BatchState<G::Output>> {
        self.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().is_running
    }

    /// Clear a finished run back to the empty initial state.
    pub fn reset(&self) -> Result<(), EngineError> {
        let mut running = false;
        self.state.send_if_modified(|s| {
            running = s.is_running;
            if !running {
                *s = BatchState::default();
            }
            !running
        });
        if running {
            return Err(EngineError::StillRunning);
        }
        info!("batch state reset");
        Ok(())
    }
}

/// Clears the running flag when a run task ends, even by panic or abort.
struct RunGuard<O>(Arc<watch::Sender<BatchState<O>>>);

impl<O> Drop for RunGuard<O> {
    fn drop(&mut self) {
        self.0.send_if_modified(|s| {
            if !s.is_running {
                return false;
            }
            s.is_running = false;
            true
        });
    }
}

impl<O: Clone> BatchHandle<O> {
    /// Stream of state updates for this run.
    pub fn subscribe(&self) -> watch::Receiver<BatchState<O>> {
        self.updates.clone()
    }

    pub fn snapshot(&self) -> BatchState<O> {
        self.updates.borrow().clone()
    }

    /// Wait for every job to settle.
    pub async fn wait(self) -> Result<BatchState<O>, EngineError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(EngineError::WorkerPanicked(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Job;
    use crate::error::GenerateError;
    use crate::generator::from_fn;
    use crate::history::HistoryRecorder;
    use std::sync::Barrier;
    use std::time::Duration;

    struct Echo {
        delay: Duration,
    }

    impl Generator<String, ()> for Echo {
        type Output = String;

        async fn generate(&self, job: Job<String, ()>) -> Result<String, GenerateError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(format!("{}@{}", job.input, job.index))
        }
    }

    fn echo() -> Echo {
        Echo {
            delay: Duration::ZERO,
        }
    }

    fn slow_echo() -> Echo {
        Echo {
            delay: Duration::from_millis(20),
        }
    }

    fn names(n: usize, prefix: &str) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    #[tokio::test]
    async fn start_streams_to_completion() {
        let controller = BatchController::new(Arc::new(echo()), BatchOptions::default());
        let handle = controller.start(names(3, "p"), (), 2).unwrap();
        let mut updates = handle.subscribe();

        let state = handle.wait().await.unwrap();
        assert_eq!(state.completed, 3);
        assert!(!state.is_running);

        // The stream ends on the final state too.
        let last = updates.borrow_and_update().clone();
        assert_eq!(last, state);
        assert_eq!(controller.snapshot(), state);
    }

    #[tokio::test]
    async fn reset_restores_empty_state() {
        let controller = BatchController::new(Arc::new(echo()), BatchOptions::default());
        controller.start(names(2, "p"), (), 1).unwrap().wait().await.unwrap();

        controller.reset().unwrap();
        let state = controller.snapshot();
        assert_eq!(state, BatchState::default());
        assert!(!state.is_running);
        assert_eq!(state.total, 0);
        assert_eq!(state.completed, 0);
        assert_eq!(state.current_index, 0);
    }

    #[tokio::test]
    async fn new_run_starts_fresh_index_space() {
        let controller = BatchController::new(Arc::new(echo()), BatchOptions::default());
        controller.start(names(5, "a"), (), 5).unwrap().wait().await.unwrap();
        controller.reset().unwrap();

        let state = controller.start(names(2, "b"), (), 2).unwrap().wait().await.unwrap();
        let mut indices: Vec<usize> = state.successes.iter().map(|s| s.index).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(state.total, 2);
        assert!(state.successes.iter().all(|s| s.output.starts_with('b')));
    }

    #[tokio::test]
    async fn refuses_concurrent_start_and_reset() {
        let controller = BatchController::new(Arc::new(slow_echo()), BatchOptions::default());
        let handle = controller.start(names(2, "p"), (), 1).unwrap();

        assert!(matches!(
            controller.start(names(1, "q"), (), 1),
            Err(EngineError::AlreadyRunning)
        ));
        assert!(matches!(controller.reset(), Err(EngineError::StillRunning)));

        handle.wait().await.unwrap();
        assert!(controller.reset().is_ok());
    }

    struct PanickingHistory;

    impl HistoryRecorder<String> for PanickingHistory {
        fn append(
            &self,
            _kind: &str,
            _payload: &String,
            _metadata: serde_json::Value,
        ) -> Result<String, crate::error::HistoryError> {
            panic!("recorder bug");
        }
    }

    #[tokio::test]
    async fn panicking_history_does_not_wedge_controller() {
        let options = BatchOptions {
            history: Some(Arc::new(PanickingHistory) as Arc<dyn HistoryRecorder<String>>),
            ..BatchOptions::default()
        };
        let controller = BatchController::new(Arc::new(echo()), options);

        let state = controller.start(names(2, "p"), (), 2).unwrap().wait().await.unwrap();
        assert_eq!(state.successes.len(), 2);
        assert!(!controller.is_running());
        controller.reset().unwrap();

        let again = controller.start(names(1, "q"), (), 1).unwrap().wait().await.unwrap();
        assert_eq!(again.completed, 1);
    }

    #[tokio::test]
    async fn run_guard_clears_running_flag_when_task_panics() {
        let (tx, _rx) = watch::channel(BatchState::<String> {
            is_running: true,
            total: 2,
            ..BatchState::default()
        });
        let state = Arc::new(tx);
        let guard = RunGuard(Arc::clone(&state));
        let task = tokio::spawn(async move {
            let _guard = guard;
            panic!("run task died");
        });

        assert!(task.await.unwrap_err().is_panic());
        assert!(!state.borrow().is_running);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_starts_admit_exactly_one_run() {
        for _ in 0..50 {
            let controller: Arc<BatchController<Echo, String, ()>> =
                Arc::new(BatchController::new(Arc::new(slow_echo()), BatchOptions::default()));
            let barrier = Arc::new(Barrier::new(2));
            let attempts: Vec<_> = (0..2)
                .map(|_| {
                    let controller = Arc::clone(&controller);
                    let barrier = Arc::clone(&barrier);
                    tokio::task::spawn_blocking(move || {
                        barrier.wait();
                        controller.start(names(2, "p"), (), 2)
                    })
                })
                .collect();

            let mut handles = Vec::new();
            let mut refused = 0;
            for attempt in attempts {
                match attempt.await.unwrap() {
                    Ok(handle) => handles.push(handle),
                    Err(EngineError::AlreadyRunning) => refused += 1,
                    Err(other) => panic!("unexpected error: {other:?}"),
                }
            }
            assert_eq!(handles.len(), 1);
            assert_eq!(refused, 1);
            for handle in handles {
                handle.wait().await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn validation_errors_reject_before_running() {
        let controller = BatchController::new(Arc::new(echo()), BatchOptions::default());
        assert!(matches!(
            controller.start(Vec::new(), (), 1),
            Err(EngineError::Validation(ValidationError::EmptyBatch))
        ));
        assert!(matches!(
            controller.start(names(1, "p"), (), 0),
            Err(EngineError::Validation(ValidationError::ZeroConcurrency))
        ));
        assert!(!controller.is_running());
        assert_eq!(controller.snapshot().total, 0);
    }

    #[tokio::test]
    async fn all_failed_surfaces_once_with_per_item_errors() {
        let generator = from_fn(|job: Job<String, ()>| async move {
            Err::<String, _>(GenerateError::Other(format!("bad {}", job.index)))
        });
        let err = run_batch(names(3, "p"), (), 3, Arc::new(generator), &BatchOptions::default())
            .await
            .unwrap_err();
        match err {
            EngineError::AllFailed { total, failures } => {
                assert_eq!(total, 3);
                assert_eq!(failures.len(), 3);
            }
            other => panic!("expected AllFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn partial_failure_is_not_an_error() {
        let generator = from_fn(|job: Job<String, ()>| async move {
            if job.index == 0 {
                Err(GenerateError::Other("boom".into()))
            } else {
                Ok(job.index)
            }
        });
        let state = run_batch(names(4, "p"), (), 2, Arc::new(generator), &BatchOptions::default())
            .await
            .unwrap();
        assert_eq!(state.summary(), "3 of 4 succeeded");
        assert_eq!(state.failures[0].error, "boom");
    }
}
