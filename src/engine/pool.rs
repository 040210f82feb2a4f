use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::job::Job;
use super::state::{Aggregator, BatchState, JobFailure, JobOutcome, JobSuccess};
use crate::error::{EngineError, ValidationError};
use crate::generator::Generator;
use crate::history::HistoryRecorder;

/// Everything a run needs besides its jobs and generator.
pub struct BatchOptions<O> {
    /// Receives every successful output, once, right after it is recorded.
    pub history: Option<Arc<dyn HistoryRecorder<O>>>,
    /// `kind` passed to the history recorder.
    pub history_kind: String,
    /// How often the estimated progress ramps while jobs are outstanding.
    /// `None` disables the estimate between settles.
    pub progress_tick: Option<Duration>,
}

impl<O> Default for BatchOptions<O> {
    fn default() -> Self {
        Self {
            history: None,
            history_kind: "batch".to_string(),
            progress_tick: None,
        }
    }
}

impl<O> fmt::Debug for BatchOptions<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOptions")
            .field("history", &self.history.is_some())
            .field("history_kind", &self.history_kind)
            .field("progress_tick", &self.progress_tick)
            .finish()
    }
}

enum PoolEvent<O> {
    Dispatched(usize),
    Settled(JobOutcome<O>),
}

type JobQueue<I, P> = Arc<Mutex<VecDeque<Job<I, P>>>>;

/// Run `jobs` through at most `max_concurrent` concurrent `generate` calls.
///
/// Starts `min(max_concurrent, jobs.len())` workers pulling from one FIFO
/// queue. A failed call is recorded against its index and the worker moves
/// on. `publish` sees the state after every dispatch, settle, and progress
/// tick. Returns once every job has settled; total failure is not an error
/// at this level.
pub async fn run_pool<G, I, P, F>(
    jobs: Vec<Job<I, P>>,
    max_concurrent: usize,
    generator: Arc<G>,
    options: &BatchOptions<G::Output>,
    mut publish: F,
) -> Result<BatchState<G::Output>, EngineError>
where
    G: Generator<I, P> + 'static,
    G::Output: Clone + Send + 'static,
    I: Send + 'static,
    P: Send + Sync + 'static,
    F: FnMut(&BatchState<G::Output>),
{
    if max_concurrent == 0 {
        return Err(ValidationError::ZeroConcurrency.into());
    }
    if jobs.is_empty() {
        return Err(ValidationError::EmptyBatch.into());
    }

    let total = jobs.len();
    let worker_count = max_concurrent.min(total);
    info!(total, max_concurrent, worker_count, "starting batch");

    let queue: JobQueue<I, P> = Arc::new(Mutex::new(VecDeque::from(jobs)));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut workers = JoinSet::new();
    for worker in 0..worker_count {
        let queue = Arc::clone(&queue);
        let generator = Arc::clone(&generator);
        let tx = tx.clone();
        workers.spawn(work(worker, queue, generator, tx));
    }
    // Channel closes once the last worker drops its sender.
    drop(tx);

    let mut agg = Aggregator::new(total);
    publish(agg.state());

    let mut ticker = options.progress_tick.map(|period| {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(PoolEvent::Dispatched(index)) => {
                    agg.dispatched(index);
                }
                Some(PoolEvent::Settled(outcome)) => {
                    let index = outcome.index();
                    let succeeded = matches!(outcome, JobOutcome::Success(_));
                    if agg.record(outcome) && succeeded && options.history.is_some() {
                        let output = agg.state().successes.last().map(|s| s.output.clone());
                        if let Some(output) = output {
                            record_history(options, output, index, total).await;
                        }
                    }
                }
                None => break,
            },
            _ = next_tick(&mut ticker) => agg.tick(),
        }
        publish(agg.state());
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "batch worker terminated abnormally");
        }
    }

    let state = agg.finish();
    info!(
        successes = state.successes.len(),
        failures = state.failures.len(),
        total,
        "batch finished"
    );
    publish(&state);
    Ok(state)
}

async fn work<G, I, P>(
    worker: usize,
    queue: JobQueue<I, P>,
    generator: Arc<G>,
    tx: mpsc::UnboundedSender<PoolEvent<G::Output>>,
) where
    G: Generator<I, P> + 'static,
    G::Output: Send + 'static,
    I: Send + 'static,
    P: Send + Sync + 'static,
{
    loop {
        // The lock is never held across an await.
        let next = match queue.lock() {
            Ok(mut q) => q.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        let Some(job) = next else {
            break;
        };

        let index = job.index;
        debug!(worker, index, "dispatching job");
        if tx.send(PoolEvent::Dispatched(index)).is_err() {
            break;
        }

        // Each call runs in its own task so a panicking generator becomes a
        // per-job failure instead of taking the worker down.
        let generator = Arc::clone(&generator);
        let call = tokio::spawn(async move { generator.generate(job).await });
        let outcome = match call.await {
            Ok(Ok(output)) => JobOutcome::Success(JobSuccess { index, output }),
            Ok(Err(e)) => {
                warn!(worker, index, error = %e, "job failed");
                JobOutcome::Failure(JobFailure {
                    index,
                    error: e.to_string(),
                })
            }
            Err(e) => {
                warn!(worker, index, error = %e, "job aborted");
                JobOutcome::Failure(JobFailure {
                    index,
                    error: format!("generator task aborted: {e}"),
                })
            }
        };
        if tx.send(PoolEvent::Settled(outcome)).is_err() {
            break;
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

// Appends run on the blocking pool. A panicking recorder is logged, not propagated.
async fn record_history<O>(options: &BatchOptions<O>, output: O, index: usize, total: usize)
where
    O: Send + 'static,
{
    let Some(history) = options.history.as_ref().map(Arc::clone) else {
        return;
    };
    let kind = options.history_kind.clone();
    let metadata = json!({ "index": index, "total": total });
    let append = tokio::task::spawn_blocking(move || history.append(&kind, &output, metadata));
    match append.await {
        Ok(Ok(id)) => debug!(index, id = %id, "recorded history entry"),
        Ok(Err(e)) => warn!(index, error = %e, "failed to record history entry"),
        Err(e) => warn!(index, error = %e, "history recorder aborted"),
    }
}
