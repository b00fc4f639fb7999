//! Bounded worker pool fanning copy tasks out across target accounts.
//!
//! Tasks are queued up front and pulled by a fixed set of workers. Every
//! task yields exactly one [`CopyResult`]; results are only read once every
//! worker has been joined, and the aggregate is derived from them. A task
//! that never reported back is recorded as aborted.

use std::any::Any;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, warn};

use crate::cloud::ClientFactory;
use crate::executor::CopyExecutor;
use crate::manifest::{ManifestEntry, write_manifest};
use crate::plan::{CopyOptions, PlanError, SourceImage, plan_tasks};
use crate::progress::{ProgressSink, TracingProgress};
use crate::task::{CopyOutcome, CopyResult, CopyTask, TaskError, TaskIdentity};

/// Totals and manifest derived from a completed run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AggregateOutcome {
    /// Number of tasks that failed.
    pub failure_count: usize,
    /// Number of tasks submitted.
    pub task_count: usize,
    /// One entry per succeeded task, in completion order.
    pub manifest: Vec<ManifestEntry>,
    /// Every task's result, in completion order.
    pub results: Vec<CopyResult>,
}

impl AggregateOutcome {
    fn from_results(task_count: usize, results: Vec<CopyResult>) -> Self {
        Self {
            failure_count: results.iter().filter(|result| result.is_failure()).count(),
            task_count,
            manifest: results
                .iter()
                .filter_map(CopyResult::manifest_entry)
                .collect(),
            results,
        }
    }

    /// Returns `true` when no task failed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failure_count == 0
    }

    /// Returns the operator-facing failure summary, if anything failed.
    #[must_use]
    pub fn failure_summary(&self) -> Option<String> {
        (self.failure_count > 0).then(|| {
            format!(
                "{}/{} image copies failed, manual reconciliation may be required",
                self.failure_count, self.task_count
            )
        })
    }
}

/// Number of workers for `task_count` tasks under `limit` (0 = unbounded).
#[must_use]
pub const fn worker_count(limit: usize, task_count: usize) -> usize {
    if limit == 0 || limit > task_count {
        task_count
    } else {
        limit
    }
}

/// Runs copy tasks concurrently against clients from a [`ClientFactory`].
#[derive(Debug)]
pub struct Replicator<F, P = TracingProgress> {
    factory: Arc<F>,
    progress: Arc<P>,
    executor: CopyExecutor,
    manifest_output: Option<Utf8PathBuf>,
}

impl<F, P> Replicator<F, P>
where
    F: ClientFactory + 'static,
    P: ProgressSink + 'static,
{
    /// Creates a replicator with the default executor and no manifest.
    #[must_use]
    pub fn new(factory: F, progress: P) -> Self {
        Self {
            factory: Arc::new(factory),
            progress: Arc::new(progress),
            executor: CopyExecutor::new(),
            manifest_output: None,
        }
    }

    /// Replaces the per-task executor.
    #[must_use]
    pub const fn with_executor(mut self, executor: CopyExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Writes the manifest to `path` once every task has finished.
    #[must_use]
    pub fn with_manifest_output(mut self, path: Option<Utf8PathBuf>) -> Self {
        self.manifest_output = path;
        self
    }

    /// Builds the task list for `sources` × `accounts`.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError`] when planning fails; no task has started then.
    pub async fn plan(
        &self,
        sources: &[SourceImage],
        accounts: &[String],
        options: &CopyOptions,
    ) -> Result<Vec<CopyTask>, PlanError> {
        plan_tasks(self.factory.as_ref(), sources, accounts, options).await
    }

    /// Runs every task to a terminal state with at most `concurrency`
    /// workers (0 = one worker per task) and aggregates the results.
    pub async fn run(&self, tasks: Vec<CopyTask>, concurrency: usize) -> AggregateOutcome {
        let task_count = tasks.len();
        let submitted: Vec<TaskIdentity> = tasks.iter().map(CopyTask::identity).collect();
        let workers = worker_count(concurrency, task_count);
        debug!(task_count, workers, "starting replication");

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        for task in tasks {
            if queue_tx.send(task).is_err() {
                warn!("task queue closed before submission finished");
            }
        }
        drop(queue_tx);
        let queue = Arc::new(Mutex::new(queue_rx));

        let (results_tx, mut results_rx) = mpsc::unbounded_channel();
        let mut pool = JoinSet::new();
        for _ in 0..workers {
            pool.spawn(worker(
                Arc::clone(&queue),
                results_tx.clone(),
                Arc::clone(&self.factory),
                Arc::clone(&self.progress),
                self.executor,
            ));
        }
        drop(results_tx);

        while let Some(joined) = pool.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "replication worker terminated abnormally");
            }
        }

        let mut results = Vec::with_capacity(task_count);
        while let Some(result) = results_rx.recv().await {
            results.push(result);
        }
        record_unreported(submitted, &mut results);
        let outcome = AggregateOutcome::from_results(task_count, results);

        if let Some(path) = &self.manifest_output {
            self.emit_manifest(path, &outcome.manifest);
        }
        outcome
    }

    fn emit_manifest(&self, path: &Utf8Path, entries: &[ManifestEntry]) {
        if let Err(err) = write_manifest(path, entries) {
            warn!(path = %path, error = %err, "failed to write manifest");
            self.progress
                .say(&format!("Unable to write out manifest to {path}: {err}"));
        }
    }
}

type TaskQueue = Arc<Mutex<mpsc::UnboundedReceiver<CopyTask>>>;

async fn worker<F, P>(
    queue: TaskQueue,
    results: mpsc::UnboundedSender<CopyResult>,
    factory: Arc<F>,
    progress: Arc<P>,
    executor: CopyExecutor,
) where
    F: ClientFactory + 'static,
    P: ProgressSink + 'static,
{
    loop {
        let next = queue.lock().await.recv().await;
        let Some(task) = next else {
            break;
        };
        let result = execute_task(&factory, &progress, executor, task).await;
        if results.send(result).is_err() {
            warn!("result channel closed; dropping result");
        }
    }
}

/// Runs one task on its own tokio task so a panic anywhere in its steps
/// fails only that task.
async fn execute_task<F, P>(
    factory: &Arc<F>,
    progress: &Arc<P>,
    executor: CopyExecutor,
    task: CopyTask,
) -> CopyResult
where
    F: ClientFactory + 'static,
    P: ProgressSink + 'static,
{
    let identity = task.identity();
    let handle = tokio::spawn(replicate_task(
        Arc::clone(factory),
        Arc::clone(progress),
        executor,
        task,
    ));
    handle.await.unwrap_or_else(|err| {
        let message = abort_message(err);
        warn!(account = %identity.account, region = %identity.region, %message, "copy task aborted");
        let account = identity.account.clone();
        CopyResult::new(identity, Err(TaskError::Aborted { account, message }))
    })
}

async fn replicate_task<F, P>(
    factory: Arc<F>,
    progress: Arc<P>,
    executor: CopyExecutor,
    task: CopyTask,
) -> CopyResult
where
    F: ClientFactory + 'static,
    P: ProgressSink + 'static,
{
    let identity = task.identity();
    progress.say(&format!(
        "[{}] Copying {} to account {} (encrypted: {})",
        identity.region, identity.source_image_id, identity.account, task.encrypted
    ));

    let result = match factory.target_client(&identity.account, &identity.region) {
        Err(source) => Err(TaskError::Client {
            account: identity.account.clone(),
            region: identity.region.clone(),
            source,
        }),
        Ok(client) => executor.replicate(&client, &task, progress.as_ref()).await,
    };

    let outcome = CopyResult::new(identity, result);
    match &outcome.outcome {
        CopyOutcome::Succeeded { image_id } => progress.say(&format!(
            "[{}] Finished copying {} to {} (copied id: {image_id})",
            outcome.identity.region, outcome.identity.source_image_id, outcome.identity.account
        )),
        CopyOutcome::Failed(err) => {
            progress.say(&format!("[{}] {err}", outcome.identity.region));
        }
    }
    outcome
}

/// Appends an aborted result for every submitted task without one.
fn record_unreported(mut submitted: Vec<TaskIdentity>, results: &mut Vec<CopyResult>) {
    for result in results.iter() {
        if let Some(position) = submitted.iter().position(|id| *id == result.identity) {
            submitted.swap_remove(position);
        }
    }
    for identity in submitted {
        warn!(account = %identity.account, region = %identity.region, "copy task produced no result");
        let account = identity.account.clone();
        results.push(CopyResult::new(
            identity,
            Err(TaskError::Aborted {
                account,
                message: String::from("worker exited before reporting a result"),
            }),
        ));
    }
}

fn abort_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload: Box<dyn Any + Send> = err.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .map_or_else(
            || String::from("task panicked"),
            |text| format!("task panicked: {text}"),
        )
}
