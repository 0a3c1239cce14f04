//! Bounded job queue and the single-drain supervisor.
//!
//! Admission is non-blocking: `try_enqueue` fails immediately when the queue
//! is full. One supervisor task drains the queue sequentially; at any instant
//! at most one job executes. Each job runs as a cancellable task that the
//! supervisor waits on with the configured per-job timeout. On deadline the
//! supervisor raises the job's cooperative stop flag and waits for the task
//! to unwind, after which the job has mapped itself to `TIMEOUT`.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use quizarch_core::{Settings, WorkerError, WorkerResult, WorkerStatus};

use crate::history::JobHistory;
use crate::job::{ArchiveJob, JobDeps};

/// Message on the job queue.
enum QueueCommand {
    /// Execute a job.
    Process(Arc<ArchiveJob>),
    /// Terminate the supervisor (service shutdown).
    Interrupt,
}

/// Admission-side handle to the job queue.
#[derive(Clone)]
pub struct Scheduler {
    tx: mpsc::Sender<QueueCommand>,
    queue_size: usize,
    history: Arc<JobHistory>,
}

impl Scheduler {
    /// Create the scheduler and its supervisor.
    ///
    /// The supervisor must be spawned by the caller (composition root).
    #[must_use]
    pub fn new(settings: &Settings, deps: JobDeps) -> (Self, Supervisor) {
        let (tx, rx) = mpsc::channel(settings.queue_size);
        let history = Arc::new(JobHistory::new(settings.history_size));

        let scheduler = Self {
            tx,
            queue_size: settings.queue_size,
            history,
        };
        let supervisor = Supervisor {
            rx,
            timeout: settings.request_timeout,
            deps: Arc::new(deps),
        };
        (scheduler, supervisor)
    }

    /// Enqueue a job without blocking.
    ///
    /// On success the job is also recorded in the history ring. Fails with
    /// [`WorkerError::QueueFull`] when the queue is at capacity.
    pub fn try_enqueue(&self, job: Arc<ArchiveJob>) -> WorkerResult<()> {
        self.tx
            .try_send(QueueCommand::Process(Arc::clone(&job)))
            .map_err(|_| WorkerError::QueueFull {
                max_size: self.queue_size,
            })?;
        self.history.push(job);
        Ok(())
    }

    /// Number of jobs currently waiting in the queue.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue_size.saturating_sub(self.tx.capacity())
    }

    /// Whether the queue is at capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.queue_len() >= self.queue_size
    }

    /// Worker status derived from the queue depth.
    #[must_use]
    pub fn worker_status(&self) -> WorkerStatus {
        WorkerStatus::from_queue_depth(self.queue_len(), self.queue_size)
    }

    /// The job history ring.
    #[must_use]
    pub fn history(&self) -> &Arc<JobHistory> {
        &self.history
    }

    /// Push the shutdown sentinel onto the queue.
    ///
    /// The supervisor terminates once it dequeues the sentinel; jobs queued
    /// before it still execute.
    pub async fn shutdown(&self) {
        if self.tx.send(QueueCommand::Interrupt).await.is_err() {
            tracing::debug!("Supervisor already terminated");
        }
    }
}

/// The queue-draining supervisor task.
pub struct Supervisor {
    rx: mpsc::Receiver<QueueCommand>,
    timeout: std::time::Duration,
    deps: Arc<JobDeps>,
}

impl Supervisor {
    /// Spawn the supervisor onto the runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Drain the queue until the shutdown sentinel arrives.
    pub async fn run(mut self) {
        tracing::info!("Spawned queue worker task");

        while let Some(command) = self.rx.recv().await {
            match command {
                QueueCommand::Interrupt => {
                    tracing::info!("Received interrupt signal. Terminating queue worker task");
                    return;
                }
                QueueCommand::Process(job) => self.process(job).await,
            }
        }

        tracing::info!("Terminating queue worker task");
    }

    /// Run one job with the per-job timeout and graceful interrupt.
    async fn process(&self, job: Arc<ArchiveJob>) {
        let jobid = job.id();
        let cancel = CancellationToken::new();

        let mut task = tokio::spawn({
            let job = Arc::clone(&job);
            let deps = Arc::clone(&self.deps);
            let cancel = cancel.child_token();
            async move { job.execute(deps, cancel).await }
        });

        tokio::select! {
            result = &mut task => {
                if let Err(e) = result {
                    tracing::error!(job = %jobid, "Job task aborted unexpectedly: {e}");
                }
            }
            () = tokio::time::sleep(self.timeout) => {
                tracing::warn!(
                    job = %jobid,
                    timeout_sec = self.timeout.as_secs(),
                    "Job exceeded runtime limit. Requesting termination ..."
                );
                cancel.cancel();
                match task.await {
                    Ok(()) => tracing::info!(job = %jobid, "Job terminated gracefully"),
                    Err(e) => tracing::error!(job = %jobid, "Job task aborted unexpectedly: {e}"),
                }
            }
        }
    }
}
